use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BluetoothDevice, Presence, SignalSource};
use crate::config::{BluetoothConfig, BluetoothMode, WifiConfig};
use crate::error::CoreResult;
use crate::priority::CandidateSelector;
use crate::system::{BluetoothAdapter, WifiAdapter};

/// Reported by some Android builds when location permission is missing
const UNKNOWN_SSID: &str = "<unknown ssid>";

/// Reduces a radio reading to at most one identity
#[async_trait]
pub trait PresenceSensor: Send + Sync {
    fn source(&self) -> SignalSource;

    async fn read(&self) -> CoreResult<Option<Presence>>;
}

pub struct WifiSensor<A: WifiAdapter> {
    adapter: A,
    allow_ssid_fallback: bool,
}

impl<A: WifiAdapter> WifiSensor<A> {
    pub fn new(adapter: A, config: &WifiConfig) -> Self {
        Self {
            adapter,
            allow_ssid_fallback: config.allow_ssid_fallback,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

#[async_trait]
impl<A: WifiAdapter> PresenceSensor for WifiSensor<A> {
    fn source(&self) -> SignalSource {
        SignalSource::Wifi
    }

    async fn read(&self) -> CoreResult<Option<Presence>> {
        let ssid = match self.adapter.current_ssid().await? {
            Some(ssid) if !ssid.is_empty() && !ssid.eq_ignore_ascii_case(UNKNOWN_SSID) => ssid,
            _ => {
                debug!("Not associated with a WiFi network");
                return Ok(None);
            }
        };

        // The BSSID is optional; a failed scan still leaves the SSID usable
        let networks = match self.adapter.visible_networks().await {
            Ok(networks) => networks,
            Err(e) => {
                warn!("Failed to list visible WiFi networks: {}", e);
                Vec::new()
            }
        };

        if let Some(network) = networks.iter().find(|n| n.ssid == ssid && !n.bssid.is_empty()) {
            return Ok(Some(Presence::new(network.bssid.clone(), ssid)));
        }

        if self.allow_ssid_fallback {
            debug!("No BSSID for {}, keying by SSID", ssid);
            Ok(Some(Presence::new(format!("ssid:{}", ssid), ssid)))
        } else {
            debug!("No BSSID for {}, treating as absent", ssid);
            Ok(None)
        }
    }
}

pub struct BluetoothSensor<B: BluetoothAdapter> {
    adapter: B,
    selector: CandidateSelector,
    mode: BluetoothMode,
    scan_window: Duration,
}

impl<B: BluetoothAdapter> BluetoothSensor<B> {
    pub fn new(adapter: B, config: &BluetoothConfig) -> Self {
        Self {
            adapter,
            selector: CandidateSelector::new(config),
            mode: config.mode,
            scan_window: config.scan_window(),
        }
    }

    pub fn adapter(&self) -> &B {
        &self.adapter
    }

    async fn connected(&self) -> CoreResult<Vec<BluetoothDevice>> {
        Ok(self
            .adapter
            .connected_devices()
            .await?
            .into_iter()
            .map(|d| d.set_connected(true))
            .collect())
    }

    async fn discovered(&self) -> CoreResult<Vec<BluetoothDevice>> {
        self.adapter.scan_for_devices(self.scan_window).await
    }

    async fn candidates(&self) -> CoreResult<Vec<BluetoothDevice>> {
        match self.mode {
            BluetoothMode::Connected => self.connected().await,
            BluetoothMode::Scan => self.discovered().await,
            BluetoothMode::Both => {
                match self.connected().await {
                    Ok(devices) if !devices.is_empty() => return Ok(devices),
                    Ok(_) => {}
                    Err(e) => warn!("Failed to read connected Bluetooth devices: {}", e),
                }
                self.discovered().await
            }
        }
    }
}

#[async_trait]
impl<B: BluetoothAdapter> PresenceSensor for BluetoothSensor<B> {
    fn source(&self) -> SignalSource {
        SignalSource::Bluetooth
    }

    async fn read(&self) -> CoreResult<Option<Presence>> {
        let candidates = self.candidates().await?;
        Ok(self
            .selector
            .select_best(&candidates)
            .map(|device| Presence::new(device.id.clone(), device.display_name())))
    }
}
