use tracing::{debug, info};

use crate::config::BluetoothConfig;
use crate::playback::{PlaybackState, SourceType};
use crate::presence::BluetoothDevice;

/// An actively playing Bluetooth clip gates every WiFi-driven decision
pub fn has_bluetooth_priority(state: &PlaybackState) -> bool {
    state.is_playing && state.source_type == SourceType::Bluetooth
}

/// Picks the single Bluetooth device that drives playback
pub struct CandidateSelector {
    min_rssi: Option<i16>,
}

impl CandidateSelector {
    pub fn new(config: &BluetoothConfig) -> Self {
        Self {
            min_rssi: config.min_rssi,
        }
    }

    pub fn with_min_rssi(min_rssi: Option<i16>) -> Self {
        Self { min_rssi }
    }

    /// Connected devices beat discovered ones. Within a group the strongest
    /// signal wins and ties keep discovery order; devices without a signal
    /// reading rank below any that have one.
    pub fn select_best(&self, candidates: &[BluetoothDevice]) -> Option<BluetoothDevice> {
        debug!("Evaluating {} Bluetooth candidates", candidates.len());

        let connected: Vec<&BluetoothDevice> = candidates.iter().filter(|d| d.connected).collect();
        let best = if !connected.is_empty() {
            Self::strongest(connected, "connected")
        } else {
            let nearby = candidates
                .iter()
                .filter(|d| self.in_range(d))
                .collect::<Vec<_>>();
            Self::strongest(nearby, "discovered")
        };

        if let Some(ref device) = best {
            info!("Best Bluetooth device: {}", device);
        } else {
            debug!("No qualifying Bluetooth device found");
        }

        best
    }

    fn in_range(&self, device: &BluetoothDevice) -> bool {
        let qualifies = match (self.min_rssi, device.rssi) {
            (None, _) => true,
            (Some(min), Some(rssi)) => rssi >= min,
            (Some(_), None) => false,
        };
        debug!(
            "  Checking device: '{}' rssi {:?} -> in range: {}",
            device.display_name(),
            device.rssi,
            qualifies
        );
        qualifies
    }

    fn strongest(devices: Vec<&BluetoothDevice>, group: &str) -> Option<BluetoothDevice> {
        let mut best_device: Option<&BluetoothDevice> = None;
        let mut best_signal = i32::MIN;

        for device in devices {
            let signal = device.rssi.map(i32::from).unwrap_or(i32::MIN + 1);
            if signal > best_signal {
                best_device = Some(device);
                best_signal = signal;
                debug!("Found {} device match: {} (signal: {:?})", group, device.id, device.rssi);
            }
        }

        best_device.cloned()
    }
}
