use serde::{Deserialize, Serialize};
use std::fmt;

/// A network reported by a WiFi scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub bssid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothDevice {
    /// Hardware address or platform identifier
    pub id: String,
    pub name: String,
    /// Signal strength in dBm when the adapter reports it
    pub rssi: Option<i16>,
    /// Paired and currently connected, as opposed to merely discovered
    pub connected: bool,
}

impl WifiNetwork {
    pub fn new(ssid: impl Into<String>, bssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.into(),
        }
    }
}

impl BluetoothDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rssi: None,
            connected: false,
        }
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn set_connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Name to show for the device, falling back to its address
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl fmt::Display for WifiNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.ssid, self.bssid)
    }
}

impl fmt::Display for BluetoothDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.display_name(),
            self.id,
            if self.connected { "Connected" } else { "Nearby" }
        )?;
        if let Some(rssi) = self.rssi {
            write!(f, " {} dBm", rssi)?;
        }
        Ok(())
    }
}
