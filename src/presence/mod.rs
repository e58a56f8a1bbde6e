pub mod device;
pub mod monitor;
pub mod sensor;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use device::{BluetoothDevice, WifiNetwork};
pub use monitor::{MonitorTick, PresenceMonitor};
pub use sensor::{BluetoothSensor, PresenceSensor, WifiSensor};

/// Radio signal that can drive playback. Also names the mapping namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Wifi,
    Bluetooth,
}

impl SignalSource {
    /// Key of the persisted mapping blob for this namespace
    pub fn storage_key(&self) -> &'static str {
        match self {
            SignalSource::Wifi => "wifi_song_mappings",
            SignalSource::Bluetooth => "bluetooth_song_mappings",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSource::Wifi => write!(f, "WiFi"),
            SignalSource::Bluetooth => write!(f, "Bluetooth"),
        }
    }
}

/// A detected network or device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub identity: String,
    pub display_name: String,
}

impl Presence {
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
        }
    }
}

/// Last identities seen by one monitor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceState {
    pub current_identity: Option<String>,
    pub previous_identity: Option<String>,
}

/// Raised when a monitor observes a different identity than on its last tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChanged {
    pub source: SignalSource,
    /// `None` when the network or device went away
    pub new: Option<Presence>,
    pub old_identity: Option<String>,
}

impl PresenceChanged {
    pub fn new_identity(&self) -> Option<&str> {
        self.new.as_ref().map(|p| p.identity.as_str())
    }
}

impl fmt::Display for PresenceChanged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.source,
            self.old_identity.as_deref().unwrap_or("none"),
            self.new_identity().unwrap_or("none")
        )
    }
}
