pub mod service;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use service::MappingService;
pub use store::MappingStore;

/// Identity of a mapping row: a WiFi BSSID, an `ssid:<name>` fallback key,
/// or a Bluetooth device address.
pub type MappingKey = String;

/// An audio clip bound to a network or device identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub identity: MappingKey,
    /// Network or device name shown to the user
    pub display_name: String,
    /// Location of the audio resource. The mapping only references it; the
    /// file may disappear at any time.
    pub audio_ref: String,
    /// Original file name of the clip
    pub audio_label: String,
}

impl Mapping {
    pub fn new(
        identity: impl Into<String>,
        display_name: impl Into<String>,
        audio_ref: impl Into<String>,
        audio_label: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            audio_ref: audio_ref.into(),
            audio_label: audio_label.into(),
        }
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} [{}]",
            self.display_name, self.identity, self.audio_label, self.audio_ref
        )
    }
}
