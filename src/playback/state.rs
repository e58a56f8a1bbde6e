use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::presence::SignalSource;

/// Which signal drove the clip in the output slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Wifi,
    Bluetooth,
    #[default]
    None,
}

/// Snapshot of the single audio output slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub active_identity: Option<String>,
    pub source_type: SourceType,
    pub is_playing: bool,
    /// Monotonic start time of the current clip
    pub started_at: Option<Instant>,
}

impl PlaybackState {
    /// True when `identity` is the clip currently audible
    pub fn is_playing_identity(&self, identity: &str) -> bool {
        self.is_playing && self.active_identity.as_deref() == Some(identity)
    }
}

impl From<SignalSource> for SourceType {
    fn from(source: SignalSource) -> Self {
        match source {
            SignalSource::Wifi => SourceType::Wifi,
            SignalSource::Bluetooth => SourceType::Bluetooth,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Wifi => write!(f, "WiFi"),
            SourceType::Bluetooth => write!(f, "Bluetooth"),
            SourceType::None => write!(f, "None"),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.active_identity, self.is_playing) {
            (Some(identity), true) => write!(f, "playing {} ({})", identity, self.source_type),
            (Some(identity), false) => write!(f, "finished {} ({})", identity, self.source_type),
            (None, _) => write!(f, "idle"),
        }
    }
}
