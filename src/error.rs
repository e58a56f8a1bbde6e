use thiserror::Error;

/// Failure kinds raised by collaborators of the arbitration core.
///
/// A missing mapping is not represented here: lookups return `Option::None`
/// and the engine treats that as a normal "stop playback" outcome.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Radio disabled, permission denied or the sensor lookup failed.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// Read or write fault on the mapping persistence.
    #[error("storage error: {0}")]
    Storage(String),

    /// Missing or corrupt audio resource, codec or output failure.
    #[error("playback error: {0}")]
    Playback(String),

    #[error("malformed mapping data: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn is_storage(&self) -> bool {
        matches!(self, CoreError::Storage(_) | CoreError::Serialization(_))
    }
}
