pub mod arbitration;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod playback;
pub mod presence;
pub mod priority;
pub mod service;
pub mod system;

pub use arbitration::{ArbitrationEngine, Decision};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use service::PresenceService;
