pub mod daemon;
pub mod manager;
pub mod signals;

pub use daemon::PresenceService;
pub use manager::{ReloadOutcome, ServiceManager};
pub use signals::{SignalHandler, SignalType};
