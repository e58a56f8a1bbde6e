pub mod engine;
pub mod queue;

pub use engine::{ArbitrationEngine, Decision};
pub use queue::{ArbitrationCommand, ArbitrationQueue, execute};
