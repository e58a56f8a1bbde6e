pub mod controller;
pub mod state;

pub use controller::{PlayOutcome, PlaybackController};
pub use state::{PlaybackState, SourceType};
