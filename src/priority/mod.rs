pub mod manager;

pub use manager::{CandidateSelector, has_bluetooth_priority};
