pub mod runner;
pub mod state;

pub use runner::{FanOut, Flow, Pull};
pub use state::JobState;
