pub mod http_client;
pub mod iter;
pub mod lines;
pub mod queue;
pub mod traits;

pub use traits::{Flow, Processor, Pull};
