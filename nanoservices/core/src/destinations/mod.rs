pub mod batch;
pub mod console;
pub mod file;
pub mod http;
pub mod traits;

pub use batch::BatchEngine;
pub use traits::{records, Destination, DestinationConfig};
