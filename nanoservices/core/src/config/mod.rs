pub mod loader;
pub mod types;

pub use loader::{load_job, load_jobs_dir, parse_job, ConfigError};
pub use types::{DestinationSettings, JobConfig};
