use serde::Deserialize;
use std::collections::HashMap;

use crate::destinations::traits::DestinationConfig;
use crate::job::runner::FanOut;

#[derive(Debug, Default, Deserialize)]
pub struct JobConfig {
    /// Job name used in events, logs and metrics
    pub job: Option<String>,
    pub description: Option<String>,
    /// Maximum number of rows to process; 0 means unlimited
    pub row_limit: Option<u64>,
    #[serde(default)]
    pub fan_out: FanOut,
    /// Overrides keyed by destination name
    #[serde(default)]
    pub destinations: HashMap<String, DestinationSettings>,
    pub metrics: Option<MetricsConfig>,
    pub history: Option<HistoryConfig>,
}

/// Per-destination overrides. Unset fields keep the destination's own value.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DestinationSettings {
    pub batch_size: Option<usize>,
    pub disable_load: Option<bool>,
}

impl DestinationSettings {
    pub fn apply(&self, config: DestinationConfig) -> DestinationConfig {
        DestinationConfig {
            batch_size: self.batch_size.unwrap_or(config.batch_size),
            disable_load: self.disable_load.unwrap_or(config.disable_load),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    /// Address for the `/metrics` exporter, e.g. "127.0.0.1:9100"
    pub listen: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryConfig {
    /// SQLite database file for run history
    pub path: String,
}
