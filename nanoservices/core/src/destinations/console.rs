use async_trait::async_trait;
use rowflow_utils::BoxError;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::traits::{Destination, DestinationConfig};

/// Prints each loaded batch to stdout as one JSON document per line.
#[derive(Debug, Clone)]
pub struct ConsoleDestination {
    name: String,
    config: DestinationConfig,
    pretty: bool,
}

impl Default for ConsoleDestination {
    fn default() -> Self {
        Self {
            name: "console".to_string(),
            config: DestinationConfig::default(),
            pretty: false,
        }
    }
}

impl ConsoleDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: DestinationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn render(&self, data: &Value) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(data)
        } else {
            serde_json::to_string(data)
        }
    }
}

#[async_trait]
impl Destination for ConsoleDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> DestinationConfig {
        self.config
    }

    async fn load_batch(&self, data: Value) -> Result<(), BoxError> {
        let mut out = self.render(&data)?;
        out.push('\n');
        let mut stdout = tokio::io::stdout();
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}
