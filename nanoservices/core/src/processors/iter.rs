use async_trait::async_trait;
use rowflow_utils::{Row, RowflowResult};
use serde_json::Value;

use super::traits::{Processor, Pull};

/// Processor over rows already held in memory. Produces a single stream.
#[derive(Debug, Clone)]
pub struct IterProcessor {
    name: String,
    rows: Vec<Row>,
    stream_args: Vec<Value>,
    row_limit: Option<u64>,
}

impl IterProcessor {
    pub fn new(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            name: "iter".to_string(),
            rows: rows.into_iter().collect(),
            stream_args: Vec::new(),
            row_limit: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_stream_args(mut self, args: Vec<Value>) -> Self {
        self.stream_args = args;
        self
    }

    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }
}

#[async_trait]
impl Processor for IterProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    async fn process(&mut self, pull: &mut Pull<'_>) -> RowflowResult<()> {
        for row in std::mem::take(&mut self.rows) {
            if pull.row(row, &self.stream_args).await.is_stop() {
                break;
            }
        }
        pull.end_stream(&self.stream_args).await;
        Ok(())
    }
}
