use std::path::PathBuf;

use async_trait::async_trait;
use rowflow_utils::BoxError;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::traits::{Destination, DestinationConfig};

/// Appends every record of a loaded batch to a file as one JSON line.
/// A batch payload that is not an array is written as a single line.
#[derive(Debug)]
pub struct FileDestination {
    name: String,
    path: PathBuf,
    config: DestinationConfig,
}

impl FileDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            config: DestinationConfig::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: DestinationConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl Destination for FileDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> DestinationConfig {
        self.config
    }

    async fn load_batch(&self, data: Value) -> Result<(), BoxError> {
        let lines = match data {
            Value::Array(items) => items,
            other => vec![other],
        };

        let mut buf = Vec::new();
        for line in &lines {
            serde_json::to_writer(&mut buf, line)?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_json_lines() {
        let path = std::env::temp_dir().join(format!("rowflow-file-{}.jsonl", uuid::Uuid::new_v4()));
        let dest = FileDestination::new(&path);

        dest.load_batch(json!([{"id": 1}, {"id": 2}])).await.unwrap();
        dest.load_batch(json!("tail")).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, "{\"id\":1}\n{\"id\":2}\n\"tail\"\n");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
