use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rowflow_utils::RowflowResult;
use serde_json::Value;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::traits::{Processor, Pull};

/// Reads text files line by line, one row per line.
///
/// Each file is its own stream with the file path as its only stream
/// argument. A directory expands to the regular files directly inside it,
/// in file name order.
#[derive(Debug, Clone)]
pub struct LinesProcessor {
    name: String,
    paths: Vec<PathBuf>,
    skip_empty: bool,
    row_limit: Option<u64>,
}

impl LinesProcessor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            name: "lines".to_string(),
            paths: vec![path.into()],
            skip_empty: false,
            row_limit: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Do not emit rows for blank lines.
    pub fn with_skip_empty(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    async fn files(&self) -> RowflowResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.paths {
            if fs::metadata(path).await?.is_dir() {
                files.extend(list_dir(path).await?);
            } else {
                files.push(path.clone());
            }
        }
        Ok(files)
    }
}

async fn list_dir(dir: &Path) -> RowflowResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl Processor for LinesProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    async fn process(&mut self, pull: &mut Pull<'_>) -> RowflowResult<()> {
        for path in self.files().await? {
            let stream_args = vec![Value::String(path.display().to_string())];
            let mut lines = BufReader::new(File::open(&path).await?).lines();
            let mut stopped = false;

            while let Some(line) = lines.next_line().await? {
                if self.skip_empty && line.trim().is_empty() {
                    continue;
                }
                if pull.row(Value::String(line), &stream_args).await.is_stop() {
                    stopped = true;
                    break;
                }
            }

            pull.end_stream(&stream_args).await;
            if stopped || pull.is_stopped() {
                break;
            }
        }
        Ok(())
    }
}
