use std::path::Path;
use crate::config::types::JobConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Load a job config from a YAML file.
pub fn load_job(path: impl AsRef<Path>) -> Result<JobConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_job(&content)
}

/// Parse a job config from a YAML string.
pub fn parse_job(yaml: &str) -> Result<JobConfig, ConfigError> {
    let config: JobConfig = serde_yaml::from_str(yaml)?;
    Ok(config)
}

/// Load all job configs from a directory, in file name order.
pub fn load_jobs_dir(dir: impl AsRef<Path>) -> Result<Vec<JobConfig>, ConfigError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml")) {
            paths.push(path);
        }
    }
    paths.sort();
    paths.into_iter().map(load_job).collect()
}
