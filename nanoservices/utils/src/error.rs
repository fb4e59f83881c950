use thiserror::Error;
use reqwest::Error as ReqwestError;
use tokio::io::Error as TokioIoError;
use url::ParseError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Processor Error: {0}")]
    Processor(String),

    #[error("Job stopped: {0}")]
    Stopped(String),

    #[error("Reqwest Error: {0}")]
    HttpError(#[from] ReqwestError),

    #[error("Tokio Error: {0}")]
    TokioError(#[from] TokioIoError),

    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Url Error: {0}")]
    UrlParseError(#[from] ParseError),

    #[error("Store Error: {0}")]
    StoreError(#[from] rusqlite::Error),
}

impl Error {
    pub fn processor(message: impl Into<String>) -> Self {
        Error::Processor(message.into())
    }
}
