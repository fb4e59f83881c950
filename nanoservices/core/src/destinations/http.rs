use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method};
use rowflow_utils::{BoxError, RowflowResult};
use serde_json::Value;
use url::Url;

use super::traits::{Destination, DestinationConfig};

/// Sends each loaded batch as a JSON request body. Non-2xx responses fail
/// the load.
#[derive(Debug, Clone)]
pub struct HttpDestination {
    name: String,
    client: ReqwestClient,
    method: Method,
    url: Url,
    token: Option<String>,
    config: DestinationConfig,
}

impl HttpDestination {
    pub fn new(url: impl AsRef<str>) -> RowflowResult<Self> {
        let url = Url::parse(url.as_ref())?;
        Ok(Self {
            name: url.to_string(),
            client: ReqwestClient::new(),
            method: Method::POST,
            url,
            token: None,
            config: DestinationConfig::default(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_config(mut self, config: DestinationConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl Destination for HttpDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> DestinationConfig {
        self.config
    }

    async fn load_batch(&self, data: Value) -> Result<(), BoxError> {
        let mut request = self.client.request(self.method.clone(), self.url.clone()).json(&data);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(HttpDestination::new("::nope").is_err());
    }

    #[test]
    fn defaults_to_post_named_after_url() {
        let dest = HttpDestination::new("https://example.com/ingest")
            .unwrap()
            .with_config(DestinationConfig::batched(50));
        assert_eq!(dest.name(), "https://example.com/ingest");
        assert_eq!(dest.method, Method::POST);
        assert_eq!(dest.config().batch_size, 50);
    }
}
