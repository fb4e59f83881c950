use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method, Request};
use rowflow_utils::RowflowResult;
use serde_json::Value;
use url::Url;

use super::traits::{Processor, Pull};

#[derive(Debug)]
pub struct HttpProcessorBuilder {
    name: String,
    method: Method,
    url: String,
    token: Option<String>,
    params: Option<HashMap<String, String>>,
    row_limit: Option<u64>,
}

impl HttpProcessorBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            name: "http".to_string(),
            method,
            url: url.into(),
            token: None,
            params: None,
            row_limit: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn token<T: Into<String>>(mut self, token: Option<T>) -> Self {
        self.token = token.map(|t| t.into());
        self
    }

    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn build(self) -> RowflowResult<HttpProcessor> {
        let url = Url::parse(&self.url)?;
        let client = ReqwestClient::new();
        let mut request = client.request(self.method, url);

        if let Some(params) = self.params {
            request = request.query(&params);
        }
        if let Some(token) = self.token {
            request = request.bearer_auth(token);
        }

        Ok(HttpProcessor {
            name: self.name,
            url: self.url,
            client,
            request: request.build()?,
            row_limit: self.row_limit,
        })
    }
}

/// Fetches one JSON document per run.
///
/// A top-level array yields one row per element; any other document yields
/// a single row. The stream argument is the request URL.
pub struct HttpProcessor {
    name: String,
    url: String,
    client: ReqwestClient,
    request: Request,
    row_limit: Option<u64>,
}

impl HttpProcessor {
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> RowflowResult<Value> {
        // GET/POST requests without streaming bodies are always cloneable.
        let request = self
            .request
            .try_clone()
            .ok_or_else(|| rowflow_utils::error::Error::processor("request body cannot be replayed"))?;
        let response = self.client.execute(request).await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    async fn process(&mut self, pull: &mut Pull<'_>) -> RowflowResult<()> {
        let stream_args = vec![Value::String(self.url.clone())];
        let rows = match self.fetch().await? {
            Value::Array(items) => items,
            other => vec![other],
        };

        for row in rows {
            if pull.row(row, &stream_args).await.is_stop() {
                break;
            }
        }
        pull.end_stream(&stream_args).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_invalid_url() {
        let result = HttpProcessorBuilder::new(Method::GET, "not a url").build();
        assert!(matches!(result, Err(rowflow_utils::error::Error::UrlParseError(_))));
    }

    #[test]
    fn builder_applies_params_and_token() {
        let mut params = HashMap::new();
        params.insert("limit".to_string(), "5".to_string());
        let processor = HttpProcessorBuilder::new(Method::GET, "https://example.com/items")
            .name("items")
            .params(params)
            .token(Some("secret"))
            .build()
            .unwrap();

        assert_eq!(processor.name(), "items");
        assert_eq!(processor.request.url().query(), Some("limit=5"));
        assert!(processor.request.headers().contains_key(reqwest::header::AUTHORIZATION));
    }
}
