use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;

/// Failure to retrieve an item's content. The item is skipped for this run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid locator `{0}`")]
    InvalidLocator(String),
    #[error("request to `{locator}` failed: {source}")]
    Request {
        locator: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{locator}` answered HTTP {status}")]
    Status { locator: String, status: u16 },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError>;
}

/// Plain HTTP GET with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        let url = reqwest::Url::parse(locator)
            .map_err(|_| FetchError::InvalidLocator(locator.to_string()))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                locator: locator.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                locator: locator.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|source| FetchError::Request {
            locator: locator.to_string(),
            source,
        })
    }
}
