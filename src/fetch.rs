//! The one capability adapters need from the outside world: GET a URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::FetchError;

pub const DEFAULT_USER_AGENT: &str = "ScreenScrape/0.1 (+https://github.com/screen-scrape)";

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: vec![(
                "Accept".to_string(),
                "text/html,application/xhtml+xml".to_string(),
            )],
            timeout,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Non-success statuses come back as responses; only transport failures are
/// errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self.client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|source| {
            if source.is_timeout() {
                FetchError::Timeout {
                    url: request.url.clone(),
                    timeout_secs: request.timeout.as_secs(),
                }
            } else {
                FetchError::Http {
                    url: request.url.clone(),
                    source,
                }
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| FetchError::Http {
            url: request.url.clone(),
            source,
        })?;
        Ok(FetchResponse { status, body })
    }
}
