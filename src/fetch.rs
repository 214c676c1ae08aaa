//! Retrieval of raw source pages.

use crate::error::FetchError;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;

/// Fetches the raw text of a proxy-list page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<String, FetchError>;
}

/// Default fetcher: HTTP(S) through reqwest, anything else is read as a
/// local file path.
#[derive(Debug, Clone, Default)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<String, FetchError> {
        if !url.starts_with("http") {
            return tokio::fs::read_to_string(url)
                .await
                .map_err(|source| FetchError::Io {
                    path: url.to_string(),
                    source,
                });
        }

        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        debug!("GET {} -> {}", url, status);

        match status {
            403 | 429 => Err(FetchError::Blocked {
                url: url.to_string(),
                status,
            }),
            200..=299 => Ok(response.text().await?),
            _ => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }
}
