// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::downloader::traits::Downloader;

pub const USER_AGENT: &str = concat!("manifest-mirror/", env!("CARGO_PKG_VERSION"));

/// Shared upstream HTTP client with a small fixed retry policy.
///
/// Network errors and 5xx answers are retried with exponential backoff;
/// any other status is handed back to the caller on the first attempt.
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Override the attempt count (at least one) and the first backoff step
    pub fn with_retry_policy(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.base_delay = base_delay;
        self
    }

    /// Send the request produced by `build`, retrying transient failures
    pub async fn send_with_retry<F>(&self, build: F) -> anyhow::Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            match build(&self.client).send().await {
                Ok(response) if response.status().is_server_error() && attempt < self.max_retries => {
                    warn!(
                        url = %response.url(),
                        status = %response.status(),
                        attempt,
                        "Upstream answered with a server error, retrying"
                    );
                }
                Ok(response) => {
                    if attempt > 1 {
                        info!(url = %response.url(), attempt, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if attempt < self.max_retries => {
                    warn!(attempt, error = %e, "Request attempt failed");
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(self.base_delay * 2_u32.pow(attempt)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Downloader for HttpClient {
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        debug!(url = %url, "Starting download");

        let response = self.send_with_retry(|client| client.get(url)).await?;
        response.error_for_status_ref()?;

        let content = response.bytes().await?;
        debug!(url = %url, bytes = content.len(), "Download completed");
        Ok(content.to_vec())
    }
}
