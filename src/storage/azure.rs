// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;
use crate::storage::traits::BlobStore;

const STORAGE_API_VERSION: &str = "2021-08-06";

/// Blob container accessed through the Blob service REST API with a SAS token
pub struct AzureBlobStore {
    client: Client,
    container_url: Url,
    sas_token: String,
}

fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("yaml") | Some("yml") => "application/x-yaml",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

impl AzureBlobStore {
    pub fn new(container_url: &str, sas_token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::downloader::USER_AGENT)
            .build()?;
        let container_url = Url::parse(container_url)
            .with_context(|| format!("invalid blob container URL '{}'", container_url))?;

        Ok(Self {
            client,
            container_url,
            sas_token: sas_token.trim_start_matches('?').to_string(),
        })
    }

    /// Public blob URL, without credentials
    fn blob_url(&self, path: &str) -> anyhow::Result<Url> {
        let mut url = self.container_url.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("blob container URL cannot be a base URL"))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn build_request(&self, method: Method, blob_url: &Url) -> reqwest::RequestBuilder {
        let mut signed = blob_url.clone();
        if !self.sas_token.is_empty() {
            signed.set_query(Some(&self.sas_token));
        }
        self.client
            .request(method, signed)
            .header("x-ms-version", STORAGE_API_VERSION)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        let url = self.blob_url(path)?;
        let size = bytes.len();

        let response = self
            .build_request(Method::PUT, &url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type(path))
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, blob = %url, "Blob upload failed");
            return Err(anyhow::anyhow!("blob upload failed: {} - {}", status, text));
        }

        debug!(blob = %url, bytes = size, "Uploaded blob");
        Ok(url.to_string())
    }

    async fn get(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.blob_url(path)?;
        let response = self.build_request(Method::GET, &url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(anyhow::anyhow!("blob {} does not exist", url)),
            status => Err(anyhow::anyhow!("blob download failed: {}", status)),
        }
    }
}
