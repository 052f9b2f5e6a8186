// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download the full body at `url`; any non-success status is an error
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}
