// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `path` (`/`-separated, already sanitized), replacing
    /// any existing blob. Returns the location consumers use to fetch it.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> anyhow::Result<String>;

    /// Read the blob at `path`
    async fn get(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}
