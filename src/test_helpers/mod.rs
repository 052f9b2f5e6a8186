// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use crate::config::Config;
use crate::downloader::Downloader;
use crate::notify::{ChangeNotification, Notifier};
use crate::registry::{Registry, RegistryUpdate, SqliteRegistry, TrackedApplication};
use crate::resolver::{Resolution, UpstreamResolver};
use crate::storage::BlobStore;

/// Create an in-memory SQLite registry for testing
pub async fn memory_registry() -> Arc<SqliteRegistry> {
    Arc::new(SqliteRegistry::in_memory().await.expect("in-memory registry"))
}

/// Create a test configuration whose files all live under `dir`
pub fn create_test_config(dir: &Path) -> Config {
    Config {
        log_level: "error".to_string(),
        apps_file: dir.join("apps.txt"),
        state_file: dir.join("apps-state.json"),
        registry_db_path: dir.join("registry.db"),
        blob_local_dir: dir.join("blobs"),
        ..Config::default()
    }
}

/// Blob store keeping everything in a map; locations are `memory://<path>`
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        self.blobs.lock().unwrap().insert(path.to_string(), bytes);
        Ok(format!("memory://{}", path))
    }

    async fn get(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.contents(path)
            .ok_or_else(|| anyhow::anyhow!("no blob at {}", path))
    }
}

/// Blob store whose writes always fail
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, _path: &str, _bytes: Vec<u8>) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("storage unavailable"))
    }

    async fn get(&self, _path: &str) -> anyhow::Result<Vec<u8>> {
        Err(anyhow::anyhow!("storage unavailable"))
    }
}

/// Notifier that records every notification, or fails every send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<ChangeNotification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<ChangeNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &ChangeNotification) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow::anyhow!("queue unavailable"));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Downloader serving fixed bodies by URL; unknown URLs fail
#[derive(Default)]
pub struct StaticDownloader {
    bodies: HashMap<String, Vec<u8>>,
}

impl StaticDownloader {
    pub fn with(url: &str, body: &[u8]) -> Self {
        Self::default().and(url, body)
    }

    pub fn and(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }
}

#[async_trait]
impl Downloader for StaticDownloader {
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {}", url))
    }
}

/// Resolver answering from a fixed table; unlisted ids are unknown
#[derive(Default)]
pub struct StaticResolver {
    answers: HashMap<String, Resolution>,
}

impl StaticResolver {
    pub fn answer(mut self, app_id: &str, resolution: Resolution) -> Self {
        self.answers.insert(app_id.to_string(), resolution);
        self
    }
}

#[async_trait]
impl UpstreamResolver for StaticResolver {
    async fn resolve_latest(&self, app_id: &str) -> Resolution {
        self.answers
            .get(app_id)
            .cloned()
            .unwrap_or_else(|| Resolution::unknown(format!("no upstream answer for {}", app_id)))
    }
}

/// Registry whose every operation fails
pub struct FailingRegistry;

#[async_trait]
impl Registry for FailingRegistry {
    async fn list(&self) -> anyhow::Result<Vec<TrackedApplication>> {
        Err(anyhow::anyhow!("registry unavailable"))
    }

    async fn get(&self, _id: &str) -> anyhow::Result<Option<TrackedApplication>> {
        Err(anyhow::anyhow!("registry unavailable"))
    }

    async fn upsert(&self, _id: &str, _update: RegistryUpdate) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("registry unavailable"))
    }

    async fn remove(&self, _id: &str) -> anyhow::Result<bool> {
        Err(anyhow::anyhow!("registry unavailable"))
    }
}
