// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use crate::registry::{models::{RegistryUpdate, TrackedApplication}, traits::Registry};

/// JSON document holding the sync state of every application that has one
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    apps: BTreeMap<String, TrackedApplication>,
}

/// Registry backed by a hand-editable `apps.txt` plus a JSON state document.
///
/// The tracked set is the union of the identifier list and the state
/// document. Writes go to the state document only, except `remove`, which
/// also drops the identifier from the list.
pub struct FileRegistry {
    apps_file: PathBuf,
    state_file: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(apps_file: impl Into<PathBuf>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            apps_file: apps_file.into(),
            state_file: state_file.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_ids(&self) -> anyhow::Result<Vec<String>> {
        let contents = match tokio::fs::read_to_string(&self.apps_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.apps_file.display()));
            }
        };

        let mut ids: Vec<String> = Vec::new();
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !ids.iter().any(|id| id == line) {
                ids.push(line.to_string());
            }
        }
        Ok(ids)
    }

    async fn read_state(&self) -> anyhow::Result<StateDocument> {
        let contents = match tokio::fs::read(&self.state_file).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateDocument::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.state_file.display()));
            }
        };

        serde_json::from_slice(&contents)
            .with_context(|| format!("parsing {}", self.state_file.display()))
    }

    async fn write_state(&self, state: &StateDocument) -> anyhow::Result<()> {
        let contents = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.state_file, contents).await
    }
}

/// Replace `path` with `contents` through a temp file in the same directory
async fn write_atomic(path: &Path, contents: Vec<u8>) -> anyhow::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    })
    .await?
}

#[async_trait]
impl Registry for FileRegistry {
    async fn list(&self) -> anyhow::Result<Vec<TrackedApplication>> {
        let ids = self.read_ids().await?;
        let mut state = self.read_state().await?;

        let mut apps = Vec::with_capacity(ids.len() + state.apps.len());
        for id in ids {
            let app = state
                .apps
                .remove(&id)
                .unwrap_or_else(|| TrackedApplication::new(id.as_str()));
            apps.push(app);
        }
        apps.extend(state.apps.into_values());

        debug!(count = apps.len(), "Listed tracked applications from files");
        Ok(apps)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<TrackedApplication>> {
        let mut state = self.read_state().await?;
        if let Some(app) = state.apps.remove(id) {
            return Ok(Some(app));
        }

        let ids = self.read_ids().await?;
        Ok(ids.iter().any(|known| known == id).then(|| TrackedApplication::new(id)))
    }

    async fn upsert(&self, id: &str, update: RegistryUpdate) -> anyhow::Result<()> {
        let update = update.normalized();
        let _guard = self.write_lock.lock().await;

        let mut state = self.read_state().await?;
        state
            .apps
            .entry(id.to_string())
            .or_insert_with(|| TrackedApplication::new(id))
            .apply(&update);
        self.write_state(&state).await?;

        info!(app_id = %id, "Upserted tracked application");
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut state = self.read_state().await?;
        let in_state = state.apps.remove(id).is_some();
        if in_state {
            self.write_state(&state).await?;
        }

        let ids = self.read_ids().await?;
        let in_list = ids.iter().any(|known| known == id);
        if in_list {
            let mut remaining: String = ids
                .into_iter()
                .filter(|known| known != id)
                .collect::<Vec<_>>()
                .join("\n");
            if !remaining.is_empty() {
                remaining.push('\n');
            }
            write_atomic(&self.apps_file, remaining.into_bytes()).await?;
        }

        let removed = in_state || in_list;
        if removed {
            info!(app_id = %id, "Removed tracked application");
        }
        Ok(removed)
    }
}
