// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use crate::registry::models::{RegistryUpdate, TrackedApplication};

#[async_trait]
pub trait Registry: Send + Sync {
    /// List every tracked application (order is not significant)
    async fn list(&self) -> anyhow::Result<Vec<TrackedApplication>>;

    /// Get one application by identifier; `None` when it is not tracked
    async fn get(&self, id: &str) -> anyhow::Result<Option<TrackedApplication>>;

    /// Merge the provided fields into the record, creating it if absent.
    /// Fields left `None` keep their stored value.
    async fn upsert(&self, id: &str, update: RegistryUpdate) -> anyhow::Result<()>;

    /// Administrative removal. Returns whether a record existed.
    async fn remove(&self, id: &str) -> anyhow::Result<bool>;
}
