// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-known sync state of one application. Empty strings mean "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedApplication {
    /// Package identifier, unique within the registry
    pub id: String,

    /// Last mirrored version
    #[serde(default)]
    pub version: String,

    /// Content identifier (git tree SHA or SHA-256) of the last mirrored manifest
    #[serde(default)]
    pub content_id: String,

    /// Blob path the last manifest was written to
    #[serde(default)]
    pub blob_path: String,

    /// Upstream URL the last manifest was downloaded from
    #[serde(default)]
    pub source_url: String,

    /// When the last successful sync committed
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TrackedApplication {
    /// A freshly registered application with no sync history
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: String::new(),
            content_id: String::new(),
            blob_path: String::new(),
            source_url: String::new(),
            updated_at: None,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content_id.is_empty()
    }

    /// Merge the provided fields of `update`, leaving the rest untouched
    pub fn apply(&mut self, update: &RegistryUpdate) {
        if let Some(ref version) = update.version {
            self.version = version.clone();
        }
        if let Some(ref content_id) = update.content_id {
            self.content_id = content_id.clone();
        }
        if let Some(ref blob_path) = update.blob_path {
            self.blob_path = blob_path.clone();
        }
        if let Some(ref source_url) = update.source_url {
            self.source_url = source_url.clone();
        }
        if let Some(updated_at) = update.updated_at {
            self.updated_at = Some(updated_at);
        }
    }
}

/// Partial field set for `Registry::upsert`.
///
/// Constructors drop empty strings so an upsert never clobbers a known value
/// with "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryUpdate {
    pub version: Option<String>,
    pub content_id: Option<String>,
    pub blob_path: Option<String>,
    pub source_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn provided(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.trim().is_empty() { None } else { Some(value) }
}

impl RegistryUpdate {
    /// The update committed after a manifest was stored. Content id and blob
    /// path always travel together.
    pub fn synced(
        version: impl Into<String>,
        content_id: impl Into<String>,
        blob_path: impl Into<String>,
        source_url: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: provided(version),
            content_id: provided(content_id),
            blob_path: provided(blob_path),
            source_url: provided(source_url),
            updated_at: Some(at),
        }
    }

    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = provided(source_url);
        self
    }

    /// Drop fields holding only whitespace; backends call this before writing
    pub fn normalized(self) -> Self {
        Self {
            version: self.version.and_then(|v| provided(v)),
            content_id: self.content_id.and_then(|v| provided(v)),
            blob_path: self.blob_path.and_then(|v| provided(v)),
            source_url: self.source_url.and_then(|v| provided(v)),
            updated_at: self.updated_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.content_id.is_none()
            && self.blob_path.is_none()
            && self.source_url.is_none()
            && self.updated_at.is_none()
    }
}
