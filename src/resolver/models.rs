// SPDX-License-Identifier: GPL-3.0-only
use serde::Serialize;

/// How a content identifier was derived, which decides whether the pipeline
/// recomputes it from the downloaded bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Opaque upstream identifier (git tree SHA, published checksum), reused as-is
    Revision,
    /// Hex SHA-256 of the manifest bytes
    Sha256,
}

/// Latest upstream version of one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamVersionInfo {
    pub app_id: String,
    pub version: String,
    pub content_id: String,
    pub content_kind: ContentKind,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(UpstreamVersionInfo),
    /// Upstream could not be consulted or held nothing usable
    Unknown { reason: String },
}

impl Resolution {
    pub fn unknown(reason: impl Into<String>) -> Self {
        Resolution::Unknown { reason: reason.into() }
    }

    pub fn info(&self) -> Option<&UpstreamVersionInfo> {
        match self {
            Resolution::Resolved(info) => Some(info),
            Resolution::Unknown { .. } => None,
        }
    }
}
