// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// First content ever mirrored for the application
    New,
    Updated,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::New => "new",
            ChangeStatus::Updated => "updated",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message announcing a newly mirrored manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeNotification {
    pub application_name: String,
    pub application_version: String,
    /// Where the mirrored manifest was stored
    pub blob_url: String,
    /// Where the manifest was downloaded from
    pub github_url: String,
    pub status: ChangeStatus,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &ChangeNotification) -> anyhow::Result<()>;
}
