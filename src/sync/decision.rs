// SPDX-License-Identifier: GPL-3.0-only
use serde::Serialize;
use crate::registry::TrackedApplication;
use crate::resolver::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// Upstream content matches what was last mirrored
    Unchanged,
    /// Upstream content must be mirrored and announced
    NewContent,
    /// Upstream could not be consulted; nothing may change
    Unknown,
}

/// Compare the latest upstream answer with the registry's last-known state
pub fn decide(state: &TrackedApplication, resolved: &Resolution) -> SyncDecision {
    let info = match resolved {
        Resolution::Unknown { .. } => return SyncDecision::Unknown,
        Resolution::Resolved(info) => info,
    };

    if !state.has_content() {
        return SyncDecision::NewContent;
    }

    if state.content_id == info.content_id {
        SyncDecision::Unchanged
    } else {
        SyncDecision::NewContent
    }
}
