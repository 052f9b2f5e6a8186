// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use crate::resolver::models::Resolution;

#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    /// Resolve the latest upstream version of `app_id`.
    ///
    /// Never fails: transport errors, error statuses, undecodable bodies and
    /// listings without version-like entries all come back as
    /// `Resolution::Unknown`.
    async fn resolve_latest(&self, app_id: &str) -> Resolution;
}
