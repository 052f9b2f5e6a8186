// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use tracing::info;
use crate::notify::traits::{ChangeNotification, Notifier};

/// Notifier used when no queue is configured: one structured log line
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &ChangeNotification) -> anyhow::Result<()> {
        info!(
            app_id = %notification.application_name,
            version = %notification.application_version,
            blob_url = %notification.blob_url,
            source_url = %notification.github_url,
            status = %notification.status,
            "Manifest changed"
        );
        Ok(())
    }
}
