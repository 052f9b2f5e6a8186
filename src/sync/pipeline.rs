// SPDX-License-Identifier: GPL-3.0-only
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};
use crate::downloader::Downloader;
use crate::error::{describe, PipelineFailure};
use crate::notify::{ChangeNotification, ChangeStatus, Notifier};
use crate::registry::{Registry, RegistryUpdate, TrackedApplication};
use crate::resolver::{ContentKind, UpstreamVersionInfo};
use crate::storage::BlobStore;
use crate::utils::{blob_path, filename_from_url, sha256_hex};

const FALLBACK_FILENAME: &str = "manifest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    Stored { blob_path: String, status: ChangeStatus },
    /// The downloaded content turned out to be what the registry already holds
    SkippedUnchanged,
    Failed(PipelineFailure),
}

/// Download, store, announce, commit.
///
/// The notification goes out before the registry commit: a failed
/// notification leaves the old content id in place so the next run retries
/// it, at the cost of a duplicate message when only the commit fails.
pub struct ArtifactPipeline {
    downloader: Arc<dyn Downloader>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    registry: Arc<dyn Registry>,
    blob_prefix: String,
}

impl ArtifactPipeline {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        registry: Arc<dyn Registry>,
        blob_prefix: impl Into<String>,
    ) -> Self {
        Self {
            downloader,
            blobs,
            notifier,
            registry,
            blob_prefix: blob_prefix.into(),
        }
    }

    fn failed(app_id: &str, failure: PipelineFailure) -> PipelineResult {
        error!(app_id = %app_id, stage = failure.stage(), error = %failure, "Pipeline failed");
        PipelineResult::Failed(failure)
    }

    pub async fn sync(&self, state: &TrackedApplication, resolved: &UpstreamVersionInfo) -> PipelineResult {
        let app_id = state.id.as_str();

        let bytes = match self.downloader.fetch_bytes(&resolved.download_url).await {
            Ok(bytes) => bytes,
            Err(e) => return Self::failed(app_id, PipelineFailure::Download(describe(&e))),
        };

        let content_id = match resolved.content_kind {
            ContentKind::Sha256 => sha256_hex(&bytes),
            ContentKind::Revision => resolved.content_id.clone(),
        };
        if state.has_content() && state.content_id == content_id {
            debug!(app_id = %app_id, content_id = %content_id, "Downloaded content already mirrored");
            return PipelineResult::SkippedUnchanged;
        }

        let filename = filename_from_url(&resolved.download_url).unwrap_or(FALLBACK_FILENAME);
        let path = match blob_path(&self.blob_prefix, app_id, &resolved.version, filename) {
            Ok(path) => path,
            Err(e) => return Self::failed(app_id, PipelineFailure::Upload(describe(&e))),
        };

        let location = match self.blobs.put(&path, bytes).await {
            Ok(location) => location,
            Err(e) => return Self::failed(app_id, PipelineFailure::Upload(describe(&e))),
        };

        let status = if state.has_content() {
            ChangeStatus::Updated
        } else {
            ChangeStatus::New
        };
        let notification = ChangeNotification {
            application_name: app_id.to_string(),
            application_version: resolved.version.clone(),
            blob_url: location,
            github_url: resolved.download_url.clone(),
            status,
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            return Self::failed(app_id, PipelineFailure::Notify(describe(&e)));
        }

        let update = RegistryUpdate::synced(
            resolved.version.clone(),
            content_id,
            path.clone(),
            resolved.download_url.clone(),
            Utc::now(),
        );
        if let Err(e) = self.registry.upsert(app_id, update).await {
            return Self::failed(app_id, PipelineFailure::Registry(describe(&e)));
        }

        info!(
            app_id = %app_id,
            version = %resolved.version,
            blob_path = %path,
            status = %status,
            "Mirrored manifest"
        );
        PipelineResult::Stored { blob_path: path, status }
    }
}
