// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use crate::error::{describe, PipelineFailure};
use crate::notify::ChangeStatus;
use crate::registry::{Registry, TrackedApplication};
use crate::resolver::{RecentChanges, Resolution, UpstreamResolver};
use crate::sync::{decide, ArtifactPipeline, PipelineResult, SyncDecision};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Restrict the run to these ids; empty means every tracked application
    pub apps: Vec<String>,
    /// Decide and report without downloading or writing anything
    pub dry_run: bool,
    /// Only process applications named by pull requests merged in this window
    pub since_hours: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppOutcome {
    Stored {
        version: String,
        blob_path: String,
        status: ChangeStatus,
    },
    Unchanged,
    SkippedUnknown {
        reason: String,
    },
    /// Dry run: new content was found and left alone
    WouldSync {
        version: String,
    },
    Failed {
        stage: &'static str,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppReport {
    pub app_id: String,
    pub decision: SyncDecision,
    #[serde(flatten)]
    pub outcome: AppOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub apps: Vec<AppReport>,
    pub stored: usize,
    pub unchanged: usize,
    pub skipped_unknown: usize,
    pub would_sync: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, report: AppReport) {
        match report.outcome {
            AppOutcome::Stored { .. } => self.stored += 1,
            AppOutcome::Unchanged => self.unchanged += 1,
            AppOutcome::SkippedUnknown { .. } => self.skipped_unknown += 1,
            AppOutcome::WouldSync { .. } => self.would_sync += 1,
            AppOutcome::Failed { .. } => self.failed += 1,
        }
        self.apps.push(report);
    }

    pub fn outcome_of(&self, app_id: &str) -> Option<&AppOutcome> {
        self.apps.iter().find(|r| r.app_id == app_id).map(|r| &r.outcome)
    }
}

/// Drives registry, resolver, decision and pipeline over a batch of applications
pub struct SyncRunner {
    registry: Arc<dyn Registry>,
    resolver: Arc<dyn UpstreamResolver>,
    pipeline: ArtifactPipeline,
    recent: Option<RecentChanges>,
    concurrency: usize,
}

impl SyncRunner {
    pub fn new(
        registry: Arc<dyn Registry>,
        resolver: Arc<dyn UpstreamResolver>,
        pipeline: ArtifactPipeline,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            pipeline,
            recent: None,
            concurrency: concurrency.max(1),
        }
    }

    pub fn with_recent_changes(mut self, recent: Option<RecentChanges>) -> Self {
        self.recent = recent;
        self
    }

    /// Run one pass. Only a failure to list the registry is an error;
    /// per-application failures, explicit lookups included, land in the report.
    pub async fn run(&self, options: &SyncOptions) -> anyhow::Result<SyncReport> {
        let (mut targets, lookup_failures) = self.targets(&options.apps).await?;

        if let Some(hours) = options.since_hours {
            targets = self.filter_recent(targets, hours).await?;
        }

        info!(
            count = targets.len(),
            dry_run = options.dry_run,
            concurrency = self.concurrency,
            "Starting sync pass"
        );

        let reports: Vec<AppReport> = stream::iter(targets)
            .map(|app| self.process(app, options.dry_run))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = SyncReport::default();
        for report in lookup_failures.into_iter().chain(reports) {
            summary.record(report);
        }

        info!(
            stored = summary.stored,
            unchanged = summary.unchanged,
            skipped_unknown = summary.skipped_unknown,
            would_sync = summary.would_sync,
            failed = summary.failed,
            "Sync pass finished"
        );
        Ok(summary)
    }

    async fn targets(&self, apps: &[String]) -> anyhow::Result<(Vec<TrackedApplication>, Vec<AppReport>)> {
        if apps.is_empty() {
            let listed = self.registry.list().await.context("listing tracked applications")?;
            return Ok((listed, Vec::new()));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(apps.len());
        let mut failures = Vec::new();
        for id in apps {
            let id = id.trim();
            if id.is_empty() || !seen.insert(id) {
                continue;
            }
            match self.registry.get(id).await {
                Ok(Some(app)) => targets.push(app),
                Ok(None) => {
                    info!(app_id = %id, "Application not tracked yet, treating as first sync");
                    targets.push(TrackedApplication::new(id));
                }
                Err(e) => {
                    let message = describe(&e);
                    error!(app_id = %id, error = %message, "Registry lookup failed");
                    failures.push(AppReport {
                        app_id: id.to_string(),
                        decision: SyncDecision::Unknown,
                        outcome: AppOutcome::Failed {
                            stage: "registry",
                            error: format!("registry lookup failed: {}", message),
                        },
                    });
                }
            }
        }
        Ok((targets, failures))
    }

    async fn filter_recent(
        &self,
        targets: Vec<TrackedApplication>,
        hours: u64,
    ) -> anyhow::Result<Vec<TrackedApplication>> {
        let Some(feed) = self.recent.as_ref() else {
            anyhow::bail!("recent-change filtering is only available for the winget upstream");
        };

        let hours = i64::try_from(hours).context("since_hours out of range")?;
        let since = Utc::now() - ChronoDuration::hours(hours);

        match feed.changed_since(since).await {
            Ok(changed) => {
                let kept: Vec<TrackedApplication> = targets
                    .into_iter()
                    .filter(|app| changed.iter().any(|c| c.eq_ignore_ascii_case(&app.id)))
                    .collect();
                info!(changed = changed.len(), kept = kept.len(), "Applied recent-change filter");
                Ok(kept)
            }
            Err(e) => {
                warn!(error = %describe(&e), "Recent-change feed unavailable, nothing to process");
                Ok(Vec::new())
            }
        }
    }

    async fn process(&self, state: TrackedApplication, dry_run: bool) -> AppReport {
        let resolution = self.resolver.resolve_latest(&state.id).await;
        let decision = decide(&state, &resolution);
        debug!(
            app_id = %state.id,
            upstream_version = resolution.info().map(|i| i.version.as_str()).unwrap_or("-"),
            decision = ?decision,
            "Decided"
        );

        let outcome = match resolution {
            Resolution::Unknown { reason } => {
                warn!(app_id = %state.id, reason = %reason, "Upstream unavailable, skipping");
                AppOutcome::SkippedUnknown { reason }
            }
            Resolution::Resolved(info) => match decision {
                SyncDecision::Unchanged => {
                    info!(app_id = %state.id, version = %info.version, "Up to date");
                    AppOutcome::Unchanged
                }
                _ if dry_run => {
                    info!(app_id = %state.id, version = %info.version, "New content (dry run)");
                    AppOutcome::WouldSync { version: info.version }
                }
                _ => match self.pipeline.sync(&state, &info).await {
                    PipelineResult::Stored { blob_path, status } => AppOutcome::Stored {
                        version: info.version,
                        blob_path,
                        status,
                    },
                    PipelineResult::SkippedUnchanged => AppOutcome::Unchanged,
                    PipelineResult::Failed(failure) => failed(failure),
                },
            },
        };

        AppReport {
            app_id: state.id,
            decision,
            outcome,
        }
    }
}

fn failed(failure: PipelineFailure) -> AppOutcome {
    AppOutcome::Failed {
        stage: failure.stage(),
        error: failure.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::HttpClient;
    use crate::registry::RegistryUpdate;
    use crate::resolver::{ContentKind, UpstreamVersionInfo};
    use crate::test_helpers::{
        memory_registry, FailingBlobStore, FailingRegistry, MemoryBlobStore, RecordingNotifier, StaticDownloader,
        StaticResolver,
    };
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn url(app_id: &str, version: &str) -> String {
        format!("https://raw.example.com/{}/{}/{}.installer.yaml", app_id, version, app_id)
    }

    fn resolved(app_id: &str, version: &str, content_id: &str) -> Resolution {
        Resolution::Resolved(UpstreamVersionInfo {
            app_id: app_id.to_string(),
            version: version.to_string(),
            content_id: content_id.to_string(),
            content_kind: ContentKind::Revision,
            download_url: url(app_id, version),
        })
    }

    struct Fixture {
        registry: Arc<crate::registry::SqliteRegistry>,
        blobs: Arc<MemoryBlobStore>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Fixture {
        async fn new() -> Self {
            Self {
                registry: memory_registry().await,
                blobs: Arc::new(MemoryBlobStore::default()),
                notifier: Arc::new(RecordingNotifier::default()),
            }
        }

        fn runner(&self, resolver: StaticResolver, downloader: StaticDownloader, concurrency: usize) -> SyncRunner {
            let pipeline = ArtifactPipeline::new(
                Arc::new(downloader),
                self.blobs.clone(),
                self.notifier.clone(),
                self.registry.clone(),
                "",
            );
            SyncRunner::new(self.registry.clone(), Arc::new(resolver), pipeline, concurrency)
        }

        async fn track(&self, id: &str, version: &str, content_id: &str) {
            let update = RegistryUpdate::synced(version, content_id, format!("{}/{}/m.yaml", id, version), "", Utc::now());
            self.registry.upsert(id, update).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_first_sync_is_stored() {
        let fx = Fixture::new().await;
        fx.registry.upsert("App.X", RegistryUpdate::default()).await.unwrap();

        let runner = fx.runner(
            StaticResolver::default().answer("App.X", resolved("App.X", "2.0.0", "abc123")),
            StaticDownloader::with(&url("App.X", "2.0.0"), b"manifest"),
            1,
        );
        let report = runner.run(&SyncOptions::default()).await.unwrap();

        assert_eq!(report.stored, 1);
        assert_eq!(
            report.outcome_of("App.X"),
            Some(&AppOutcome::Stored {
                version: "2.0.0".to_string(),
                blob_path: "App.X/2.0.0/App.X.installer.yaml".to_string(),
                status: ChangeStatus::New,
            })
        );
        let app = fx.registry.get("App.X").await.unwrap().unwrap();
        assert_eq!(app.content_id, "abc123");
        assert_eq!(app.blob_path, "App.X/2.0.0/App.X.installer.yaml");
        assert_eq!(fx.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_content_is_skipped() {
        let fx = Fixture::new().await;
        fx.track("App.X", "2.0.0", "abc123").await;
        let before = fx.registry.get("App.X").await.unwrap();

        let runner = fx.runner(
            StaticResolver::default().answer("App.X", resolved("App.X", "2.0.0", "abc123")),
            StaticDownloader::default(),
            1,
        );
        let report = runner.run(&SyncOptions::default()).await.unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.apps[0].decision, SyncDecision::Unchanged);
        assert_eq!(fx.blobs.len(), 0);
        assert!(fx.notifier.sent().is_empty());
        assert_eq!(fx.registry.get("App.X").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_old_content_id() {
        let fx = Fixture::new().await;
        fx.track("App.X", "1.0.0", "old").await;

        let pipeline = ArtifactPipeline::new(
            Arc::new(StaticDownloader::with(&url("App.X", "2.0.0"), b"manifest")),
            Arc::new(FailingBlobStore),
            fx.notifier.clone(),
            fx.registry.clone(),
            "",
        );
        let runner = SyncRunner::new(
            fx.registry.clone(),
            Arc::new(StaticResolver::default().answer("App.X", resolved("App.X", "2.0.0", "new"))),
            pipeline,
            1,
        );
        let report = runner.run(&SyncOptions::default()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert!(matches!(report.outcome_of("App.X"), Some(AppOutcome::Failed { stage: "upload", .. })));
        assert_eq!(fx.registry.get("App.X").await.unwrap().unwrap().content_id, "old");
        assert!(fx.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_upstream_is_skipped_without_error() {
        let fx = Fixture::new().await;
        fx.track("App.X", "1.0.0", "old").await;
        let before = fx.registry.get("App.X").await.unwrap();

        let runner = fx.runner(
            StaticResolver::default().answer("App.X", Resolution::unknown("HTTP 503")),
            StaticDownloader::default(),
            1,
        );
        let report = runner.run(&SyncOptions::default()).await.unwrap();

        assert_eq!(report.skipped_unknown, 1);
        assert_eq!(report.apps[0].decision, SyncDecision::Unknown);
        assert_eq!(
            report.outcome_of("App.X"),
            Some(&AppOutcome::SkippedUnknown { reason: "HTTP 503".to_string() })
        );
        assert_eq!(fx.registry.get("App.X").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_batch() {
        let fx = Fixture::new().await;
        fx.track("App.A", "1.0", "a1").await;
        fx.track("App.B", "1.0", "b1").await;
        fx.track("App.C", "1.0", "c1").await;

        let runner = fx.runner(
            StaticResolver::default()
                .answer("App.A", resolved("App.A", "2.0", "a2"))
                .answer("App.B", resolved("App.B", "2.0", "b2"))
                .answer("App.C", resolved("App.C", "1.0", "c1")),
            // App.A has no body to download
            StaticDownloader::with(&url("App.B", "2.0"), b"b"),
            3,
        );
        let report = runner.run(&SyncOptions::default()).await.unwrap();

        assert_eq!(report.apps.len(), 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(report.unchanged, 1);
        assert!(matches!(report.outcome_of("App.A"), Some(AppOutcome::Failed { stage: "download", .. })));
        assert_eq!(fx.registry.get("App.B").await.unwrap().unwrap().content_id, "b2");
        assert_eq!(fx.registry.get("App.A").await.unwrap().unwrap().content_id, "a1");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let fx = Fixture::new().await;
        fx.track("App.X", "1.0.0", "old").await;

        let runner = fx.runner(
            StaticResolver::default().answer("App.X", resolved("App.X", "2.0.0", "new")),
            StaticDownloader::with(&url("App.X", "2.0.0"), b"manifest"),
            1,
        );
        let options = SyncOptions { dry_run: true, ..SyncOptions::default() };
        let report = runner.run(&options).await.unwrap();

        assert_eq!(report.would_sync, 1);
        assert_eq!(report.apps[0].decision, SyncDecision::NewContent);
        assert_eq!(fx.blobs.len(), 0);
        assert!(fx.notifier.sent().is_empty());
        assert_eq!(fx.registry.get("App.X").await.unwrap().unwrap().content_id, "old");
    }

    #[tokio::test]
    async fn test_explicit_untracked_app_is_first_sync() {
        let fx = Fixture::new().await;
        fx.track("App.Other", "1.0", "o1").await;

        let runner = fx.runner(
            StaticResolver::default().answer("New.App", resolved("New.App", "0.1", "n1")),
            StaticDownloader::with(&url("New.App", "0.1"), b"n"),
            1,
        );
        let options = SyncOptions {
            apps: vec!["New.App".to_string(), "New.App".to_string()],
            ..SyncOptions::default()
        };
        let report = runner.run(&options).await.unwrap();

        assert_eq!(report.apps.len(), 1);
        assert!(matches!(
            report.outcome_of("New.App"),
            Some(AppOutcome::Stored { status: ChangeStatus::New, .. })
        ));
        assert_eq!(fx.registry.get("New.App").await.unwrap().unwrap().content_id, "n1");
        assert_eq!(fx.registry.get("App.Other").await.unwrap().unwrap().content_id, "o1");
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let pipeline = ArtifactPipeline::new(
            Arc::new(StaticDownloader::default()),
            Arc::new(MemoryBlobStore::default()),
            Arc::new(RecordingNotifier::default()),
            Arc::new(FailingRegistry),
            "",
        );
        let runner = SyncRunner::new(Arc::new(FailingRegistry), Arc::new(StaticResolver::default()), pipeline, 1);

        assert!(runner.run(&SyncOptions::default()).await.is_err());
    }

    /// Registry whose lookups fail for a single id
    struct BrokenLookup {
        inner: Arc<crate::registry::SqliteRegistry>,
        broken: &'static str,
    }

    #[async_trait::async_trait]
    impl Registry for BrokenLookup {
        async fn list(&self) -> anyhow::Result<Vec<TrackedApplication>> {
            self.inner.list().await
        }

        async fn get(&self, id: &str) -> anyhow::Result<Option<TrackedApplication>> {
            if id == self.broken {
                anyhow::bail!("database is locked");
            }
            self.inner.get(id).await
        }

        async fn upsert(&self, id: &str, update: RegistryUpdate) -> anyhow::Result<()> {
            self.inner.upsert(id, update).await
        }

        async fn remove(&self, id: &str) -> anyhow::Result<bool> {
            self.inner.remove(id).await
        }
    }

    #[tokio::test]
    async fn test_failed_lookup_does_not_stop_other_apps() {
        let fx = Fixture::new().await;
        fx.track("App.A", "1.0", "a1").await;
        fx.track("App.B", "1.0", "b1").await;

        let pipeline = ArtifactPipeline::new(
            Arc::new(StaticDownloader::with(&url("App.A", "2.0"), b"a").and(&url("App.B", "2.0"), b"b")),
            fx.blobs.clone(),
            fx.notifier.clone(),
            fx.registry.clone(),
            "",
        );
        let registry = BrokenLookup { inner: fx.registry.clone(), broken: "App.A" };
        let runner = SyncRunner::new(
            Arc::new(registry),
            Arc::new(
                StaticResolver::default()
                    .answer("App.A", resolved("App.A", "2.0", "a2"))
                    .answer("App.B", resolved("App.B", "2.0", "b2")),
            ),
            pipeline,
            1,
        );
        let options = SyncOptions {
            apps: vec!["App.A".to_string(), "App.B".to_string()],
            ..SyncOptions::default()
        };
        let report = runner.run(&options).await.unwrap();

        assert_eq!(report.apps.len(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 1);
        match report.outcome_of("App.A") {
            Some(AppOutcome::Failed { stage, error }) => {
                assert_eq!(*stage, "registry");
                assert!(error.contains("database is locked"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(report.outcome_of("App.B"), Some(AppOutcome::Stored { .. })));
        assert_eq!(fx.registry.get("App.A").await.unwrap().unwrap().content_id, "a1");
        assert_eq!(fx.registry.get("App.B").await.unwrap().unwrap().content_id, "b2");
    }

    fn recent_feed(server: &Server) -> RecentChanges {
        let http = HttpClient::new(Duration::from_secs(5))
            .unwrap()
            .with_retry_policy(1, Duration::ZERO);
        RecentChanges::new(Arc::new(http), format!("{}/pulls", server.url()), None)
    }

    #[tokio::test]
    async fn test_recent_filter_narrows_targets() {
        let mut server = Server::new_async().await;
        let merged = Utc::now().to_rfc3339();
        let _m = server
            .mock("GET", "/pulls")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"[{{"title": "New version: app.b version 2.0", "merged_at": "{merged}"}}]"#))
            .create_async()
            .await;

        let fx = Fixture::new().await;
        fx.track("App.A", "1.0", "a1").await;
        fx.track("App.B", "1.0", "b1").await;

        let runner = fx
            .runner(
                StaticResolver::default()
                    .answer("App.A", resolved("App.A", "2.0", "a2"))
                    .answer("App.B", resolved("App.B", "2.0", "b2")),
                StaticDownloader::with(&url("App.A", "2.0"), b"a").and(&url("App.B", "2.0"), b"b"),
                1,
            )
            .with_recent_changes(Some(recent_feed(&server)));
        let options = SyncOptions { since_hours: Some(24), ..SyncOptions::default() };
        let report = runner.run(&options).await.unwrap();

        assert_eq!(report.apps.len(), 1);
        assert_eq!(report.apps[0].app_id, "App.B");
        assert_eq!(fx.registry.get("App.A").await.unwrap().unwrap().content_id, "a1");
    }

    #[tokio::test]
    async fn test_recent_feed_failure_processes_nothing() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/pulls")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let fx = Fixture::new().await;
        fx.track("App.A", "1.0", "a1").await;

        let runner = fx
            .runner(
                StaticResolver::default().answer("App.A", resolved("App.A", "2.0", "a2")),
                StaticDownloader::with(&url("App.A", "2.0"), b"a"),
                1,
            )
            .with_recent_changes(Some(recent_feed(&server)));
        let options = SyncOptions { since_hours: Some(24), ..SyncOptions::default() };
        let report = runner.run(&options).await.unwrap();

        assert!(report.apps.is_empty());
        assert_eq!(fx.registry.get("App.A").await.unwrap().unwrap().content_id, "a1");
    }

    #[tokio::test]
    async fn test_recent_filter_requires_feed() {
        let fx = Fixture::new().await;
        let runner = fx.runner(StaticResolver::default(), StaticDownloader::default(), 1);
        let options = SyncOptions { since_hours: Some(24), ..SyncOptions::default() };
        assert!(runner.run(&options).await.is_err());
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let mut report = SyncReport::default();
        report.record(AppReport {
            app_id: "App.X".to_string(),
            decision: SyncDecision::Unknown,
            outcome: AppOutcome::SkippedUnknown { reason: "HTTP 503".to_string() },
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["skipped_unknown"], 1);
        assert_eq!(json["apps"][0]["outcome"], "skipped_unknown");
        assert_eq!(json["apps"][0]["decision"], "unknown");
        assert_eq!(json["apps"][0]["reason"], "HTTP 503");
    }
}
