// SPDX-License-Identifier: GPL-3.0-only
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::Config;
use crate::downloader::{Downloader, HttpClient};
use crate::error::describe;
use crate::registry::{Registry, RegistryUpdate, TrackedApplication};
use crate::sync::{AppOutcome, ArtifactPipeline, SyncOptions, SyncReport, SyncRunner};
use crate::{notify, resolver, storage};

/// Wire every collaborator the configuration selects into a runner
pub fn build_runner(config: &Config, registry: Arc<dyn Registry>) -> anyhow::Result<SyncRunner> {
    let http = Arc::new(HttpClient::new(config.http_timeout())?);
    let upstream = resolver::from_config(config, Arc::clone(&http));
    let blobs = storage::from_config(config)?;
    let notifier = notify::from_config(config)?;
    let downloader: Arc<dyn Downloader> = http.clone();

    let pipeline = ArtifactPipeline::new(
        downloader,
        blobs,
        notifier,
        Arc::clone(&registry),
        config.blob_prefix.clone(),
    );

    Ok(SyncRunner::new(registry, upstream, pipeline, config.concurrency)
        .with_recent_changes(resolver::recent_changes(config, http)))
}

pub async fn sync_once(runner: &SyncRunner, options: &SyncOptions, json: bool) -> anyhow::Result<()> {
    let report = runner.run(options).await?;
    print!("{}", render_report(&report, json)?);
    Ok(())
}

/// Repeat passes every `secs` seconds until Ctrl+C. A pass in flight is
/// allowed to finish; a failed pass is logged and the loop carries on.
pub async fn sync_every(runner: &SyncRunner, options: &SyncOptions, secs: u64, json: bool) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs = secs, "Sync loop started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match runner.run(options).await {
                    Ok(report) => print!("{}", render_report(&report, json)?),
                    Err(e) => error!(error = %describe(&e), "Sync pass failed"),
                }
            }
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
                    Err(err) => error!(error = %err, "Unable to listen for shutdown signal"),
                }
                break;
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

pub fn render_report(report: &SyncReport, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(report)?));
    }

    let mut out = String::new();
    for app in &report.apps {
        let detail = match &app.outcome {
            AppOutcome::Stored { version, blob_path, status } => format!("{} {} -> {}", status, version, blob_path),
            AppOutcome::Unchanged => "unchanged".to_string(),
            AppOutcome::SkippedUnknown { reason } => format!("skipped: {}", reason),
            AppOutcome::WouldSync { version } => format!("would sync {}", version),
            AppOutcome::Failed { stage, error } => format!("FAILED ({}): {}", stage, error),
        };
        writeln!(out, "{:<40} {}", app.app_id, detail)?;
    }
    writeln!(
        out,
        "stored={} unchanged={} skipped_unknown={} would_sync={} failed={}",
        report.stored, report.unchanged, report.skipped_unknown, report.would_sync, report.failed
    )?;
    Ok(out)
}

pub fn render_apps(mut apps: Vec<TrackedApplication>) -> anyhow::Result<String> {
    apps.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = String::new();
    for app in apps {
        let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        let updated = app
            .updated_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            app.id,
            or_dash(&app.version),
            or_dash(&app.content_id),
            updated
        )?;
    }
    Ok(out)
}

pub async fn apps_list(registry: &dyn Registry) -> anyhow::Result<()> {
    let apps = registry.list().await?;
    print!("{}", render_apps(apps)?);
    Ok(())
}

pub async fn apps_add(registry: &dyn Registry, id: &str, source_url: Option<String>) -> anyhow::Result<()> {
    let id = id.trim();
    if id.is_empty() {
        anyhow::bail!("application id cannot be empty");
    }

    let mut update = RegistryUpdate::default();
    if let Some(url) = source_url {
        update = update.with_source_url(url);
    }
    registry.upsert(id, update).await?;

    println!("tracking {}", id);
    Ok(())
}

pub async fn apps_remove(registry: &dyn Registry, id: &str) -> anyhow::Result<()> {
    if registry.remove(id.trim()).await? {
        println!("removed {}", id);
    } else {
        println!("{} was not tracked", id);
    }
    Ok(())
}
