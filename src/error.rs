// SPDX-License-Identifier: GPL-3.0-only
use thiserror::Error;

/// Configuration problems detected before a run starts. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting `{key}` (needed by {needed_by})")]
    Missing {
        key: &'static str,
        needed_by: &'static str,
    },

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Why a single application's pipeline run failed.
///
/// Every variant leaves the registry untouched except `Registry`, which is by
/// definition the failure to write it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineFailure {
    #[error("download failed: {0}")]
    Download(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("registry update failed: {0}")]
    Registry(String),
}

impl PipelineFailure {
    /// Short stage name used in logs and run reports.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineFailure::Download(_) => "download",
            PipelineFailure::Upload(_) => "upload",
            PipelineFailure::Notify(_) => "notify",
            PipelineFailure::Registry(_) => "registry",
        }
    }
}

/// Render an `anyhow` chain on one line, outermost context first.
pub fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
