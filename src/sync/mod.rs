// SPDX-License-Identifier: GPL-3.0-only
pub mod decision;
pub mod pipeline;
pub mod runner;

pub use decision::{decide, SyncDecision};
pub use pipeline::{ArtifactPipeline, PipelineResult};
pub use runner::{AppOutcome, SyncOptions, SyncReport, SyncRunner};
