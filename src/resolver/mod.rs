// SPDX-License-Identifier: GPL-3.0-only
pub mod homebrew;
pub mod models;
pub mod recent;
pub mod traits;
pub mod version;
pub mod winget;

pub use homebrew::HomebrewResolver;
pub use models::{ContentKind, Resolution, UpstreamVersionInfo};
pub use recent::RecentChanges;
pub use traits::UpstreamResolver;
pub use winget::WingetResolver;

use std::sync::Arc;
use crate::config::{Config, Upstream};
use crate::downloader::HttpClient;

/// Build the resolver for the configured upstream
pub fn from_config(config: &Config, http: Arc<HttpClient>) -> Arc<dyn UpstreamResolver> {
    match config.upstream {
        Upstream::Winget => Arc::new(WingetResolver::new(
            http,
            config.winget_api_url.clone(),
            config.winget_raw_url.clone(),
            config.github_token.clone(),
            config.change_key,
        )),
        Upstream::Homebrew => Arc::new(HomebrewResolver::new(http, config.homebrew_api_url.clone())),
    }
}

/// The recent-change feed exists for the winget upstream only
pub fn recent_changes(config: &Config, http: Arc<HttpClient>) -> Option<RecentChanges> {
    match config.upstream {
        Upstream::Winget => Some(RecentChanges::new(
            http,
            config.winget_pulls_url.clone(),
            config.github_token.clone(),
        )),
        Upstream::Homebrew => None,
    }
}
