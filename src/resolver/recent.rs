// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};
use crate::downloader::HttpClient;
use crate::resolver::winget::github_request;

const SKIPPED_PREFIXES: &[&str] = &["Automatic deletion of ", "Remove version ", "Automatic update of "];
const CHANGE_PREFIXES: &[&str] = &["New version", "Update"];

static TITLE_APP_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":\s([\w.-]+)\sversion").expect("title pattern compiles")
});

static NEXT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("link pattern compiles")
});

#[derive(Debug, Deserialize)]
struct PullRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
}

/// Application id a winget pull request title announces, if any
pub fn app_id_from_title(title: &str) -> Option<String> {
    let title = title.trim();
    if SKIPPED_PREFIXES.iter().any(|p| title.starts_with(p)) {
        return None;
    }

    let rest = CHANGE_PREFIXES
        .iter()
        .filter_map(|p| title.strip_prefix(p))
        .find(|rest| rest.starts_with(|c: char| c == ':' || c.is_whitespace()))?;

    if let Some(captures) = TITLE_APP_ID.captures(title) {
        return Some(captures[1].to_string());
    }

    rest.trim_start_matches(':')
        .split_whitespace()
        .next()
        .map(str::to_string)
}

fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',')
        .find_map(|part| NEXT_LINK.captures(part))
        .map(|c| c[1].to_string())
}

/// Applications named by winget pull requests merged recently
pub struct RecentChanges {
    http: Arc<HttpClient>,
    pulls_url: String,
    github_token: Option<String>,
}

impl RecentChanges {
    pub fn new(http: Arc<HttpClient>, pulls_url: impl Into<String>, github_token: Option<String>) -> Self {
        Self {
            http,
            pulls_url: pulls_url.into(),
            github_token: github_token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Ids mentioned by pull requests merged at or after `since`, in feed
    /// order without duplicates. Any failure aborts the whole feed.
    pub async fn changed_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut next = Some(format!(
            "{}?state=closed&per_page=100",
            self.pulls_url.trim_end_matches('/')
        ));
        let token = self.github_token.as_deref();
        let mut pages = 0;

        while let Some(url) = next.take() {
            let response = self
                .http
                .send_with_retry(|client| github_request(client, &url, token))
                .await?;
            response.error_for_status_ref()?;

            let following = next_page(response.headers());
            let pulls: Vec<PullRequest> = response.json().await?;
            pages += 1;

            let mut in_window = 0;
            for pull in &pulls {
                let Some(merged_at) = pull.merged_at else { continue };
                if merged_at < since {
                    continue;
                }
                in_window += 1;

                if let Some(id) = app_id_from_title(&pull.title) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }

            debug!(page = pages, merged_in_window = in_window, "Scanned pull request page");
            if in_window > 0 {
                next = following;
            }
        }

        info!(count = ids.len(), pages, since = %since, "Collected recently changed applications");
        Ok(ids)
    }
}
