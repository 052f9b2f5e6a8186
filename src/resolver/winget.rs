// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use crate::config::ChangeKey;
use crate::downloader::{Downloader, HttpClient};
use crate::error::describe;
use crate::resolver::models::{ContentKind, Resolution, UpstreamVersionInfo};
use crate::resolver::traits::UpstreamResolver;
use crate::resolver::version::latest_by;
use crate::utils::sha256_hex;

pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// One entry of a GitHub contents API directory listing
#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sha: String,
}

/// Resolves versions from the winget-pkgs manifest tree
pub struct WingetResolver {
    http: Arc<HttpClient>,
    api_url: String,
    raw_url: String,
    github_token: Option<String>,
    change_key: ChangeKey,
}

/// `Google.Chrome` lives under `g/Google/Chrome`
pub fn manifest_path(app_id: &str) -> Option<String> {
    let first = app_id.chars().next()?.to_lowercase();
    Some(format!("{}/{}", first, app_id.replace('.', "/")))
}

/// GET with the headers the GitHub API expects
pub fn github_request(client: &Client, url: &str, token: Option<&str>) -> RequestBuilder {
    let mut request = client.get(url).header("Accept", GITHUB_ACCEPT);
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {}", token));
    }
    request
}

impl WingetResolver {
    pub fn new(
        http: Arc<HttpClient>,
        api_url: impl Into<String>,
        raw_url: impl Into<String>,
        github_token: Option<String>,
        change_key: ChangeKey,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            raw_url: raw_url.into(),
            github_token: github_token.filter(|t| !t.trim().is_empty()),
            change_key,
        }
    }

    async fn list_versions(&self, path: &str) -> Result<Vec<ContentEntry>, String> {
        let url = format!("{}/{}", self.api_url.trim_end_matches('/'), path);
        let token = self.github_token.as_deref();

        let response = self
            .http
            .send_with_retry(|client| github_request(client, &url, token))
            .await
            .map_err(|e| format!("listing {} failed: {}", url, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("listing {} returned {}", url, status));
        }

        response
            .json::<Vec<ContentEntry>>()
            .await
            .map_err(|e| format!("listing {} is not a directory listing: {}", url, e))
    }
}

#[async_trait]
impl UpstreamResolver for WingetResolver {
    async fn resolve_latest(&self, app_id: &str) -> Resolution {
        let Some(path) = manifest_path(app_id) else {
            return Resolution::unknown("empty application id");
        };

        let entries = match self.list_versions(&path).await {
            Ok(entries) => entries,
            Err(reason) => return Resolution::unknown(reason),
        };

        let dirs: Vec<&ContentEntry> = entries.iter().filter(|e| e.kind == "dir").collect();
        let Some(latest) = latest_by(&dirs, |e| e.name.as_str()) else {
            return Resolution::unknown(format!("no version-like entries under {}", path));
        };

        let download_url = format!(
            "{}/{}/{}/{}.installer.yaml",
            self.raw_url.trim_end_matches('/'),
            path,
            latest.name,
            app_id
        );
        debug!(app_id = %app_id, version = %latest.name, url = %download_url, "Resolved winget version");

        let (content_id, content_kind) = match self.change_key {
            ChangeKey::Revision => {
                if latest.sha.is_empty() {
                    return Resolution::unknown(format!("listing entry {} carries no sha", latest.name));
                }
                (latest.sha.clone(), ContentKind::Revision)
            }
            ChangeKey::ContentHash => match self.http.fetch_bytes(&download_url).await {
                Ok(bytes) => (sha256_hex(&bytes), ContentKind::Sha256),
                Err(e) => {
                    return Resolution::unknown(format!(
                        "manifest {} could not be hashed: {}",
                        download_url,
                        describe(&e)
                    ));
                }
            },
        };

        Resolution::Resolved(UpstreamVersionInfo {
            app_id: app_id.to_string(),
            version: latest.name.clone(),
            content_id,
            content_kind,
            download_url,
        })
    }
}
