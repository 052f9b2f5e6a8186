// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use crate::downloader::HttpClient;
use crate::error::describe;
use crate::resolver::models::{ContentKind, Resolution, UpstreamVersionInfo};
use crate::resolver::traits::UpstreamResolver;
use crate::utils::sha256_hex;

#[derive(Debug, Default, Deserialize)]
struct Versions {
    #[serde(default)]
    stable: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SourceChecksum {
    #[serde(default)]
    sha256: Option<String>,
}

/// The fields shared by cask and formula documents that matter here
#[derive(Debug, Deserialize)]
struct PackageInfo {
    /// Casks
    #[serde(default)]
    version: Option<String>,
    /// Formulae
    #[serde(default)]
    versions: Option<Versions>,
    #[serde(default)]
    ruby_source_checksum: Option<SourceChecksum>,
}

impl PackageInfo {
    fn version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or_else(|| self.versions.as_ref().and_then(|v| v.stable.as_deref()))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn published_checksum(&self) -> Option<&str> {
        self.ruby_source_checksum
            .as_ref()
            .and_then(|c| c.sha256.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Resolves versions from the Homebrew formulae API, casks first
pub struct HomebrewResolver {
    http: Arc<HttpClient>,
    api_url: String,
}

impl HomebrewResolver {
    pub fn new(http: Arc<HttpClient>, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
        }
    }

    /// Fetch the first document that exists; `Ok(None)` when neither does
    async fn fetch_document(&self, app_id: &str) -> Result<Option<(String, Vec<u8>)>, String> {
        for kind in ["cask", "formula"] {
            let url = format!("{}/{}/{}.json", self.api_url.trim_end_matches('/'), kind, app_id);
            let response = self
                .http
                .send_with_retry(|client| client.get(&url))
                .await
                .map_err(|e| format!("fetching {} failed: {}", url, describe(&e)))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                debug!(app_id = %app_id, kind, "No Homebrew document");
                continue;
            }
            if !status.is_success() {
                return Err(format!("{} returned {}", url, status));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| format!("reading {} failed: {}", url, e))?;
            return Ok(Some((url, body.to_vec())));
        }

        Ok(None)
    }
}

#[async_trait]
impl UpstreamResolver for HomebrewResolver {
    async fn resolve_latest(&self, app_id: &str) -> Resolution {
        if app_id.trim().is_empty() {
            return Resolution::unknown("empty application id");
        }

        let (url, body) = match self.fetch_document(app_id).await {
            Ok(Some(document)) => document,
            Ok(None) => return Resolution::unknown(format!("{} is neither a cask nor a formula", app_id)),
            Err(reason) => return Resolution::unknown(reason),
        };

        let package: PackageInfo = match serde_json::from_slice(&body) {
            Ok(package) => package,
            Err(e) => return Resolution::unknown(format!("{} is not a package document: {}", url, e)),
        };

        let Some(version) = package.version() else {
            return Resolution::unknown(format!("{} carries no version", url));
        };

        let (content_id, content_kind) = match package.published_checksum() {
            Some(checksum) => (checksum.to_string(), ContentKind::Revision),
            None => (sha256_hex(&body), ContentKind::Sha256),
        };

        Resolution::Resolved(UpstreamVersionInfo {
            app_id: app_id.to_string(),
            version: version.to_string(),
            content_id,
            content_kind,
            download_url: url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::time::Duration;

    fn resolver(server: &Server) -> HomebrewResolver {
        let http = HttpClient::new(Duration::from_secs(5))
            .unwrap()
            .with_retry_policy(1, Duration::ZERO);
        HomebrewResolver::new(Arc::new(http), format!("{}/api", server.url()))
    }

    #[tokio::test]
    async fn test_resolve_cask_with_published_checksum() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/cask/firefox.json")
            .with_status(200)
            .with_body(r#"{"token":"firefox","version":"125.0.3","ruby_source_checksum":{"sha256":"deadbeef"}}"#)
            .create_async()
            .await;

        let resolution = resolver(&server).resolve_latest("firefox").await;
        let info = resolution.info().unwrap();
        assert_eq!(info.version, "125.0.3");
        assert_eq!(info.content_id, "deadbeef");
        assert_eq!(info.content_kind, ContentKind::Revision);
        assert_eq!(info.download_url, format!("{}/api/cask/firefox.json", server.url()));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_formula() {
        let mut server = Server::new_async().await;
        let cask = server
            .mock("GET", "/api/cask/wget.json")
            .with_status(404)
            .create_async()
            .await;
        let body = r#"{"name":"wget","versions":{"stable":"1.24.5","head":"HEAD"}}"#;
        let formula = server
            .mock("GET", "/api/formula/wget.json")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let resolution = resolver(&server).resolve_latest("wget").await;

        cask.assert_async().await;
        formula.assert_async().await;
        let info = resolution.info().unwrap();
        assert_eq!(info.version, "1.24.5");
        assert_eq!(info.content_kind, ContentKind::Sha256);
        assert_eq!(info.content_id, sha256_hex(body.as_bytes()));
    }

    #[tokio::test]
    async fn test_resolve_unknown_package() {
        let mut server = Server::new_async().await;
        let _cask = server.mock("GET", "/api/cask/nope.json").with_status(404).create_async().await;
        let _formula = server.mock("GET", "/api/formula/nope.json").with_status(404).create_async().await;

        let resolution = resolver(&server).resolve_latest("nope").await;
        assert!(matches!(resolution, Resolution::Unknown { .. }));
    }

    #[tokio::test]
    async fn test_resolve_server_error_is_unknown() {
        let mut server = Server::new_async().await;
        let _m = server.mock("GET", "/api/cask/firefox.json").with_status(502).create_async().await;

        let resolution = resolver(&server).resolve_latest("firefox").await;
        assert!(matches!(resolution, Resolution::Unknown { .. }));
    }

    #[tokio::test]
    async fn test_resolve_document_without_version() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/cask/odd.json")
            .with_status(200)
            .with_body(r#"{"token":"odd","version":"  "}"#)
            .create_async()
            .await;

        let resolution = resolver(&server).resolve_latest("odd").await;
        assert!(matches!(resolution, Resolution::Unknown { .. }));
    }
}
