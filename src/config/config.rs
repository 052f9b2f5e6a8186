// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryBackend {
    /// `apps.txt` identifier list plus a JSON state document
    File,
    Sqlite,
    /// Azure Table Storage
    Table,
    /// Azure Cosmos DB (SQL API) container
    Cosmos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    Winget,
    Homebrew,
}

/// What the winget resolver uses as the content identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKey {
    /// Git tree SHA of the version directory
    Revision,
    /// SHA-256 of the installer manifest bytes
    ContentHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    Local,
    Azure,
}

macro_rules! impl_from_str {
    ($ty:ty, $key:literal, { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    other => Err(ConfigError::Invalid {
                        key: $key,
                        reason: format!("unknown value '{}'", other),
                    }),
                }
            }
        }
    };
}

impl_from_str!(LogFormat, "log_format", { "text" => LogFormat::Text, "json" => LogFormat::Json });
impl_from_str!(RegistryBackend, "registry_backend", {
    "file" => RegistryBackend::File,
    "sqlite" => RegistryBackend::Sqlite,
    "table" => RegistryBackend::Table,
    "cosmos" => RegistryBackend::Cosmos,
});
impl_from_str!(Upstream, "upstream", { "winget" => Upstream::Winget, "homebrew" => Upstream::Homebrew });
impl_from_str!(ChangeKey, "change_key", {
    "revision" => ChangeKey::Revision,
    "content_hash" => ChangeKey::ContentHash,
});
impl_from_str!(BlobBackend, "blob_backend", { "local" => BlobBackend::Local, "azure" => BlobBackend::Azure });

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log line format
    pub log_format: LogFormat,

    /// Which store backs the tracked-application registry
    pub registry_backend: RegistryBackend,

    /// One application identifier per line (file backend)
    pub apps_file: PathBuf,

    /// JSON sync state document (file backend)
    pub state_file: PathBuf,

    /// SQLite database path (sqlite backend)
    pub registry_db_path: PathBuf,

    /// Table service endpoint, e.g. `https://account.table.core.windows.net`
    pub table_endpoint: Option<String>,

    pub table_name: Option<String>,

    /// PartitionKey shared by every tracked application entity
    pub table_partition: String,

    /// SAS token (query string form) for the table service
    pub table_sas_token: Option<String>,

    /// Cosmos DB account endpoint, e.g. `https://account.documents.azure.com`
    pub cosmos_endpoint: Option<String>,

    pub cosmos_database: Option<String>,

    pub cosmos_container: Option<String>,

    /// Pre-issued resource token, sent verbatim as `Authorization`
    pub cosmos_token: Option<String>,

    /// Document property holding the container's partition key value
    pub cosmos_partition_key: String,

    /// Which package repository to resolve versions against
    pub upstream: Upstream,

    /// GitHub contents API root of the winget manifest tree
    pub winget_api_url: String,

    /// Raw file root of the winget manifest tree
    pub winget_raw_url: String,

    /// GitHub pulls API of the winget repository (recent-change feed)
    pub winget_pulls_url: String,

    /// Homebrew formulae API root
    pub homebrew_api_url: String,

    /// Optional token sent to the GitHub API to lift anonymous rate limits
    pub github_token: Option<String>,

    pub change_key: ChangeKey,

    /// Where mirrored manifests are written
    pub blob_backend: BlobBackend,

    /// Root directory for the local blob backend
    pub blob_local_dir: PathBuf,

    /// Container URL, e.g. `https://account.blob.core.windows.net/manifests`
    pub blob_container_url: Option<String>,

    pub blob_sas_token: Option<String>,

    /// Path prefix prepended to every blob path (may be empty)
    pub blob_prefix: String,

    /// Queue URL, e.g. `https://namespace.servicebus.windows.net/patchjob`
    pub service_bus_queue_url: Option<String>,

    /// Pre-issued `SharedAccessSignature ...` token for the queue
    pub service_bus_sas_token: Option<String>,

    /// Applications processed concurrently (1 = strictly sequential)
    pub concurrency: usize,

    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the TOML file named by `MIRROR_CONFIG`
    /// (default `mirror.toml`) with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("MIRROR_CONFIG")
            .unwrap_or_else(|_| "mirror.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load configuration from an explicit TOML path; a missing file means defaults
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `MIRROR_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MIRROR_LOG_LEVEL") {
            self.log_level = val;
        }
        if let Some(val) = lookup("MIRROR_LOG_FORMAT") {
            self.log_format = val.parse()?;
        }
        if let Some(val) = lookup("MIRROR_REGISTRY_BACKEND") {
            self.registry_backend = val.parse()?;
        }
        if let Some(val) = lookup("MIRROR_APPS_FILE") {
            self.apps_file = PathBuf::from(val);
        }
        if let Some(val) = lookup("MIRROR_STATE_FILE") {
            self.state_file = PathBuf::from(val);
        }
        if let Some(val) = lookup("MIRROR_REGISTRY_DB_PATH") {
            self.registry_db_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("MIRROR_TABLE_ENDPOINT") {
            self.table_endpoint = Some(val);
        }
        if let Some(val) = lookup("MIRROR_TABLE_NAME") {
            self.table_name = Some(val);
        }
        if let Some(val) = lookup("MIRROR_TABLE_PARTITION") {
            self.table_partition = val;
        }
        if let Some(val) = lookup("MIRROR_TABLE_SAS_TOKEN") {
            self.table_sas_token = Some(val);
        }
        if let Some(val) = lookup("MIRROR_COSMOS_ENDPOINT") {
            self.cosmos_endpoint = Some(val);
        }
        if let Some(val) = lookup("MIRROR_COSMOS_DATABASE") {
            self.cosmos_database = Some(val);
        }
        if let Some(val) = lookup("MIRROR_COSMOS_CONTAINER") {
            self.cosmos_container = Some(val);
        }
        if let Some(val) = lookup("MIRROR_COSMOS_TOKEN") {
            self.cosmos_token = Some(val);
        }
        if let Some(val) = lookup("MIRROR_COSMOS_PARTITION_KEY") {
            self.cosmos_partition_key = val;
        }
        if let Some(val) = lookup("MIRROR_UPSTREAM") {
            self.upstream = val.parse()?;
        }
        if let Some(val) = lookup("MIRROR_WINGET_API_URL") {
            self.winget_api_url = val;
        }
        if let Some(val) = lookup("MIRROR_WINGET_RAW_URL") {
            self.winget_raw_url = val;
        }
        if let Some(val) = lookup("MIRROR_WINGET_PULLS_URL") {
            self.winget_pulls_url = val;
        }
        if let Some(val) = lookup("MIRROR_HOMEBREW_API_URL") {
            self.homebrew_api_url = val;
        }
        if let Some(val) = lookup("MIRROR_GITHUB_TOKEN") {
            self.github_token = Some(val);
        }
        if let Some(val) = lookup("MIRROR_CHANGE_KEY") {
            self.change_key = val.parse()?;
        }
        if let Some(val) = lookup("MIRROR_BLOB_BACKEND") {
            self.blob_backend = val.parse()?;
        }
        if let Some(val) = lookup("MIRROR_BLOB_LOCAL_DIR") {
            self.blob_local_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("MIRROR_BLOB_CONTAINER_URL") {
            self.blob_container_url = Some(val);
        }
        if let Some(val) = lookup("MIRROR_BLOB_SAS_TOKEN") {
            self.blob_sas_token = Some(val);
        }
        if let Some(val) = lookup("MIRROR_BLOB_PREFIX") {
            self.blob_prefix = val;
        }
        if let Some(val) = lookup("MIRROR_SERVICE_BUS_QUEUE_URL") {
            self.service_bus_queue_url = Some(val);
        }
        if let Some(val) = lookup("MIRROR_SERVICE_BUS_SAS_TOKEN") {
            self.service_bus_sas_token = Some(val);
        }
        if let Some(val) = lookup("MIRROR_CONCURRENCY") {
            self.concurrency = val.parse()?;
        }
        if let Some(val) = lookup("MIRROR_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = val.parse()?;
        }

        Ok(())
    }

    /// Check that every destination the selected backends need is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "http_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.registry_backend == RegistryBackend::Table {
            let endpoint = require(&self.table_endpoint, "table_endpoint", "table registry")?;
            require_url(endpoint, "table_endpoint")?;
            require(&self.table_name, "table_name", "table registry")?;
            require(&self.table_sas_token, "table_sas_token", "table registry")?;
        }

        if self.registry_backend == RegistryBackend::Cosmos {
            let endpoint = require(&self.cosmos_endpoint, "cosmos_endpoint", "cosmos registry")?;
            require_url(endpoint, "cosmos_endpoint")?;
            require(&self.cosmos_database, "cosmos_database", "cosmos registry")?;
            require(&self.cosmos_container, "cosmos_container", "cosmos registry")?;
            require(&self.cosmos_token, "cosmos_token", "cosmos registry")?;
            if self.cosmos_partition_key.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "cosmos_partition_key",
                    reason: "must name a document property".to_string(),
                });
            }
        }

        if self.blob_backend == BlobBackend::Azure {
            let container = require(&self.blob_container_url, "blob_container_url", "azure blob store")?;
            require_url(container, "blob_container_url")?;
            require(&self.blob_sas_token, "blob_sas_token", "azure blob store")?;
        }

        if let Some(queue_url) = non_empty(&self.service_bus_queue_url) {
            require_url(queue_url, "service_bus_queue_url")?;
            require(&self.service_bus_sas_token, "service_bus_sas_token", "service bus notifier")?;
        }

        match self.upstream {
            Upstream::Winget => {
                require_url(&self.winget_api_url, "winget_api_url")?;
                require_url(&self.winget_raw_url, "winget_raw_url")?;
            }
            Upstream::Homebrew => {
                require_url(&self.homebrew_api_url, "homebrew_api_url")?;
            }
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn require<'a>(
    value: &'a Option<String>,
    key: &'static str,
    needed_by: &'static str,
) -> Result<&'a str, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing { key, needed_by })
}

fn require_url(value: &str, key: &'static str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a valid URL: {}", value, e),
        })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: String::from("info"),
            log_format: LogFormat::Text,
            registry_backend: RegistryBackend::File,
            apps_file: PathBuf::from("apps.txt"),
            state_file: PathBuf::from("apps-state.json"),
            registry_db_path: PathBuf::from("registry.db"),
            table_endpoint: None,
            table_name: None,
            table_partition: String::from("Apps"),
            table_sas_token: None,
            cosmos_endpoint: None,
            cosmos_database: None,
            cosmos_container: None,
            cosmos_token: None,
            cosmos_partition_key: String::from("appId"),
            upstream: Upstream::Winget,
            winget_api_url: String::from(
                "https://api.github.com/repos/microsoft/winget-pkgs/contents/manifests",
            ),
            winget_raw_url: String::from(
                "https://raw.githubusercontent.com/microsoft/winget-pkgs/master/manifests",
            ),
            winget_pulls_url: String::from("https://api.github.com/repos/microsoft/winget-pkgs/pulls"),
            homebrew_api_url: String::from("https://formulae.brew.sh/api"),
            github_token: None,
            change_key: ChangeKey::Revision,
            blob_backend: BlobBackend::Local,
            blob_local_dir: PathBuf::from("manifests"),
            blob_container_url: None,
            blob_sas_token: None,
            blob_prefix: String::new(),
            service_bus_queue_url: None,
            service_bus_sas_token: None,
            concurrency: 1,
            http_timeout_secs: 30,
        }
    }
}
