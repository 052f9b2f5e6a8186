// SPDX-License-Identifier: GPL-3.0-only
pub mod azure;
pub mod local;
pub mod traits;

pub use azure::AzureBlobStore;
pub use local::LocalBlobStore;
pub use traits::BlobStore;

use std::sync::Arc;
use tracing::info;
use crate::config::{BlobBackend, Config};
use crate::error::ConfigError;

/// Build the blob store selected by `config`
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.blob_backend {
        BlobBackend::Local => {
            info!(root = %config.blob_local_dir.display(), "Using local blob store");
            Arc::new(LocalBlobStore::new(&config.blob_local_dir))
        }
        BlobBackend::Azure => {
            let needed_by = "the azure blob store";
            let container = config
                .blob_container_url
                .as_deref()
                .ok_or(ConfigError::Missing { key: "blob_container_url", needed_by })?;
            let sas_token = config
                .blob_sas_token
                .as_deref()
                .ok_or(ConfigError::Missing { key: "blob_sas_token", needed_by })?;

            info!(container = %container, "Using azure blob store");
            Arc::new(AzureBlobStore::new(container, sas_token, config.http_timeout())?)
        }
    };

    Ok(store)
}
