// SPDX-License-Identifier: GPL-3.0-only
pub mod cosmos;
pub mod file;
pub mod models;
pub mod sqlite;
pub mod table;
pub mod traits;

pub use cosmos::CosmosRegistry;
pub use file::FileRegistry;
pub use models::{RegistryUpdate, TrackedApplication};
pub use sqlite::SqliteRegistry;
pub use table::TableRegistry;
pub use traits::Registry;

use std::sync::Arc;
use tracing::info;
use crate::config::{Config, RegistryBackend};
use crate::error::ConfigError;

/// Open the registry backend selected by `config`
pub async fn from_config(config: &Config) -> anyhow::Result<Arc<dyn Registry>> {
    let registry: Arc<dyn Registry> = match config.registry_backend {
        RegistryBackend::File => {
            info!(
                apps_file = %config.apps_file.display(),
                state_file = %config.state_file.display(),
                "Using file registry"
            );
            Arc::new(FileRegistry::new(&config.apps_file, &config.state_file))
        }
        RegistryBackend::Sqlite => {
            info!(path = %config.registry_db_path.display(), "Using SQLite registry");
            Arc::new(SqliteRegistry::new(&config.registry_db_path).await?)
        }
        RegistryBackend::Table => {
            let needed_by = "the table registry backend";
            let endpoint = config
                .table_endpoint
                .as_deref()
                .ok_or(ConfigError::Missing { key: "table_endpoint", needed_by })?;
            let table = config
                .table_name
                .as_deref()
                .ok_or(ConfigError::Missing { key: "table_name", needed_by })?;
            let sas_token = config
                .table_sas_token
                .as_deref()
                .ok_or(ConfigError::Missing { key: "table_sas_token", needed_by })?;

            info!(endpoint = %endpoint, table = %table, "Using table registry");
            Arc::new(TableRegistry::new(
                endpoint,
                table,
                config.table_partition.clone(),
                sas_token,
                config.http_timeout(),
            )?)
        }
        RegistryBackend::Cosmos => {
            let needed_by = "the cosmos registry backend";
            let endpoint = config
                .cosmos_endpoint
                .as_deref()
                .ok_or(ConfigError::Missing { key: "cosmos_endpoint", needed_by })?;
            let database = config
                .cosmos_database
                .as_deref()
                .ok_or(ConfigError::Missing { key: "cosmos_database", needed_by })?;
            let container = config
                .cosmos_container
                .as_deref()
                .ok_or(ConfigError::Missing { key: "cosmos_container", needed_by })?;
            let token = config
                .cosmos_token
                .as_deref()
                .ok_or(ConfigError::Missing { key: "cosmos_token", needed_by })?;

            info!(endpoint = %endpoint, database = %database, container = %container, "Using cosmos registry");
            Arc::new(CosmosRegistry::new(
                endpoint,
                database,
                container,
                token,
                config.cosmos_partition_key.clone(),
                config.http_timeout(),
            )?)
        }
    };

    Ok(registry)
}
