// SPDX-License-Identifier: GPL-3.0-only
pub mod log;
pub mod service_bus;
pub mod traits;

pub use log::LogNotifier;
pub use service_bus::ServiceBusNotifier;
pub use traits::{ChangeNotification, ChangeStatus, Notifier};

use std::sync::Arc;
use tracing::info;
use crate::config::Config;
use crate::error::ConfigError;

/// Service Bus when a queue URL is configured, log-only otherwise
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    let queue_url = config
        .service_bus_queue_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());

    match queue_url {
        Some(queue_url) => {
            let sas_token = config.service_bus_sas_token.clone().ok_or(ConfigError::Missing {
                key: "service_bus_sas_token",
                needed_by: "the service bus notifier",
            })?;
            info!(queue = %queue_url, "Sending change notifications to Service Bus");
            Ok(Arc::new(ServiceBusNotifier::new(
                queue_url.to_string(),
                sas_token,
                config.http_timeout(),
            )?))
        }
        None => {
            info!("No queue configured, change notifications are logged only");
            Ok(Arc::new(LogNotifier))
        }
    }
}
