// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;
use crate::notify::traits::{ChangeNotification, Notifier};

/// Sends change notifications to a Service Bus queue over its REST API
#[derive(Debug, Clone)]
pub struct ServiceBusNotifier {
    client: Client,
    queue_url: String,
    sas_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties {
    message_id: String,
}

impl ServiceBusNotifier {
    pub fn new(queue_url: String, sas_token: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::downloader::USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            queue_url,
            sas_token,
        })
    }

    fn build_post_request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.queue_url.trim_end_matches('/'), path);
        self.client
            .post(&url)
            .header("Authorization", &self.sas_token)
    }
}

#[async_trait]
impl Notifier for ServiceBusNotifier {
    async fn notify(&self, notification: &ChangeNotification) -> anyhow::Result<()> {
        let broker = BrokerProperties {
            message_id: Uuid::new_v4().to_string(),
        };

        let response = self
            .build_post_request("messages")
            .header("BrokerProperties", serde_json::to_string(&broker)?)
            // custom string properties travel quoted
            .header("status", format!("\"{}\"", notification.status))
            .json(notification)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Service Bus send failed");
            return Err(anyhow::anyhow!("Service Bus send failed: {} - {}", status, text));
        }

        info!(
            app_id = %notification.application_name,
            version = %notification.application_version,
            status = %notification.status,
            message_id = %broker.message_id,
            "Change notification sent"
        );
        Ok(())
    }
}
