// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;
use crate::registry::{models::{RegistryUpdate, TrackedApplication}, traits::Registry};

const STORAGE_API_VERSION: &str = "2019-02-02";
const ACCEPT_NO_METADATA: &str = "application/json;odata=nometadata";

/// Registry stored as entities in an Azure Table.
///
/// PartitionKey is fixed per registry, RowKey is the application id. Entity
/// property names follow the existing table layout: `AppID`, `version`,
/// `Blobpath`, `githubpath` and `gitsha`.
pub struct TableRegistry {
    client: Client,
    endpoint: Url,
    table: String,
    partition: String,
    sas_token: String,
}

#[derive(Debug, Deserialize)]
struct TableEntity {
    #[serde(rename = "RowKey")]
    row_key: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(rename = "gitsha", default)]
    content_id: Option<String>,
    #[serde(rename = "Blobpath", default)]
    blob_path: Option<String>,
    #[serde(rename = "githubpath", default)]
    source_url: Option<String>,
    #[serde(rename = "Timestamp", default)]
    timestamp: Option<String>,
}

impl From<TableEntity> for TrackedApplication {
    fn from(entity: TableEntity) -> Self {
        Self {
            id: entity.row_key,
            version: entity.version.unwrap_or_default(),
            content_id: entity.content_id.unwrap_or_default(),
            blob_path: entity.blob_path.unwrap_or_default(),
            source_url: entity.source_url.unwrap_or_default(),
            updated_at: entity
                .timestamp
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    value: Vec<TableEntity>,
}

/// Keys inside an OData key literal double their single quotes
fn quote_key(key: &str) -> String {
    key.replace('\'', "''")
}

impl TableRegistry {
    pub fn new(
        endpoint: &str,
        table: impl Into<String>,
        partition: impl Into<String>,
        sas_token: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::downloader::USER_AGENT)
            .build()?;
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid table endpoint '{}'", endpoint))?;

        Ok(Self {
            client,
            endpoint,
            table: table.into(),
            partition: partition.into(),
            sas_token: sas_token.trim_start_matches('?').to_string(),
        })
    }

    fn resource_url(&self, resource: &str) -> anyhow::Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("table endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(resource);
        if !self.sas_token.is_empty() {
            url.set_query(Some(&self.sas_token));
        }
        Ok(url)
    }

    fn entity_url(&self, id: &str) -> anyhow::Result<Url> {
        self.resource_url(&format!(
            "{}(PartitionKey='{}',RowKey='{}')",
            self.table,
            quote_key(&self.partition),
            quote_key(id)
        ))
    }

    fn build_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", ACCEPT_NO_METADATA)
            .header("x-ms-version", STORAGE_API_VERSION)
    }

    async fn fail(response: reqwest::Response, action: &str) -> anyhow::Error {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        error!(status = %status, body = %text, "Table {} failed", action);
        anyhow::anyhow!("table {} failed: {} - {}", action, status, text)
    }
}

#[async_trait]
impl Registry for TableRegistry {
    async fn list(&self) -> anyhow::Result<Vec<TrackedApplication>> {
        let mut apps = Vec::new();
        // (NextPartitionKey, NextRowKey); either may be absent on its own
        let mut continuation: Option<(Option<String>, Option<String>)> = None;

        loop {
            let mut url = self.resource_url(&format!("{}()", self.table))?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair(
                    "$filter",
                    &format!("PartitionKey eq '{}'", quote_key(&self.partition)),
                );
                if let Some((next_partition, next_row)) = &continuation {
                    if let Some(partition) = next_partition {
                        query.append_pair("NextPartitionKey", partition);
                    }
                    if let Some(row) = next_row {
                        query.append_pair("NextRowKey", row);
                    }
                }
            }

            let response = self.build_request(Method::GET, url).send().await?;
            if !response.status().is_success() {
                return Err(Self::fail(response, "query").await);
            }

            let next_partition = header_value(&response, "x-ms-continuation-NextPartitionKey");
            let next_row = header_value(&response, "x-ms-continuation-NextRowKey");

            let page: QueryResponse = response.json().await?;
            debug!(count = page.value.len(), "Fetched table page");
            apps.extend(page.value.into_iter().map(TrackedApplication::from));

            continuation = match (next_partition, next_row) {
                (None, None) => break,
                next => Some(next),
            };
        }

        Ok(apps)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<TrackedApplication>> {
        let response = self
            .build_request(Method::GET, self.entity_url(id)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response, "get").await);
        }

        let entity: TableEntity = response.json().await?;
        Ok(Some(entity.into()))
    }

    async fn upsert(&self, id: &str, update: RegistryUpdate) -> anyhow::Result<()> {
        let update = update.normalized();

        let mut properties = Map::new();
        properties.insert("AppID".to_string(), Value::String(id.to_string()));
        let fields = [
            ("version", update.version),
            ("gitsha", update.content_id),
            ("Blobpath", update.blob_path),
            ("githubpath", update.source_url),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                properties.insert(name.to_string(), Value::String(value));
            }
        }

        // MERGE without If-Match is Insert-Or-Merge
        let response = self
            .build_request(Method::from_bytes(b"MERGE")?, self.entity_url(id)?)
            .json(&Value::Object(properties))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response, "upsert").await);
        }

        info!(app_id = %id, "Upserted tracked application entity");
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let response = self
            .build_request(Method::DELETE, self.entity_url(id)?)
            .header("If-Match", "*")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response, "delete").await);
        }

        info!(app_id = %id, "Removed tracked application entity");
        Ok(true)
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
