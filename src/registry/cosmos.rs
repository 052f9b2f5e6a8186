// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;
use crate::registry::{models::{RegistryUpdate, TrackedApplication}, traits::Registry};

const COSMOS_API_VERSION: &str = "2018-12-31";

/// Properties every tracked document carries, in the existing container layout
const LAYOUT_FIELDS: [&str; 4] = ["version", "Blobpath", "githubpath", "gitsha"];

type Document = Map<String, Value>;

/// Registry stored as documents in a Cosmos DB (SQL API) container.
///
/// Documents are looked up by their `appId` property; the document `id` is
/// opaque. Unknown properties survive every write because documents are
/// replaced whole after merging.
pub struct CosmosRegistry {
    client: Client,
    docs_url: Url,
    token: String,
    partition_key: String,
}

#[derive(Deserialize)]
struct QueryPage {
    #[serde(rename = "Documents", default)]
    documents: Vec<Document>,
}

fn string_field<'a>(doc: &'a Document, name: &str) -> Option<&'a str> {
    doc.get(name).and_then(Value::as_str)
}

fn app_from_document(doc: &Document) -> Option<TrackedApplication> {
    let id = string_field(doc, "appId").map(str::trim).filter(|id| !id.is_empty())?;
    let text = |name: &str| string_field(doc, name).unwrap_or_default().to_string();

    Some(TrackedApplication {
        id: id.to_string(),
        version: text("version"),
        content_id: text("gitsha"),
        blob_path: text("Blobpath"),
        source_url: text("githubpath"),
        updated_at: string_field(doc, "updatedAt")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}

/// Add missing layout properties as empty strings; true when anything changed
fn backfill_layout(doc: &mut Document) -> bool {
    let mut changed = false;
    for field in LAYOUT_FIELDS {
        if !doc.contains_key(field) {
            doc.insert(field.to_string(), Value::String(String::new()));
            changed = true;
        }
    }
    changed
}

fn apply_update(doc: &mut Document, update: RegistryUpdate) {
    let fields = [
        ("version", update.version),
        ("gitsha", update.content_id),
        ("Blobpath", update.blob_path),
        ("githubpath", update.source_url),
        ("updatedAt", update.updated_at.map(|t| t.to_rfc3339())),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            doc.insert(name.to_string(), Value::String(value));
        }
    }
}

impl CosmosRegistry {
    pub fn new(
        endpoint: &str,
        database: &str,
        container: &str,
        token: &str,
        partition_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::downloader::USER_AGENT)
            .build()?;

        let mut docs_url = Url::parse(endpoint)
            .with_context(|| format!("invalid cosmos endpoint '{}'", endpoint))?;
        docs_url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("cosmos endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(["dbs", database, "colls", container, "docs"]);

        Ok(Self {
            client,
            docs_url,
            token: token.to_string(),
            partition_key: partition_key.into(),
        })
    }

    fn document_url(&self, doc_id: &str) -> anyhow::Result<Url> {
        let mut url = self.docs_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("cosmos endpoint cannot be a base URL"))?
            .push(doc_id);
        Ok(url)
    }

    /// `x-ms-documentdb-partitionkey` value for a document
    fn partition_header(&self, doc: &Document) -> anyhow::Result<String> {
        let value = doc.get(&self.partition_key).with_context(|| {
            format!("document has no partition key property '{}'", self.partition_key)
        })?;
        Ok(serde_json::to_string(&[value])?)
    }

    fn build_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", &self.token)
            .header("Accept", "application/json")
            .header("x-ms-version", COSMOS_API_VERSION)
            .header("x-ms-date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }

    async fn fail(response: reqwest::Response, action: &str) -> anyhow::Error {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        error!(status = %status, body = %text, "Cosmos {} failed", action);
        anyhow::anyhow!("cosmos {} failed: {} - {}", action, status, text)
    }

    /// Run a cross-partition SQL query, following `x-ms-continuation`
    async fn query(&self, sql: &str, parameters: Value) -> anyhow::Result<Vec<Document>> {
        let body = serde_json::to_vec(&json!({ "query": sql, "parameters": parameters }))?;
        let mut documents = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .build_request(Method::POST, self.docs_url.clone())
                .header(CONTENT_TYPE, "application/query+json")
                .header("x-ms-documentdb-isquery", "True")
                .header("x-ms-documentdb-query-enablecrosspartition", "True")
                .body(body.clone());
            if let Some(token) = &continuation {
                request = request.header("x-ms-continuation", token);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(Self::fail(response, "query").await);
            }

            let next = response
                .headers()
                .get("x-ms-continuation")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let page: QueryPage = response.json().await?;
            debug!(count = page.documents.len(), "Fetched cosmos page");
            documents.extend(page.documents);

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn find(&self, app_id: &str) -> anyhow::Result<Option<Document>> {
        let documents = self
            .query(
                "SELECT * FROM c WHERE c.appId = @app_id",
                json!([{ "name": "@app_id", "value": app_id }]),
            )
            .await?;
        Ok(documents.into_iter().next())
    }

    async fn replace(&self, doc: &Document) -> anyhow::Result<()> {
        let doc_id = string_field(doc, "id").context("document has no id")?;
        let response = self
            .build_request(Method::PUT, self.document_url(doc_id)?)
            .header("x-ms-documentdb-partitionkey", self.partition_header(doc)?)
            .json(doc)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response, "replace").await);
        }
        Ok(())
    }

    async fn create(&self, doc: &Document) -> anyhow::Result<()> {
        let response = self
            .build_request(Method::POST, self.docs_url.clone())
            .header("x-ms-documentdb-partitionkey", self.partition_header(doc)?)
            .json(doc)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::fail(response, "create").await);
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for CosmosRegistry {
    /// Documents missing a layout property are rewritten with it set empty;
    /// a failed rewrite is logged and the application is still listed.
    async fn list(&self) -> anyhow::Result<Vec<TrackedApplication>> {
        let documents = self.query("SELECT * FROM c", json!([])).await?;

        let mut seen = HashSet::new();
        let mut apps = Vec::with_capacity(documents.len());
        for mut doc in documents {
            if string_field(&doc, "id").is_none() {
                warn!(app_id = ?string_field(&doc, "appId"), "Skipping document without id");
                continue;
            }
            let Some(app) = app_from_document(&doc) else {
                warn!(doc_id = ?string_field(&doc, "id"), "Skipping document without appId");
                continue;
            };

            if backfill_layout(&mut doc) {
                match self.replace(&doc).await {
                    Ok(()) => info!(app_id = %app.id, "Filled in missing document fields"),
                    Err(e) => warn!(app_id = %app.id, error = %e, "Could not fill in missing document fields"),
                }
            }

            if seen.insert(app.id.clone()) {
                apps.push(app);
            }
        }

        Ok(apps)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<TrackedApplication>> {
        Ok(self.find(id).await?.as_ref().and_then(app_from_document))
    }

    async fn upsert(&self, id: &str, update: RegistryUpdate) -> anyhow::Result<()> {
        let update = update.normalized();

        match self.find(id).await? {
            Some(mut doc) => {
                backfill_layout(&mut doc);
                apply_update(&mut doc, update);
                self.replace(&doc).await?;
            }
            None => {
                let mut doc = Document::new();
                doc.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
                doc.insert("appId".to_string(), Value::String(id.to_string()));
                doc.insert("packageIdentifier".to_string(), Value::String(id.to_string()));
                backfill_layout(&mut doc);
                apply_update(&mut doc, update);
                self.create(&doc).await?;
            }
        }

        info!(app_id = %id, "Upserted tracked application document");
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let Some(doc) = self.find(id).await? else {
            return Ok(false);
        };
        let doc_id = string_field(&doc, "id").context("document has no id")?;

        let response = self
            .build_request(Method::DELETE, self.document_url(doc_id)?)
            .header("x-ms-documentdb-partitionkey", self.partition_header(&doc)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(Self::fail(response, "delete").await);
        }

        info!(app_id = %id, "Removed tracked application document");
        Ok(true)
    }
}
