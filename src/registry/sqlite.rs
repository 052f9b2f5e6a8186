// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Connection, Row};
use std::path::Path;
use std::str::FromStr;
use crate::registry::{models::{RegistryUpdate, TrackedApplication}, traits::Registry};
use tracing::info;

/// Columns every tracked_apps table must carry, with their definitions
const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    ("version", "TEXT NOT NULL DEFAULT ''"),
    ("content_id", "TEXT NOT NULL DEFAULT ''"),
    ("blob_path", "TEXT NOT NULL DEFAULT ''"),
    ("source_url", "TEXT NOT NULL DEFAULT ''"),
    ("updated_at", "TEXT"),
];

pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub async fn new(db_path: &Path) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        // Migrate on a throwaway connection so no pooled connection holds
        // statements prepared against the old column layout
        let mut conn = SqliteConnection::connect_with(&options).await?;
        init_schema(&mut conn).await?;
        conn.close().await?;

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// A private in-memory database on a single pinned connection
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        {
            let mut conn = pool.acquire().await?;
            init_schema(&mut conn).await?;
        }

        Ok(Self { pool })
    }

    fn app_from_row(row: &SqliteRow) -> anyhow::Result<TrackedApplication> {
        let updated_at = match row.try_get::<Option<String>, _>("updated_at")? {
            Some(raw) if !raw.is_empty() => {
                Some(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
            }
            _ => None,
        };

        Ok(TrackedApplication {
            id: row.try_get("id")?,
            version: row.try_get("version")?,
            content_id: row.try_get("content_id")?,
            blob_path: row.try_get("blob_path")?,
            source_url: row.try_get("source_url")?,
            updated_at,
        })
    }
}

async fn init_schema(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracked_apps (
            id TEXT PRIMARY KEY,
            version TEXT NOT NULL DEFAULT '',
            content_id TEXT NOT NULL DEFAULT '',
            blob_path TEXT NOT NULL DEFAULT '',
            source_url TEXT NOT NULL DEFAULT '',
            updated_at TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    ensure_columns(conn).await?;

    info!("Initialized SQLite registry schema");
    Ok(())
}

/// Add any missing state column so older databases keep working
async fn ensure_columns(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    let rows = sqlx::query("PRAGMA table_info(tracked_apps)")
        .fetch_all(&mut *conn)
        .await?;
    let existing: Vec<String> = rows
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()?;

    for (column, definition) in REQUIRED_COLUMNS {
        if existing.iter().any(|c| c == column) {
            continue;
        }
        info!(column = %column, "Migrating registry schema: adding column");
        sqlx::query(&format!(
            "ALTER TABLE tracked_apps ADD COLUMN {} {}",
            column, definition
        ))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn list(&self) -> anyhow::Result<Vec<TrackedApplication>> {
        let rows = sqlx::query(
            "SELECT id, version, content_id, blob_path, source_url, updated_at FROM tracked_apps",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::app_from_row).collect()
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<TrackedApplication>> {
        let row = sqlx::query(
            "SELECT id, version, content_id, blob_path, source_url, updated_at FROM tracked_apps WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::app_from_row).transpose()
    }

    async fn upsert(&self, id: &str, update: RegistryUpdate) -> anyhow::Result<()> {
        let update = update.normalized();

        sqlx::query(
            r#"
            INSERT INTO tracked_apps (id, version, content_id, blob_path, source_url, updated_at)
            VALUES (?1, COALESCE(?2, ''), COALESCE(?3, ''), COALESCE(?4, ''), COALESCE(?5, ''), ?6)
            ON CONFLICT(id) DO UPDATE SET
                version = COALESCE(?2, tracked_apps.version),
                content_id = COALESCE(?3, tracked_apps.content_id),
                blob_path = COALESCE(?4, tracked_apps.blob_path),
                source_url = COALESCE(?5, tracked_apps.source_url),
                updated_at = COALESCE(?6, tracked_apps.updated_at)
            "#,
        )
        .bind(id)
        .bind(&update.version)
        .bind(&update.content_id)
        .bind(&update.blob_path)
        .bind(&update.source_url)
        .bind(update.updated_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        info!(app_id = %id, "Upserted tracked application");
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tracked_apps WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!(app_id = %id, "Removed tracked application");
        }

        Ok(removed)
    }
}
