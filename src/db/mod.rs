use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::models::Metadata;
use crate::services::cache::{CacheKey, CachedLookup, MetadataCache};

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata_cache (
            cache_key TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            year INTEGER,
            season INTEGER,
            -- NULL payload records a confirmed miss
            payload TEXT,
            expires_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_metadata_cache_expires
            ON metadata_cache(expires_at) WHERE expires_at IS NOT NULL;
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete expired cache rows, returns how many were removed
pub async fn prune_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM metadata_cache WHERE expires_at IS NOT NULL AND expires_at <= ?",
    )
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn cache_entry_count(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metadata_cache")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Metadata cache persisted in the `metadata_cache` table.
/// Storage errors are logged and behave like a cache miss.
pub struct SqliteMetadataCache {
    pool: SqlitePool,
}

impl SqliteMetadataCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<CachedLookup>> {
        let row: Option<(Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT payload, expires_at FROM metadata_cache WHERE cache_key = ?",
        )
        .bind(key.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        let Some((payload, expires_at)) = row else {
            return Ok(None);
        };
        if expires_at.is_some_and(|at| at <= Utc::now()) {
            return Ok(None);
        }

        match payload {
            None => Ok(Some(CachedLookup::NoMatch)),
            Some(json) => {
                let metadata: Metadata = serde_json::from_str(&json)?;
                Ok(Some(CachedLookup::Found(metadata)))
            }
        }
    }

    async fn store(&self, key: &CacheKey, value: &CachedLookup, ttl: Option<Duration>) -> Result<()> {
        let payload = match value {
            CachedLookup::Found(metadata) => Some(serde_json::to_string(metadata)?),
            CachedLookup::NoMatch => None,
        };
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        sqlx::query(
            r#"
            INSERT INTO metadata_cache (cache_key, kind, title, year, season, payload, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at,
                created_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key.storage_key())
        .bind(key.kind.as_str())
        .bind(&key.title)
        .bind(key.year)
        .bind(key.season.map(i64::from))
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MetadataCache for SqliteMetadataCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedLookup> {
        match self.load(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read metadata cache for '{}': {}", key.title, e);
                None
            }
        }
    }

    async fn put(&self, key: CacheKey, value: CachedLookup, ttl: Option<Duration>) {
        if let Err(e) = self.store(&key, &value, ttl).await {
            tracing::warn!("Failed to write metadata cache for '{}': {}", key.title, e);
        }
    }
}
