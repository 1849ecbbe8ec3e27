use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::now_millis;
use crate::registry::Month;

/// Reserved key prefix; a global clear only touches rows under it.
const KEY_PREFIX: &str = "activity:";

/// Result-cache TTL when no config overrides it.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache key for one `(chain, address, month)` resolution. The address
/// is rendered lowercase so differently-cased inputs share an entry.
pub fn cache_key(address: Address, chain: &str, month: Month) -> String {
    format!("{KEY_PREFIX}{chain}:{address:#x}:{month}")
}

/// Local memoization layer for resolved month checks.
///
/// The cache is an optimization, never a correctness dependency:
/// implementations must absorb storage failures, degrading reads to a
/// miss and writes to a no-op.
#[async_trait]
pub trait ActivityCache: Send + Sync {
    /// `None` covers both "no entry" and "entry older than the TTL".
    async fn get(&self, address: Address, chain: &str, month: Month) -> Option<bool>;

    /// Unconditional overwrite, stamped with the current time.
    async fn set(&self, address: Address, chain: &str, month: Month, has_activity: bool);

    async fn remove(&self, address: Address, chain: &str, month: Month);

    /// Removes every entry under the reserved prefix, leaving unrelated
    /// rows in a shared store untouched.
    async fn clear_all(&self);
}

pub type CacheObj = Arc<dyn ActivityCache>;

/// SQLite-backed [`ActivityCache`]. `sqlite::memory:` gives a
/// session-scoped cache; a file URL gives a cross-session one.
pub struct SqliteCache {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteCache {
    pub async fn new(db_url: &str, ttl: Duration) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid cache database URL: {db_url}"))?
            .create_if_missing(true);

        // One connection: each pool connection of an in-memory SQLite
        // database would otherwise see its own private store.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .context("Failed to open cache database")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS activity_cache (
                key TEXT PRIMARY KEY,
                has_activity INTEGER NOT NULL,
                resolved_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .context("Failed to create cache table")?;

        Ok(Self { pool, ttl })
    }

    async fn try_get(&self, key: &str) -> Result<Option<bool>> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT has_activity, resolved_at FROM activity_cache WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let Some((has_activity, resolved_at)) = row else {
            return Ok(None);
        };

        // Expired rows are ignored, not deleted; the next write
        // overwrites them.
        if now_millis().saturating_sub(resolved_at) >= self.ttl.as_millis() as i64 {
            return Ok(None);
        }

        Ok(Some(has_activity != 0))
    }

    async fn try_set(&self, key: &str, has_activity: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity_cache (key, has_activity, resolved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET has_activity = ?2, resolved_at = ?3",
        )
        .bind(key)
        .bind(has_activity as i64)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrites an entry's timestamp, for TTL tests.
    #[cfg(test)]
    pub(crate) async fn backdate(&self, address: Address, chain: &str, month: Month, to: i64) {
        sqlx::query("UPDATE activity_cache SET resolved_at = ?2 WHERE key = ?1")
            .bind(cache_key(address, chain, month))
            .bind(to)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    #[cfg(test)]
    pub(crate) async fn entry_count(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activity_cache")
            .fetch_one(&self.pool)
            .await
            .unwrap();
        count
    }
}

#[async_trait]
impl ActivityCache for SqliteCache {
    async fn get(&self, address: Address, chain: &str, month: Month) -> Option<bool> {
        let key = cache_key(address, chain, month);
        match self.try_get(&key).await {
            Ok(hit) => hit,
            Err(err) => {
                tracing::warn!("Cache read failed for {key}, treating as miss: {err:#}");
                None
            }
        }
    }

    async fn set(&self, address: Address, chain: &str, month: Month, has_activity: bool) {
        let key = cache_key(address, chain, month);
        if let Err(err) = self.try_set(&key, has_activity).await {
            tracing::warn!("Cache write failed for {key}, dropping result: {err:#}");
        }
    }

    async fn remove(&self, address: Address, chain: &str, month: Month) {
        let key = cache_key(address, chain, month);
        if let Err(err) = sqlx::query("DELETE FROM activity_cache WHERE key = ?1")
            .bind(&key)
            .execute(&self.pool)
            .await
        {
            tracing::warn!("Cache delete failed for {key}: {err:#}");
        }
    }

    async fn clear_all(&self) {
        if let Err(err) = sqlx::query("DELETE FROM activity_cache WHERE key LIKE ?1")
            .bind(format!("{KEY_PREFIX}%"))
            .execute(&self.pool)
            .await
        {
            tracing::warn!("Cache clear failed: {err:#}");
        }
    }
}
