//! Quota usage log repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{NewUsageLogEntry, UsageLogDbModel};
use crate::database::time::now_ms;

/// Usage log repository trait. The log is append-only.
#[async_trait]
pub trait UsageLogRepository: Send + Sync {
    async fn insert(&self, entry: &NewUsageLogEntry) -> Result<i64>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<UsageLogDbModel>>;
    /// Total units charged since `since_ms` (failed calls included).
    async fn units_used_since(&self, since_ms: i64) -> Result<i64>;
}

/// SQLx implementation of UsageLogRepository.
pub struct SqlxUsageLogRepository {
    pool: SqlitePool,
}

impl SqlxUsageLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLogRepository for SqlxUsageLogRepository {
    async fn insert(&self, entry: &NewUsageLogEntry) -> Result<i64> {
        let channel_ids = serde_json::to_string(&entry.channel_ids)?;
        let result = sqlx::query(
            r#"
            INSERT INTO usage_log (
                api_key_id, endpoint, channel_ids, units_used,
                response_cached, success, error, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.api_key_id)
        .bind(&entry.endpoint)
        .bind(channel_ids)
        .bind(entry.units_used)
        .bind(entry.response_cached)
        .bind(entry.success)
        .bind(&entry.error)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<UsageLogDbModel>> {
        let rows = sqlx::query_as::<_, UsageLogDbModel>(
            "SELECT * FROM usage_log ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn units_used_since(&self, since_ms: i64) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(units_used), 0) FROM usage_log WHERE created_at >= ?",
        )
        .bind(since_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}
