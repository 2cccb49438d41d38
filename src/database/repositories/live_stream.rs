//! Live stream repository (read side).

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{LiveStreamDbModel, StreamStatus};
use crate::{Error, Result};

/// Filter for stream listings. All fields are optional and AND-ed together.
///
/// `from_ms`/`to_ms` bound the stream's event time: the actual start when
/// known, otherwise the scheduled start.
#[derive(Debug, Clone, Default)]
pub struct StreamQuery {
    pub status: Option<StreamStatus>,
    pub channel_id: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: Option<u32>,
}

/// Default and maximum listing sizes.
pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 500;

/// Live stream repository trait.
#[async_trait]
pub trait StreamRepository: Send + Sync {
    async fn get_stream(&self, video_id: &str) -> Result<LiveStreamDbModel>;
    async fn query_streams(&self, query: &StreamQuery) -> Result<Vec<LiveStreamDbModel>>;
    /// Enabled channels that currently hold a `live` stream or an `upcoming`
    /// one scheduled to start before `horizon_end_ms` (the active tier's
    /// scope).
    async fn channels_with_current_streams(&self, horizon_end_ms: i64) -> Result<Vec<String>>;
}

/// SQLx implementation of StreamRepository.
pub struct SqlxStreamRepository {
    pool: SqlitePool,
}

impl SqlxStreamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamRepository for SqlxStreamRepository {
    async fn get_stream(&self, video_id: &str) -> Result<LiveStreamDbModel> {
        sqlx::query_as::<_, LiveStreamDbModel>("SELECT * FROM live_streams WHERE video_id = ?")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("LiveStream", video_id))
    }

    async fn query_streams(&self, query: &StreamQuery) -> Result<Vec<LiveStreamDbModel>> {
        // Build dynamic WHERE clause
        let mut conditions: Vec<String> = Vec::new();
        if query.status.is_some() {
            conditions.push("status = ?".to_string());
        }
        if query.channel_id.is_some() {
            conditions.push("channel_id = ?".to_string());
        }
        if query.from_ms.is_some() {
            conditions.push("COALESCE(actual_start_at, scheduled_start_at) >= ?".to_string());
        }
        if query.to_ms.is_some() {
            conditions.push("COALESCE(actual_start_at, scheduled_start_at) <= ?".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM live_streams {} ORDER BY COALESCE(actual_start_at, scheduled_start_at) DESC LIMIT ?",
            where_clause
        );

        let mut q = sqlx::query_as::<_, LiveStreamDbModel>(&sql);
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        if let Some(channel_id) = &query.channel_id {
            q = q.bind(channel_id);
        }
        if let Some(from_ms) = query.from_ms {
            q = q.bind(from_ms);
        }
        if let Some(to_ms) = query.to_ms {
            q = q.bind(to_ms);
        }
        q = q.bind(query.limit.unwrap_or(DEFAULT_QUERY_LIMIT).min(MAX_QUERY_LIMIT));

        let streams = q.fetch_all(&self.pool).await?;
        Ok(streams)
    }

    async fn channels_with_current_streams(&self, horizon_end_ms: i64) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT s.channel_id FROM live_streams s
            JOIN channels c ON c.id = s.channel_id
            WHERE c.enabled = 1
              AND (s.status = 'live'
                   OR (s.status = 'upcoming'
                       AND s.scheduled_start_at IS NOT NULL
                       AND s.scheduled_start_at <= ?))
            ORDER BY s.channel_id
            "#,
        )
        .bind(horizon_end_ms)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
