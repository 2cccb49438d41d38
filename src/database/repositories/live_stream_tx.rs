//! Transactional operations for live streams.
//!
//! A sync run reconciles a whole batch of observations in one write
//! transaction. All mutations here enforce the lifecycle ordering in SQL so
//! a stale or concurrent writer can never move a stream backwards.

use std::collections::HashMap;

use sqlx::SqliteConnection;

use crate::Result;
use crate::database::models::StreamStatus;

/// One observed broadcast, ready to be written.
#[derive(Debug, Clone)]
pub struct StreamUpsert {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub status: StreamStatus,
    pub scheduled_start_at: Option<i64>,
    pub actual_start_at: Option<i64>,
    pub actual_end_at: Option<i64>,
}

/// Transactional operations for live streams.
///
/// These methods operate within an existing transaction and do NOT commit.
pub struct StreamTxOps;

impl StreamTxOps {
    /// Current statuses for a set of video ids (absent ids are omitted).
    pub async fn statuses_by_ids(
        tx: &mut SqliteConnection,
        video_ids: &[String],
    ) -> Result<HashMap<String, StreamStatus>> {
        if video_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; video_ids.len()].join(", ");
        let sql = format!(
            "SELECT video_id, status FROM live_streams WHERE video_id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for id in video_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(tx).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, status)| StreamStatus::parse(&status).map(|s| (id, s)))
            .collect())
    }

    /// Insert or update a broadcast record.
    ///
    /// The conflict branch refuses regressions: terminal rows keep their
    /// status, and a stale `upcoming` observation never demotes a `live`
    /// row. Start/end timestamps are write-once; the scheduled start follows
    /// the newest observation so reschedules propagate.
    pub async fn upsert_observed(
        tx: &mut SqliteConnection,
        upsert: &StreamUpsert,
        now_ms: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO live_streams (
                video_id, channel_id, title, status,
                scheduled_start_at, actual_start_at, actual_end_at,
                fetched_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                title = excluded.title,
                status = CASE
                    WHEN live_streams.status IN ('ended', 'missed') THEN live_streams.status
                    WHEN live_streams.status = 'live' AND excluded.status = 'upcoming'
                        THEN live_streams.status
                    ELSE excluded.status
                END,
                scheduled_start_at = COALESCE(excluded.scheduled_start_at, live_streams.scheduled_start_at),
                actual_start_at = COALESCE(live_streams.actual_start_at, excluded.actual_start_at),
                actual_end_at = COALESCE(live_streams.actual_end_at, excluded.actual_end_at),
                fetched_at = excluded.fetched_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&upsert.video_id)
        .bind(&upsert.channel_id)
        .bind(&upsert.title)
        .bind(upsert.status.as_str())
        .bind(upsert.scheduled_start_at)
        .bind(upsert.actual_start_at)
        .bind(upsert.actual_end_at)
        .bind(now_ms)
        .bind(now_ms)
        .bind(now_ms)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// End every `live` stream of `channel_id` that is absent from the
    /// observed live set. Used when a definitive live listing came back for
    /// the channel.
    ///
    /// Returns the number of streams ended.
    pub async fn mark_ended_not_in(
        tx: &mut SqliteConnection,
        channel_id: &str,
        observed_live_ids: &[String],
        now_ms: i64,
    ) -> Result<u64> {
        let sql = if observed_live_ids.is_empty() {
            r#"
            UPDATE live_streams
            SET status = 'ended',
                actual_end_at = COALESCE(actual_end_at, ?1),
                updated_at = ?1
            WHERE channel_id = ?2 AND status = 'live'
            "#
            .to_string()
        } else {
            // Numbered to match the bind order: sqlx-sqlite maps bare `?`
            // placeholders from the first argument even after `?1`/`?2`.
            let placeholders = (0..observed_live_ids.len())
                .map(|i| format!("?{}", i + 3))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                r#"
                UPDATE live_streams
                SET status = 'ended',
                    actual_end_at = COALESCE(actual_end_at, ?1),
                    updated_at = ?1
                WHERE channel_id = ?2 AND status = 'live'
                  AND video_id NOT IN ({placeholders})
                "#
            )
        };

        let mut query = sqlx::query(&sql).bind(now_ms).bind(channel_id);
        for id in observed_live_ids {
            query = query.bind(id);
        }

        let result = query.execute(tx).await?;
        Ok(result.rows_affected())
    }

    /// Mark overdue `upcoming` streams of the given channels as `missed`:
    /// scheduled before `cutoff_ms` and never observed live.
    ///
    /// Returns the number of streams marked.
    pub async fn mark_missed(
        tx: &mut SqliteConnection,
        channel_ids: &[String],
        cutoff_ms: i64,
        now_ms: i64,
    ) -> Result<u64> {
        if channel_ids.is_empty() {
            return Ok(0);
        }

        // Numbered to match the bind order: sqlx-sqlite maps bare `?`
        // placeholders from the first argument even after `?1`/`?2`.
        let placeholders = (0..channel_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            UPDATE live_streams
            SET status = 'missed', updated_at = ?1
            WHERE status = 'upcoming'
              AND actual_start_at IS NULL
              AND scheduled_start_at IS NOT NULL
              AND scheduled_start_at < ?2
              AND channel_id IN ({placeholders})
            "#
        );

        let mut query = sqlx::query(&sql).bind(now_ms).bind(cutoff_ms);
        for id in channel_ids {
            query = query.bind(id);
        }

        let result = query.execute(tx).await?;
        Ok(result.rows_affected())
    }
}
