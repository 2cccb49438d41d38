//! Transactional operations for API keys.
//!
//! The credential pool's select-and-reserve must be atomic, so these
//! operations run inside a caller-owned `BEGIN IMMEDIATE` transaction.

use sqlx::SqliteConnection;

use crate::Result;
use crate::database::models::ApiKeyDbModel;

/// Transactional operations for API keys.
///
/// These methods operate within an existing transaction and do NOT commit.
/// The caller is responsible for committing or rolling back the transaction.
pub struct ApiKeyTxOps;

impl ApiKeyTxOps {
    /// Pick the key to serve a request needing `required_units`.
    ///
    /// Candidates are active keys with headroom for the request; the least
    /// loaded wins, ties broken by least recently used (a never-used key
    /// sorts first).
    pub async fn select_candidate(
        tx: &mut SqliteConnection,
        required_units: i64,
        daily_cap: i64,
    ) -> Result<Option<ApiKeyDbModel>> {
        let key = sqlx::query_as::<_, ApiKeyDbModel>(
            r#"
            SELECT * FROM api_keys
            WHERE status = 'active'
              AND quota_used_today + ? <= ?
            ORDER BY quota_used_today ASC, last_used_at ASC
            LIMIT 1
            "#,
        )
        .bind(required_units)
        .bind(daily_cap)
        .fetch_optional(tx)
        .await?;
        Ok(key)
    }

    /// Reserve `units` against a key. Must run in the same transaction as
    /// [`Self::select_candidate`] so two callers cannot double-book headroom.
    pub async fn reserve(
        tx: &mut SqliteConnection,
        key_id: &str,
        units: i64,
        now_ms: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET quota_used_today = quota_used_today + ?,
                last_used_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(units)
        .bind(now_ms)
        .bind(now_ms)
        .bind(key_id)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a successful call: bump the lifetime counter, clear the error
    /// streak, and reconcile the reservation against the units actually
    /// charged (`delta_units` = actual - reserved, may be negative).
    pub async fn record_success(
        tx: &mut SqliteConnection,
        key_id: &str,
        delta_units: i64,
        now_ms: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET total_requests = total_requests + 1,
                consecutive_errors = 0,
                last_error = NULL,
                last_error_at = NULL,
                quota_used_today = MAX(0, quota_used_today + ?),
                last_used_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(delta_units)
        .bind(now_ms)
        .bind(now_ms)
        .bind(key_id)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Upstream reported quota exhaustion for this key. The reservation is
    /// left in place; the daily reset restores the key.
    pub async fn record_quota_exceeded(
        tx: &mut SqliteConnection,
        key_id: &str,
        error_message: &str,
        now_ms: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET status = 'quota_exceeded',
                quota_exceeded_at = ?,
                last_error = ?,
                last_error_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now_ms)
        .bind(error_message)
        .bind(now_ms)
        .bind(now_ms)
        .bind(key_id)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a failed call and deactivate the key once the streak reaches
    /// `deactivate_threshold`.
    ///
    /// Returns the new consecutive error count.
    pub async fn record_failure(
        tx: &mut SqliteConnection,
        key_id: &str,
        error_message: &str,
        deactivate_threshold: i64,
        now_ms: i64,
    ) -> Result<i64> {
        let affected = sqlx::query(
            r#"
            UPDATE api_keys
            SET consecutive_errors = consecutive_errors + 1,
                last_error = ?,
                last_error_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error_message)
        .bind(now_ms)
        .bind(now_ms)
        .bind(key_id)
        .execute(&mut *tx)
        .await?;

        if affected.rows_affected() == 0 {
            return Err(crate::Error::not_found("ApiKey", key_id));
        }

        let row = sqlx::query("SELECT consecutive_errors FROM api_keys WHERE id = ?")
            .bind(key_id)
            .fetch_one(&mut *tx)
            .await?;
        let new_count: i64 = sqlx::Row::get(&row, "consecutive_errors");

        if new_count >= deactivate_threshold {
            sqlx::query("UPDATE api_keys SET status = 'inactive', updated_at = ? WHERE id = ? AND status = 'active'")
                .bind(now_ms)
                .bind(key_id)
                .execute(tx)
                .await?;
        }

        Ok(new_count)
    }

    /// Zero daily counters for every key whose last reset fell on an earlier
    /// UTC day (`day_start_ms` is today's UTC midnight), or for all keys when
    /// `force` is set. Keys sidelined only by quota exhaustion come back
    /// active; keys deactivated by errors stay inactive.
    ///
    /// Returns the number of keys reset.
    pub async fn reset_daily(
        tx: &mut SqliteConnection,
        day_start_ms: i64,
        now_ms: i64,
        force: bool,
    ) -> Result<u64> {
        let sql = if force {
            r#"
            UPDATE api_keys
            SET quota_used_today = 0,
                last_quota_reset_at = ?2,
                status = CASE WHEN status = 'quota_exceeded' THEN 'active' ELSE status END,
                quota_exceeded_at = NULL,
                updated_at = ?2
            "#
        } else {
            r#"
            UPDATE api_keys
            SET quota_used_today = 0,
                last_quota_reset_at = ?2,
                status = CASE WHEN status = 'quota_exceeded' THEN 'active' ELSE status END,
                quota_exceeded_at = NULL,
                updated_at = ?2
            WHERE last_quota_reset_at < ?1
            "#
        };

        let result = sqlx::query(sql)
            .bind(day_start_ms)
            .bind(now_ms)
            .execute(tx)
            .await?;
        Ok(result.rows_affected())
    }
}
