//! Credential pool: load-balanced API key acquisition with quota accounting.
//!
//! Keys live in the `api_keys` table. Acquisition is select-and-reserve in a
//! single `BEGIN IMMEDIATE` transaction, so concurrent callers can never
//! double-book a key's remaining quota. Running out of keys is a normal
//! outcome ([`AcquireOutcome::Exhausted`]), not an error.

use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::database::repositories::ApiKeyTxOps;
use crate::database::time::{now_ms, utc_day_start_ms};
use crate::database::{WritePool, begin_immediate};
use crate::youtube::UpstreamError;

/// Default daily quota units per key (the YouTube Data API free tier).
pub const DEFAULT_DAILY_QUOTA_CAP: i64 = 10_000;

/// Consecutive failures before a key is pulled from rotation.
pub const DEFAULT_ERROR_THRESHOLD: i64 = 5;

/// Check cadence for the background daily reset task.
pub const DAILY_RESET_CHECK_INTERVAL_SECS: u64 = 300;

/// Credential pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Daily quota units each key may spend.
    pub daily_quota_cap: i64,
    /// Consecutive error count at which a key goes inactive.
    pub deactivate_error_threshold: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            daily_quota_cap: DEFAULT_DAILY_QUOTA_CAP,
            deactivate_error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

impl PoolConfig {
    /// Load pool config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `POOL_DAILY_QUOTA_CAP`
    /// - `POOL_ERROR_THRESHOLD`
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(cap) = std::env::var("POOL_DAILY_QUOTA_CAP")
            && let Ok(parsed) = cap.parse::<i64>()
            && parsed > 0
        {
            config.daily_quota_cap = parsed;
        }

        if let Ok(threshold) = std::env::var("POOL_ERROR_THRESHOLD")
            && let Ok(parsed) = threshold.parse::<i64>()
            && parsed > 0
        {
            config.deactivate_error_threshold = parsed;
        }

        config
    }
}

/// A reservation against one key. Hand it back through
/// [`CredentialPool::report`] once the call settles.
#[derive(Debug, Clone)]
pub struct KeyLease {
    pub key_id: String,
    pub secret: String,
    pub reserved_units: i64,
}

/// Result of an acquisition attempt.
#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired(KeyLease),
    /// No active key has headroom for the request. Callers back off; the
    /// next scheduled run retries after the daily reset or operator action.
    Exhausted,
}

impl AcquireOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// How a leased call settled.
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    /// The call went through; `units_charged` is what it actually cost.
    Success { units_charged: i64 },
    /// Upstream says this key's daily quota is spent.
    QuotaExceeded { message: String },
    /// Retryable failure (network, 5xx, rate limiting).
    Transient { message: String },
    /// The key was rejected outright.
    Auth { message: String },
}

impl ReportOutcome {
    /// Map an upstream error to the report that should follow it.
    pub fn from_upstream(error: &UpstreamError) -> Self {
        match error {
            UpstreamError::QuotaExceeded(msg) => Self::QuotaExceeded {
                message: msg.clone(),
            },
            UpstreamError::Auth(msg) => Self::Auth {
                message: msg.clone(),
            },
            UpstreamError::Transient(msg) | UpstreamError::Malformed(msg) => Self::Transient {
                message: msg.clone(),
            },
        }
    }
}

/// Load-balancing credential pool over the `api_keys` table.
#[derive(Clone)]
pub struct CredentialPool {
    write_pool: WritePool,
    config: PoolConfig,
}

impl CredentialPool {
    pub fn new(write_pool: WritePool, config: PoolConfig) -> Self {
        Self { write_pool, config }
    }

    /// Acquire a key with headroom for `required_units`, reserving those
    /// units atomically. The reservation is reconciled by [`Self::report`].
    pub async fn acquire(&self, required_units: i64) -> Result<AcquireOutcome> {
        if required_units <= 0 {
            return Err(crate::Error::validation(
                "required_units must be positive",
            ));
        }

        let now = now_ms();
        let mut tx = begin_immediate(&self.write_pool).await?;

        let candidate =
            ApiKeyTxOps::select_candidate(&mut tx, required_units, self.config.daily_quota_cap)
                .await?;

        let Some(key) = candidate else {
            tx.rollback().await?;
            warn!(required_units, "credential pool exhausted");
            return Ok(AcquireOutcome::Exhausted);
        };

        ApiKeyTxOps::reserve(&mut tx, &key.id, required_units, now).await?;
        tx.commit().await?;

        debug!(
            key_id = %key.id,
            required_units,
            used_before = key.quota_used_today,
            "acquired api key"
        );

        Ok(AcquireOutcome::Acquired(KeyLease {
            key_id: key.id,
            secret: key.secret,
            reserved_units: required_units,
        }))
    }

    /// Settle a lease.
    ///
    /// Success clears the error streak and adjusts the reservation to the
    /// units actually charged. Failures keep the reservation: better to
    /// under-spend a key than to overshoot its quota, and the daily reset
    /// clears any drift.
    pub async fn report(&self, lease: &KeyLease, outcome: ReportOutcome) -> Result<()> {
        let now = now_ms();
        let mut tx = begin_immediate(&self.write_pool).await?;

        match outcome {
            ReportOutcome::Success { units_charged } => {
                let delta = units_charged - lease.reserved_units;
                ApiKeyTxOps::record_success(&mut tx, &lease.key_id, delta, now).await?;
            }
            ReportOutcome::QuotaExceeded { message } => {
                ApiKeyTxOps::record_quota_exceeded(&mut tx, &lease.key_id, &message, now).await?;
                warn!(key_id = %lease.key_id, "api key reported quota exhausted; sidelined until daily reset");
            }
            ReportOutcome::Transient { message } | ReportOutcome::Auth { message } => {
                let count = ApiKeyTxOps::record_failure(
                    &mut tx,
                    &lease.key_id,
                    &message,
                    self.config.deactivate_error_threshold,
                    now,
                )
                .await?;
                if count >= self.config.deactivate_error_threshold {
                    warn!(
                        key_id = %lease.key_id,
                        consecutive_errors = count,
                        "api key deactivated after repeated failures"
                    );
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Zero daily counters for keys last reset on an earlier UTC day, or for
    /// every key when `force` is set. Returns the number of keys reset.
    pub async fn reset_daily_quota(&self, force: bool) -> Result<u64> {
        let now = now_ms();
        let day_start = utc_day_start_ms(now);

        let mut tx = begin_immediate(&self.write_pool).await?;
        let reset = ApiKeyTxOps::reset_daily(&mut tx, day_start, now, force).await?;
        tx.commit().await?;

        if reset > 0 {
            info!(keys = reset, force, "daily quota reset complete");
        }
        Ok(reset)
    }

    /// Spawn the background daily reset task.
    ///
    /// Checks every few minutes and resets only keys whose last reset
    /// predates the current UTC day, so the sweep stays idempotent no
    /// matter how often it fires or when the process started.
    pub fn start_daily_reset_task(&self, cancellation_token: CancellationToken) {
        let pool = self.clone();

        tokio::spawn(async move {
            let mut check_interval =
                interval(Duration::from_secs(DAILY_RESET_CHECK_INTERVAL_SECS));
            info!("daily quota reset task started");

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("daily quota reset task shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        if let Err(e) = pool.reset_daily_quota(false).await {
                            error!("daily quota reset failed: {}", e);
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup_pool() -> (SqlitePool, CredentialPool) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE api_keys (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                secret TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'active',
                quota_used_today INTEGER NOT NULL DEFAULT 0,
                total_requests INTEGER NOT NULL DEFAULT 0,
                last_used_at INTEGER,
                last_quota_reset_at INTEGER NOT NULL DEFAULT 0,
                quota_exceeded_at INTEGER,
                consecutive_errors INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_error_at INTEGER,
                created_at INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let credential_pool = CredentialPool::new(pool.clone(), PoolConfig::default());
        (pool, credential_pool)
    }

    async fn insert_key(pool: &SqlitePool, id: &str, used: i64) {
        sqlx::query(
            "INSERT INTO api_keys (id, name, secret, quota_used_today) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("key {id}"))
        .bind(format!("secret-{id}"))
        .bind(used)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn key_row(pool: &SqlitePool, id: &str) -> (String, i64, i64, i64) {
        sqlx::query_as(
            "SELECT status, quota_used_today, total_requests, consecutive_errors FROM api_keys WHERE id = ?",
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_acquire_reserves_units() {
        let (pool, credentials) = setup_pool().await;
        insert_key(&pool, "a", 0).await;

        let outcome = credentials.acquire(101).await.unwrap();
        let AcquireOutcome::Acquired(lease) = outcome else {
            panic!("expected a lease");
        };
        assert_eq!(lease.key_id, "a");
        assert_eq!(lease.secret, "secret-a");
        assert_eq!(lease.reserved_units, 101);

        let (_, used, _, _) = key_row(&pool, "a").await;
        assert_eq!(used, 101);
    }

    #[tokio::test]
    async fn test_acquire_exhausted_near_cap_leaves_key_active() {
        let (pool, credentials) = setup_pool().await;
        // 9,999 of 10,000 used; a 100-unit request cannot fit.
        insert_key(&pool, "a", 9_999).await;

        let outcome = credentials.acquire(100).await.unwrap();
        assert!(outcome.is_exhausted());

        // Exhaustion is backpressure, not a key failure.
        let (status, used, _, errors) = key_row(&pool, "a").await;
        assert_eq!(status, "active");
        assert_eq!(used, 9_999);
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn test_report_success_reconciles_and_clears_errors() {
        let (pool, credentials) = setup_pool().await;
        insert_key(&pool, "a", 0).await;
        sqlx::query("UPDATE api_keys SET consecutive_errors = 3 WHERE id = 'a'")
            .execute(&pool)
            .await
            .unwrap();

        let AcquireOutcome::Acquired(lease) = credentials.acquire(101).await.unwrap() else {
            panic!("expected a lease");
        };
        credentials
            .report(&lease, ReportOutcome::Success { units_charged: 100 })
            .await
            .unwrap();

        let (status, used, total, errors) = key_row(&pool, "a").await;
        assert_eq!(status, "active");
        assert_eq!(used, 100);
        assert_eq!(total, 1);
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn test_report_quota_exceeded_sidelines_key() {
        let (pool, credentials) = setup_pool().await;
        insert_key(&pool, "a", 0).await;

        let AcquireOutcome::Acquired(lease) = credentials.acquire(100).await.unwrap() else {
            panic!("expected a lease");
        };
        credentials
            .report(
                &lease,
                ReportOutcome::QuotaExceeded {
                    message: "daily limit".to_string(),
                },
            )
            .await
            .unwrap();

        let (status, used, _, _) = key_row(&pool, "a").await;
        assert_eq!(status, "quota_exceeded");
        // The reservation stands.
        assert_eq!(used, 100);

        // And the key no longer serves acquisitions.
        assert!(credentials.acquire(1).await.unwrap().is_exhausted());
    }

    #[tokio::test]
    async fn test_repeated_auth_failures_deactivate_key() {
        let (pool, credentials) = setup_pool().await;
        insert_key(&pool, "a", 0).await;

        for _ in 0..5 {
            let AcquireOutcome::Acquired(lease) = credentials.acquire(1).await.unwrap() else {
                panic!("expected a lease");
            };
            credentials
                .report(
                    &lease,
                    ReportOutcome::Auth {
                        message: "key invalid".to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let (status, _, _, errors) = key_row(&pool, "a").await;
        assert_eq!(status, "inactive");
        assert_eq!(errors, 5);
    }

    #[tokio::test]
    async fn test_reset_daily_quota_force_restores_exhausted() {
        let (pool, credentials) = setup_pool().await;
        insert_key(&pool, "a", 10_000).await;
        sqlx::query(
            "UPDATE api_keys SET status = 'quota_exceeded', quota_exceeded_at = 123 WHERE id = 'a'",
        )
        .execute(&pool)
        .await
        .unwrap();

        let reset = credentials.reset_daily_quota(true).await.unwrap();
        assert_eq!(reset, 1);

        let (status, used, _, _) = key_row(&pool, "a").await;
        assert_eq!(status, "active");
        assert_eq!(used, 0);

        assert!(!credentials.acquire(100).await.unwrap().is_exhausted());
    }
}
