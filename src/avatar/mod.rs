//! Avatar refresher: low-priority backfill of channel avatar URLs.
//!
//! Shares the credential pool with the sync tiers and backs off entirely
//! when the pool is exhausted, so it never starves stream syncing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::database::DbPool;
use crate::database::models::NewUsageLogEntry;
use crate::database::repositories::{
    ChannelRepository, SqlxChannelRepository, SqlxUsageLogRepository, UsageLogRepository,
};
use crate::keypool::{AcquireOutcome, CredentialPool, ReportOutcome};
use crate::youtube::{CHANNELS_LIST_UNITS, MAX_CHANNELS_PER_CALL, UpstreamError, YouTubeApi};

const AVATAR_ENDPOINT: &str = "channels.list";

pub const DEFAULT_AVATAR_BATCH_LIMIT: u32 = 50;
pub const DEFAULT_AVATAR_REFRESH_INTERVAL_SECS: u64 = 21_600;

/// Avatar refresher configuration.
#[derive(Debug, Clone)]
pub struct AvatarConfig {
    /// Channels considered per run when the caller does not pass a limit.
    /// Zero means unlimited.
    pub batch_limit: u32,
    /// Cadence of the background refresh task.
    pub refresh_interval: Duration,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_AVATAR_BATCH_LIMIT,
            refresh_interval: Duration::from_secs(DEFAULT_AVATAR_REFRESH_INTERVAL_SECS),
        }
    }
}

impl AvatarConfig {
    /// Load avatar config from environment variables, falling back to
    /// defaults. Supported: `AVATAR_BATCH_LIMIT`,
    /// `AVATAR_REFRESH_INTERVAL_SECS`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(limit) = std::env::var("AVATAR_BATCH_LIMIT")
            && let Ok(parsed) = limit.parse::<u32>()
        {
            config.batch_limit = parsed;
        }

        if let Ok(secs) = std::env::var("AVATAR_REFRESH_INTERVAL_SECS")
            && let Ok(parsed) = secs.parse::<u64>()
            && parsed > 0
        {
            config.refresh_interval = Duration::from_secs(parsed);
        }

        config
    }
}

/// What one refresh run accomplished.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AvatarRefreshOutcome {
    pub refreshed: usize,
    /// Channels left untouched because the pool ran out of quota.
    pub skipped: usize,
    pub failed: usize,
}

pub struct AvatarRefresher {
    channels: SqlxChannelRepository,
    usage: SqlxUsageLogRepository,
    credentials: Arc<CredentialPool>,
    api: Arc<dyn YouTubeApi>,
    config: AvatarConfig,
}

impl AvatarRefresher {
    pub fn new(
        read_pool: DbPool,
        credentials: Arc<CredentialPool>,
        api: Arc<dyn YouTubeApi>,
        config: AvatarConfig,
    ) -> Self {
        Self {
            channels: SqlxChannelRepository::new(read_pool.clone()),
            usage: SqlxUsageLogRepository::new(read_pool),
            credentials,
            api,
            config,
        }
    }

    /// Refresh avatars for channels missing one, or for every channel when
    /// `force_all` is set. `limit` falls back to the configured batch limit;
    /// zero means unlimited.
    pub async fn run(&self, limit: Option<u32>, force_all: bool) -> Result<AvatarRefreshOutcome> {
        let limit = limit.unwrap_or(self.config.batch_limit);
        let mut outcome = AvatarRefreshOutcome::default();

        let mut ids: Vec<String> = if force_all {
            self.channels
                .list_channels()
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect()
        } else {
            self.channels
                .list_channels_missing_avatar(limit)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect()
        };
        if force_all && limit > 0 {
            ids.truncate(limit as usize);
        }

        if ids.is_empty() {
            debug!("no channels need an avatar refresh");
            return Ok(outcome);
        }

        let chunks: Vec<&[String]> = ids.chunks(MAX_CHANNELS_PER_CALL).collect();
        for (index, chunk) in chunks.iter().enumerate() {
            let lease = match self.credentials.acquire(CHANNELS_LIST_UNITS).await? {
                AcquireOutcome::Acquired(lease) => lease,
                AcquireOutcome::Exhausted => {
                    // Low priority: back off entirely, never retry into an
                    // exhausted pool.
                    let remaining: usize = chunks[index..].iter().map(|c| c.len()).sum();
                    outcome.skipped += remaining;
                    warn!(
                        remaining,
                        "credential pool exhausted; avatar refresh deferred"
                    );
                    break;
                }
            };

            match self.api.fetch_channel_avatars(&lease.secret, chunk).await {
                Ok(page) => {
                    self.credentials
                        .report(
                            &lease,
                            ReportOutcome::Success {
                                units_charged: page.units_charged,
                            },
                        )
                        .await?;
                    self.usage
                        .insert(&NewUsageLogEntry::call(
                            &lease.key_id,
                            AVATAR_ENDPOINT,
                            chunk.to_vec(),
                            page.units_charged,
                        ))
                        .await?;

                    let by_id: HashMap<&str, Option<&str>> = page
                        .items
                        .iter()
                        .map(|a| (a.channel_id.as_str(), a.avatar_url.as_deref()))
                        .collect();
                    for channel_id in *chunk {
                        match by_id.get(channel_id.as_str()) {
                            Some(Some(url)) => {
                                self.channels.update_avatar(channel_id, url).await?;
                                outcome.refreshed += 1;
                            }
                            _ => outcome.failed += 1,
                        }
                    }
                }
                Err(err) => {
                    if !matches!(err, UpstreamError::Malformed(_)) {
                        self.credentials
                            .report(&lease, ReportOutcome::from_upstream(&err))
                            .await?;
                    }
                    self.usage
                        .insert(&NewUsageLogEntry::failed_call(
                            &lease.key_id,
                            AVATAR_ENDPOINT,
                            chunk.to_vec(),
                            0,
                            err.to_string(),
                        ))
                        .await?;
                    outcome.failed += chunk.len();
                    warn!(channels = chunk.len(), error = %err, "avatar chunk failed");
                }
            }
        }

        info!(
            refreshed = outcome.refreshed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "avatar refresh complete"
        );
        Ok(outcome)
    }

    /// Spawn the background refresh task, filling in missing avatars at the
    /// configured cadence.
    pub fn start_background_task(self: &Arc<Self>, cancellation_token: CancellationToken) {
        let refresher = self.clone();

        tokio::spawn(async move {
            let mut refresh_interval = interval(refresher.config.refresh_interval);
            info!(
                interval_secs = refresher.config.refresh_interval.as_secs(),
                "avatar refresh task started"
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("avatar refresh task shutting down");
                        break;
                    }
                    _ = refresh_interval.tick() => {
                        if let Err(e) = refresher.run(None, false).await {
                            error!("avatar refresh failed: {}", e);
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

    #[test]
    fn test_default_config() {
        let config = AvatarConfig::default();
        assert_eq!(config.batch_limit, 50);
        assert_eq!(config.refresh_interval, Duration::from_secs(21_600));
    }
}
