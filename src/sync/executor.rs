//! Sync executor: runs one tier pass end to end.
//!
//! A pass resolves the tier's channel scope, probes the response cache,
//! reserves quota from the credential pool, fetches broadcasts per channel,
//! and reconciles the observations into the stream repository inside a
//! single write transaction.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;
use crate::cache::{CacheSignature, ChannelBatch, ResponseCache};
use crate::database::models::{NewUsageLogEntry, StreamStatus};
use crate::database::repositories::{
    ChannelRepository, SqlxChannelRepository, SqlxStreamRepository, SqlxUsageLogRepository,
    StreamRepository, StreamTxOps, UsageLogRepository,
};
use crate::database::time::{datetime_to_ms, now_ms};
use crate::database::{DbPool, WritePool, begin_immediate};
use crate::keypool::{AcquireOutcome, CredentialPool, KeyLease, ReportOutcome};
use crate::sync::lifecycle;
use crate::sync::tier::{ChannelScope, SyncConfig, SyncTier, TierPlan};
use crate::youtube::{BroadcastItem, BroadcastPage, EventType, UpstreamError, YouTubeApi};

const SEARCH_ENDPOINT: &str = "search.list";

/// Options forwarded from the trigger surface.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Fetch fresh data even when a cached response is still valid. The
    /// fresh result still lands in the cache.
    #[serde(default)]
    pub force_refresh: bool,
    /// Bypass the cache entirely: no read, no write.
    #[serde(default)]
    pub skip_cache: bool,
}

/// One channel's failure within an otherwise continuing pass.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSyncError {
    pub channel_id: String,
    pub event_type: EventType,
    pub message: String,
}

/// Aggregate result of one tier pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub tier: SyncTier,
    pub channels_scoped: usize,
    pub videos_upserted: u64,
    pub went_live: u64,
    pub ended: u64,
    pub missed: u64,
    pub units_charged: i64,
    pub cache_hit: bool,
    pub quota_error: bool,
    pub errors: Vec<ChannelSyncError>,
}

impl SyncOutcome {
    fn new(tier: SyncTier) -> Self {
        Self {
            tier,
            channels_scoped: 0,
            videos_upserted: 0,
            went_live: 0,
            ended: 0,
            missed: 0,
            units_charged: 0,
            cache_hit: false,
            quota_error: false,
            errors: Vec::new(),
        }
    }
}

struct FetchResult {
    batches: Vec<ChannelBatch>,
    units_charged: i64,
    successes: usize,
    aborted: bool,
}

pub struct SyncExecutor {
    channels: SqlxChannelRepository,
    streams: SqlxStreamRepository,
    usage: SqlxUsageLogRepository,
    credentials: Arc<CredentialPool>,
    cache: Arc<ResponseCache>,
    api: Arc<dyn YouTubeApi>,
    write_pool: WritePool,
    config: SyncConfig,
}

impl SyncExecutor {
    pub fn new(
        read_pool: DbPool,
        write_pool: WritePool,
        credentials: Arc<CredentialPool>,
        cache: Arc<ResponseCache>,
        api: Arc<dyn YouTubeApi>,
        config: SyncConfig,
    ) -> Self {
        Self {
            channels: SqlxChannelRepository::new(read_pool.clone()),
            streams: SqlxStreamRepository::new(read_pool.clone()),
            usage: SqlxUsageLogRepository::new(read_pool),
            credentials,
            cache,
            api,
            write_pool,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one pass of `tier`.
    ///
    /// Per-channel failures accumulate in the outcome and the pass keeps
    /// going; only pool exhaustion and a quota-exceeded key cut it short.
    pub async fn run(&self, tier: SyncTier, options: SyncOptions) -> Result<SyncOutcome> {
        let started = Instant::now();
        let plan = self.config.plan_for(tier);
        let mut outcome = SyncOutcome::new(tier);

        let channel_ids = self.resolve_scope(&plan).await?;
        outcome.channels_scoped = channel_ids.len();
        if channel_ids.is_empty() {
            debug!(tier = %tier, "no channels in scope");
            return Ok(outcome);
        }

        let signature = CacheSignature::new(
            SEARCH_ENDPOINT,
            &channel_ids,
            plan.event_types,
            plan.window.cache_label(),
        );

        if !options.force_refresh
            && !options.skip_cache
            && let Some(batches) = self.cache.get(&signature)
        {
            outcome.cache_hit = true;
            self.usage
                .insert(&NewUsageLogEntry::cache_hit(
                    SEARCH_ENDPOINT,
                    channel_ids.clone(),
                ))
                .await?;
            self.reconcile(&plan, &channel_ids, &batches, &mut outcome)
                .await?;
            info!(
                tier = %tier,
                channels = outcome.channels_scoped,
                videos = outcome.videos_upserted,
                "sync pass served from cache"
            );
            return Ok(outcome);
        }

        let estimated = plan.estimated_units(channel_ids.len());
        let lease = match self.credentials.acquire(estimated).await? {
            AcquireOutcome::Acquired(lease) => lease,
            AcquireOutcome::Exhausted => {
                warn!(tier = %tier, estimated, "credential pool exhausted; pass skipped");
                outcome.quota_error = true;
                return Ok(outcome);
            }
        };

        let fetch = self
            .fetch_batches(&plan, &channel_ids, &lease, &mut outcome)
            .await?;
        outcome.units_charged = fetch.units_charged;

        if fetch.successes > 0 && !fetch.aborted {
            // Any success settles the lease: the reservation reconciles to
            // actual spend and the key's error streak resets.
            self.credentials
                .report(
                    &lease,
                    ReportOutcome::Success {
                        units_charged: fetch.units_charged,
                    },
                )
                .await?;
        }

        self.reconcile(&plan, &channel_ids, &fetch.batches, &mut outcome)
            .await?;

        if !options.skip_cache && !fetch.aborted && outcome.errors.is_empty() {
            self.cache
                .put(signature, fetch.batches, self.config.ttl_for(tier));
        }

        info!(
            tier = %tier,
            channels = outcome.channels_scoped,
            videos = outcome.videos_upserted,
            went_live = outcome.went_live,
            ended = outcome.ended,
            missed = outcome.missed,
            units = outcome.units_charged,
            quota_error = outcome.quota_error,
            errors = outcome.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync pass complete"
        );
        Ok(outcome)
    }

    async fn resolve_scope(&self, plan: &TierPlan) -> Result<Vec<String>> {
        match plan.scope {
            ChannelScope::AllEnabled => Ok(self
                .channels
                .list_enabled_channels()
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect()),
            ChannelScope::CurrentStreams => {
                let horizon_end = now_ms() + self.config.active_horizon.as_millis() as i64;
                self.streams
                    .channels_with_current_streams(horizon_end)
                    .await
            }
        }
    }

    async fn fetch_batches(
        &self,
        plan: &TierPlan,
        channel_ids: &[String],
        lease: &KeyLease,
        outcome: &mut SyncOutcome,
    ) -> Result<FetchResult> {
        let mut result = FetchResult {
            batches: Vec::new(),
            units_charged: 0,
            successes: 0,
            aborted: false,
        };

        'channels: for channel_id in channel_ids {
            for &event_type in plan.event_types {
                match self
                    .search_with_retry(&lease.secret, channel_id, event_type)
                    .await
                {
                    Ok(page) => {
                        result.units_charged += page.units_charged;
                        result.successes += 1;
                        self.usage
                            .insert(&NewUsageLogEntry::call(
                                &lease.key_id,
                                SEARCH_ENDPOINT,
                                vec![channel_id.clone()],
                                page.units_charged,
                            ))
                            .await?;
                        result.batches.push(ChannelBatch {
                            channel_id: channel_id.clone(),
                            event_type,
                            items: page.items,
                        });
                    }
                    Err(err) => {
                        self.usage
                            .insert(&NewUsageLogEntry::failed_call(
                                &lease.key_id,
                                SEARCH_ENDPOINT,
                                vec![channel_id.clone()],
                                0,
                                err.to_string(),
                            ))
                            .await?;
                        outcome.errors.push(ChannelSyncError {
                            channel_id: channel_id.clone(),
                            event_type,
                            message: err.to_string(),
                        });

                        match &err {
                            UpstreamError::QuotaExceeded(_) => {
                                self.credentials
                                    .report(lease, ReportOutcome::from_upstream(&err))
                                    .await?;
                                warn!(
                                    tier = %plan.tier,
                                    key_id = %lease.key_id,
                                    "upstream quota exceeded; aborting remainder of pass"
                                );
                                outcome.quota_error = true;
                                result.aborted = true;
                                break 'channels;
                            }
                            UpstreamError::Malformed(_) => {
                                // The key did its job; the payload did not.
                                warn!(
                                    channel_id = %channel_id,
                                    error = %err,
                                    "skipping undecodable upstream response"
                                );
                            }
                            _ => {
                                self.credentials
                                    .report(lease, ReportOutcome::from_upstream(&err))
                                    .await?;
                                warn!(channel_id = %channel_id, error = %err, "channel fetch failed");
                            }
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    /// One search call, retried once on a transient failure with the same
    /// key. Quota and auth failures are never retried.
    async fn search_with_retry(
        &self,
        secret: &str,
        channel_id: &str,
        event_type: EventType,
    ) -> std::result::Result<BroadcastPage, UpstreamError> {
        match self
            .api
            .search_broadcasts(secret, channel_id, event_type, self.config.max_results)
            .await
        {
            Err(err) if err.is_transient() => {
                debug!(
                    channel_id,
                    event_type = %event_type,
                    error = %err,
                    "transient upstream failure; retrying once"
                );
                self.api
                    .search_broadcasts(secret, channel_id, event_type, self.config.max_results)
                    .await
            }
            other => other,
        }
    }

    /// Apply one batch set to the stream repository in a single write
    /// transaction.
    async fn reconcile(
        &self,
        plan: &TierPlan,
        scoped_channels: &[String],
        batches: &[ChannelBatch],
        outcome: &mut SyncOutcome,
    ) -> Result<()> {
        let now = now_ms();

        let observed: Vec<&BroadcastItem> = batches
            .iter()
            .flat_map(|batch| batch.items.iter())
            .filter(|item| plan.window.contains(reference_ms(item), now))
            .collect();
        let video_ids: Vec<String> = observed.iter().map(|i| i.video_id.clone()).collect();

        let mut tx = begin_immediate(&self.write_pool).await?;
        let mut current = StreamTxOps::statuses_by_ids(&mut tx, &video_ids).await?;

        for item in &observed {
            let prior = current.get(&item.video_id).copied();
            let effective =
                lifecycle::next_status(prior, lifecycle::status_from_content(item.content));
            let upsert = lifecycle::build_upsert(item, effective, now);
            outcome.videos_upserted += StreamTxOps::upsert_observed(&mut tx, &upsert, now).await?;

            if effective == StreamStatus::Live && prior != Some(StreamStatus::Live) {
                outcome.went_live += 1;
            }
            if effective == StreamStatus::Ended && prior != Some(StreamStatus::Ended) {
                outcome.ended += 1;
            }
            current.insert(item.video_id.clone(), effective);
        }

        // A live-scope search is the definitive answer for its channel:
        // anything still marked live that the response omitted has ended.
        for batch in batches {
            if batch.event_type != EventType::Live {
                continue;
            }
            let still_live: Vec<String> = batch
                .items
                .iter()
                .filter(|item| current.get(&item.video_id) == Some(&StreamStatus::Live))
                .map(|item| item.video_id.clone())
                .collect();
            outcome.ended +=
                StreamTxOps::mark_ended_not_in(&mut tx, &batch.channel_id, &still_live, now)
                    .await?;
        }

        let cutoff = lifecycle::missed_cutoff(now, self.config.missed_grace);
        outcome.missed += StreamTxOps::mark_missed(&mut tx, scoped_channels, cutoff, now).await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Best available timestamp for a broadcast, for window filtering.
fn reference_ms(item: &BroadcastItem) -> Option<i64> {
    item.actual_start_at
        .or(item.scheduled_start_at)
        .or(item.published_at)
        .map(datetime_to_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::youtube::BroadcastContent;

    #[test]
    fn test_reference_time_precedence() {
        let scheduled = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        let started = Utc.with_ymd_and_hms(2025, 6, 1, 18, 5, 0).unwrap();
        let published = Utc.with_ymd_and_hms(2025, 5, 28, 9, 0, 0).unwrap();

        let mut item = BroadcastItem {
            video_id: "v".to_string(),
            channel_id: "UC1".to_string(),
            title: "t".to_string(),
            content: BroadcastContent::Live,
            published_at: Some(published),
            scheduled_start_at: Some(scheduled),
            actual_start_at: Some(started),
            actual_end_at: None,
        };
        assert_eq!(reference_ms(&item), Some(datetime_to_ms(started)));

        item.actual_start_at = None;
        assert_eq!(reference_ms(&item), Some(datetime_to_ms(scheduled)));

        item.scheduled_start_at = None;
        assert_eq!(reference_ms(&item), Some(datetime_to_ms(published)));

        item.published_at = None;
        assert_eq!(reference_ms(&item), None);
    }

    #[test]
    fn test_sync_options_default_from_empty_body() {
        let options: SyncOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.force_refresh);
        assert!(!options.skip_cache);

        let options: SyncOptions = serde_json::from_str(r#"{"force_refresh":true}"#).unwrap();
        assert!(options.force_refresh);
        assert!(!options.skip_cache);
    }
}
