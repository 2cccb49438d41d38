//! Tier scheduler: single-flight and debounce guards per sync tier.
//!
//! Guard state is process-local and deliberately not persisted; a restart
//! just allows an immediate re-run. Duplicate runs across processes are
//! harmless because the executor's writes are idempotent upserts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Result;
use crate::sync::{SyncExecutor, SyncOptions, SyncOutcome, SyncTier};

/// Why a trigger did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A pass for this tier is already in flight.
    InProgress,
    /// The tier ran more recently than its minimum interval.
    Debounced { remaining_secs: u64 },
}

/// Result of one trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    Ran(SyncOutcome),
    Skipped(SkipReason),
}

/// Point-in-time view of one tier's guard, for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TierStatus {
    pub tier: SyncTier,
    pub in_progress: bool,
    pub seconds_since_last_run: Option<u64>,
    pub min_interval_secs: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct TierState {
    last_run_at: Option<Instant>,
    in_progress: bool,
}

pub struct TierScheduler {
    executor: Arc<SyncExecutor>,
    states: Mutex<HashMap<SyncTier, TierState>>,
}

impl TierScheduler {
    pub fn new(executor: Arc<SyncExecutor>) -> Self {
        Self {
            executor,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Trigger one tier pass.
    ///
    /// Returns [`TriggerOutcome::Skipped`] without touching the executor
    /// when a pass is already in flight or the tier ran too recently.
    /// `force_refresh` bypasses the response cache, not these guards.
    pub async fn trigger(&self, tier: SyncTier, options: SyncOptions) -> Result<TriggerOutcome> {
        let min_interval = self.executor.config().min_interval(tier);

        {
            let mut states = self.states.lock();
            let state = states.entry(tier).or_default();

            if state.in_progress {
                debug!(tier = %tier, "trigger skipped; pass already in flight");
                return Ok(TriggerOutcome::Skipped(SkipReason::InProgress));
            }
            if let Some(last) = state.last_run_at {
                let elapsed = last.elapsed();
                if elapsed < min_interval {
                    let remaining_secs = (min_interval - elapsed).as_secs();
                    debug!(tier = %tier, remaining_secs, "trigger debounced");
                    return Ok(TriggerOutcome::Skipped(SkipReason::Debounced {
                        remaining_secs,
                    }));
                }
            }

            state.in_progress = true;
            state.last_run_at = Some(Instant::now());
        }

        // The guard clears in_progress however the pass ends.
        let _guard = RunGuard {
            scheduler: self,
            tier,
        };
        let outcome = self.executor.run(tier, options).await?;
        Ok(TriggerOutcome::Ran(outcome))
    }

    /// Guard state for every tier.
    pub fn status(&self) -> Vec<TierStatus> {
        let states = self.states.lock();
        SyncTier::ALL
            .iter()
            .map(|&tier| {
                let state = states.get(&tier).copied().unwrap_or_default();
                TierStatus {
                    tier,
                    in_progress: state.in_progress,
                    seconds_since_last_run: state.last_run_at.map(|t| t.elapsed().as_secs()),
                    min_interval_secs: self.executor.config().min_interval(tier).as_secs(),
                }
            })
            .collect()
    }

    fn end_run(&self, tier: SyncTier) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(&tier) {
            state.in_progress = false;
        }
    }

    /// Spawn one background tick loop per tier.
    ///
    /// Ticks fire more often than the debounce allows runs, so most ticks
    /// skip; the first tick after an interval elapses is what actually
    /// syncs. The first tick of each loop fires immediately, giving a
    /// sync-on-startup pass.
    pub fn start_background_ticks(self: &Arc<Self>, cancellation_token: CancellationToken) {
        for tier in SyncTier::ALL {
            let scheduler = self.clone();
            let token = cancellation_token.clone();
            let period = self.executor.config().tick_period(tier);

            tokio::spawn(async move {
                let mut tick = interval(period);
                info!(
                    tier = %tier,
                    period_secs = period.as_secs(),
                    "sync tick loop started"
                );

                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!(tier = %tier, "sync tick loop shutting down");
                            break;
                        }
                        _ = tick.tick() => {
                            match scheduler.trigger(tier, SyncOptions::default()).await {
                                Ok(TriggerOutcome::Ran(outcome)) => {
                                    debug!(
                                        tier = %tier,
                                        upserted = outcome.videos_upserted,
                                        units = outcome.units_charged,
                                        "scheduled pass completed"
                                    );
                                }
                                Ok(TriggerOutcome::Skipped(_)) => {}
                                Err(e) => {
                                    error!(tier = %tier, "scheduled pass failed: {}", e);
                                }
                            }
                        }
                    }
                }
            });
        }
    }
}

struct RunGuard<'a> {
    scheduler: &'a TierScheduler,
    tier: SyncTier,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.end_run(self.tier);
    }
}
