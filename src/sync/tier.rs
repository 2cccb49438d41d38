//! Sync tiers: per-tier channel scope, event filters, windows, and cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::database::time::utc_day_start_ms;
use crate::youtube::{EventType, SEARCH_CALL_UNITS, VIDEOS_LIST_UNITS};

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 86_400_000;

pub const DEFAULT_ACTIVE_TTL_SECS: u64 = 120;
pub const DEFAULT_TODAY_TTL_SECS: u64 = 600;
pub const DEFAULT_FULL_TTL_SECS: u64 = 3_600;

pub const DEFAULT_ACTIVE_MIN_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TODAY_MIN_INTERVAL_SECS: u64 = 1_800;
pub const DEFAULT_FULL_MIN_INTERVAL_SECS: u64 = 21_600;

/// Timer cadences. Ticks fire more often than the debounce allows runs; the
/// scheduler's debounce is what sets the effective rate, the tick only
/// bounds how stale a tier can get after a gap.
pub const DEFAULT_ACTIVE_TICK_SECS: u64 = 60;
pub const DEFAULT_TODAY_TICK_SECS: u64 = 300;
pub const DEFAULT_FULL_TICK_SECS: u64 = 900;

pub const DEFAULT_MISSED_GRACE_HOURS: i64 = 6;
pub const DEFAULT_LOOK_BACK_HOURS: i64 = 72;
pub const DEFAULT_LOOK_AHEAD_HOURS: i64 = 72;
pub const DEFAULT_ACTIVE_HORIZON_MINUTES: i64 = 120;
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// Refresh tier. Tighter tiers poll smaller scopes more often.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncTier {
    /// Channels with a live or imminent stream; catches live/ended promptly.
    Active,
    /// All enabled channels, scoped to streams scheduled this UTC day.
    Today,
    /// All enabled channels, the wide discovery and backfill sweep.
    Full,
}

impl SyncTier {
    pub const ALL: [SyncTier; 3] = [SyncTier::Active, SyncTier::Today, SyncTier::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTier::Active => "active",
            SyncTier::Today => "today",
            SyncTier::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

/// Which channels a tier covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelScope {
    /// Every enabled channel in the roster.
    AllEnabled,
    /// Only channels with a live stream or one scheduled inside the active
    /// horizon.
    CurrentStreams,
}

/// Time window a tier's observations are filtered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    Unbounded,
    UtcDay,
    Relative { back_hours: i64, ahead_hours: i64 },
}

impl WindowSpec {
    /// Label for the cache signature. Distinct windows must never share a
    /// signature.
    pub fn cache_label(&self) -> String {
        match self {
            WindowSpec::Unbounded => "none".to_string(),
            WindowSpec::UtcDay => "utc-day".to_string(),
            WindowSpec::Relative {
                back_hours,
                ahead_hours,
            } => format!("back{back_hours}h-ahead{ahead_hours}h"),
        }
    }

    /// Whether a broadcast whose reference time is `reference_ms` falls in
    /// the window. Items without a reference time are kept.
    pub fn contains(&self, reference_ms: Option<i64>, now_ms: i64) -> bool {
        let Some(reference) = reference_ms else {
            return true;
        };
        match self {
            WindowSpec::Unbounded => true,
            WindowSpec::UtcDay => {
                let day_start = utc_day_start_ms(now_ms);
                reference >= day_start && reference < day_start + MS_PER_DAY
            }
            WindowSpec::Relative {
                back_hours,
                ahead_hours,
            } => {
                reference >= now_ms - back_hours * MS_PER_HOUR
                    && reference <= now_ms + ahead_hours * MS_PER_HOUR
            }
        }
    }
}

/// The concrete call plan for one tier run.
#[derive(Debug, Clone)]
pub struct TierPlan {
    pub tier: SyncTier,
    pub scope: ChannelScope,
    pub event_types: &'static [EventType],
    pub window: WindowSpec,
}

impl TierPlan {
    /// Worst-case quota units for a run over `channel_count` channels: one
    /// search plus one detail lookup per channel per event filter. Actual
    /// spend is reconciled against the pool after the run.
    pub fn estimated_units(&self, channel_count: usize) -> i64 {
        let per_call = SEARCH_CALL_UNITS + VIDEOS_LIST_UNITS;
        channel_count as i64 * self.event_types.len() as i64 * per_call
    }
}

/// Tunables for the sync tiers. Every value has a sane default and an
/// environment override.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub active_ttl: Duration,
    pub today_ttl: Duration,
    pub full_ttl: Duration,
    pub active_min_interval: Duration,
    pub today_min_interval: Duration,
    pub full_min_interval: Duration,
    pub active_tick: Duration,
    pub today_tick: Duration,
    pub full_tick: Duration,
    /// Upcoming streams starting within this horizon count as "current" for
    /// the active tier's channel scope.
    pub active_horizon: Duration,
    /// How long past its scheduled start an upcoming stream may sit before
    /// it is marked missed.
    pub missed_grace: Duration,
    pub look_back_hours: i64,
    pub look_ahead_hours: i64,
    /// Max results requested per search call.
    pub max_results: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_ttl: Duration::from_secs(DEFAULT_ACTIVE_TTL_SECS),
            today_ttl: Duration::from_secs(DEFAULT_TODAY_TTL_SECS),
            full_ttl: Duration::from_secs(DEFAULT_FULL_TTL_SECS),
            active_min_interval: Duration::from_secs(DEFAULT_ACTIVE_MIN_INTERVAL_SECS),
            today_min_interval: Duration::from_secs(DEFAULT_TODAY_MIN_INTERVAL_SECS),
            full_min_interval: Duration::from_secs(DEFAULT_FULL_MIN_INTERVAL_SECS),
            active_tick: Duration::from_secs(DEFAULT_ACTIVE_TICK_SECS),
            today_tick: Duration::from_secs(DEFAULT_TODAY_TICK_SECS),
            full_tick: Duration::from_secs(DEFAULT_FULL_TICK_SECS),
            active_horizon: Duration::from_secs(DEFAULT_ACTIVE_HORIZON_MINUTES as u64 * 60),
            missed_grace: Duration::from_secs(DEFAULT_MISSED_GRACE_HOURS as u64 * 3600),
            look_back_hours: DEFAULT_LOOK_BACK_HOURS,
            look_ahead_hours: DEFAULT_LOOK_AHEAD_HOURS,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl SyncConfig {
    /// Load sync config from environment variables, falling back to
    /// defaults.
    ///
    /// Durations are seconds: `SYNC_{ACTIVE,TODAY,FULL}_TTL_SECS`,
    /// `SYNC_{ACTIVE,TODAY,FULL}_MIN_INTERVAL_SECS`,
    /// `SYNC_{ACTIVE,TODAY,FULL}_TICK_SECS`. Windows:
    /// `SYNC_ACTIVE_HORIZON_MINUTES`, `SYNC_MISSED_GRACE_HOURS`,
    /// `SYNC_LOOK_BACK_HOURS`, `SYNC_LOOK_AHEAD_HOURS`, `SYNC_MAX_RESULTS`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_secs("SYNC_ACTIVE_TTL_SECS") {
            config.active_ttl = secs;
        }
        if let Some(secs) = env_secs("SYNC_TODAY_TTL_SECS") {
            config.today_ttl = secs;
        }
        if let Some(secs) = env_secs("SYNC_FULL_TTL_SECS") {
            config.full_ttl = secs;
        }
        if let Some(secs) = env_secs("SYNC_ACTIVE_MIN_INTERVAL_SECS") {
            config.active_min_interval = secs;
        }
        if let Some(secs) = env_secs("SYNC_TODAY_MIN_INTERVAL_SECS") {
            config.today_min_interval = secs;
        }
        if let Some(secs) = env_secs("SYNC_FULL_MIN_INTERVAL_SECS") {
            config.full_min_interval = secs;
        }
        if let Some(secs) = env_secs("SYNC_ACTIVE_TICK_SECS") {
            config.active_tick = secs;
        }
        if let Some(secs) = env_secs("SYNC_TODAY_TICK_SECS") {
            config.today_tick = secs;
        }
        if let Some(secs) = env_secs("SYNC_FULL_TICK_SECS") {
            config.full_tick = secs;
        }
        if let Some(minutes) = env_i64("SYNC_ACTIVE_HORIZON_MINUTES") {
            config.active_horizon = Duration::from_secs(minutes as u64 * 60);
        }
        if let Some(hours) = env_i64("SYNC_MISSED_GRACE_HOURS") {
            config.missed_grace = Duration::from_secs(hours as u64 * 3600);
        }
        if let Some(hours) = env_i64("SYNC_LOOK_BACK_HOURS") {
            config.look_back_hours = hours;
        }
        if let Some(hours) = env_i64("SYNC_LOOK_AHEAD_HOURS") {
            config.look_ahead_hours = hours;
        }
        if let Some(max) = env_i64("SYNC_MAX_RESULTS") {
            config.max_results = max.min(50) as u32;
        }

        config
    }

    pub fn ttl_for(&self, tier: SyncTier) -> Duration {
        match tier {
            SyncTier::Active => self.active_ttl,
            SyncTier::Today => self.today_ttl,
            SyncTier::Full => self.full_ttl,
        }
    }

    pub fn min_interval(&self, tier: SyncTier) -> Duration {
        match tier {
            SyncTier::Active => self.active_min_interval,
            SyncTier::Today => self.today_min_interval,
            SyncTier::Full => self.full_min_interval,
        }
    }

    pub fn tick_period(&self, tier: SyncTier) -> Duration {
        match tier {
            SyncTier::Active => self.active_tick,
            SyncTier::Today => self.today_tick,
            SyncTier::Full => self.full_tick,
        }
    }

    /// The call plan for one tier run.
    pub fn plan_for(&self, tier: SyncTier) -> TierPlan {
        match tier {
            SyncTier::Active => TierPlan {
                tier,
                scope: ChannelScope::CurrentStreams,
                event_types: &[EventType::Live],
                window: WindowSpec::Unbounded,
            },
            SyncTier::Today => TierPlan {
                tier,
                scope: ChannelScope::AllEnabled,
                event_types: &[EventType::Upcoming],
                window: WindowSpec::UtcDay,
            },
            SyncTier::Full => TierPlan {
                tier,
                scope: ChannelScope::AllEnabled,
                event_types: &[EventType::Upcoming, EventType::Completed],
                window: WindowSpec::Relative {
                    back_hours: self.look_back_hours,
                    ahead_hours: self.look_ahead_hours,
                },
            },
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key)
        .ok()?
        .parse::<i64>()
        .ok()
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_string_roundtrip() {
        for tier in SyncTier::ALL {
            assert_eq!(SyncTier::parse(tier.as_str()), Some(tier));
            assert_eq!(tier.to_string(), tier.as_str());
        }
        assert_eq!(SyncTier::parse("hourly"), None);
    }

    #[test]
    fn test_window_utc_day_bounds() {
        // 2023-11-14 22:13:20 UTC.
        let now = 1_700_000_000_000;
        let day_start = utc_day_start_ms(now);
        let window = WindowSpec::UtcDay;

        assert!(window.contains(Some(day_start), now));
        assert!(window.contains(Some(day_start + MS_PER_DAY - 1), now));
        assert!(!window.contains(Some(day_start - 1), now));
        assert!(!window.contains(Some(day_start + MS_PER_DAY), now));
    }

    #[test]
    fn test_window_relative_bounds() {
        let now = 1_700_000_000_000;
        let window = WindowSpec::Relative {
            back_hours: 72,
            ahead_hours: 72,
        };

        assert!(window.contains(Some(now - 72 * MS_PER_HOUR), now));
        assert!(window.contains(Some(now + 72 * MS_PER_HOUR), now));
        assert!(!window.contains(Some(now - 73 * MS_PER_HOUR), now));
        assert!(!window.contains(Some(now + 73 * MS_PER_HOUR), now));
    }

    #[test]
    fn test_window_keeps_undated_items() {
        let now = 1_700_000_000_000;
        assert!(WindowSpec::UtcDay.contains(None, now));
        assert!(
            WindowSpec::Relative {
                back_hours: 1,
                ahead_hours: 1
            }
            .contains(None, now)
        );
    }

    #[test]
    fn test_plans_cover_expected_events() {
        let config = SyncConfig::default();

        let active = config.plan_for(SyncTier::Active);
        assert_eq!(active.scope, ChannelScope::CurrentStreams);
        assert_eq!(active.event_types, &[EventType::Live]);
        assert_eq!(active.window, WindowSpec::Unbounded);

        let today = config.plan_for(SyncTier::Today);
        assert_eq!(today.scope, ChannelScope::AllEnabled);
        assert_eq!(today.event_types, &[EventType::Upcoming]);

        let full = config.plan_for(SyncTier::Full);
        assert_eq!(
            full.event_types,
            &[EventType::Upcoming, EventType::Completed]
        );
        assert_eq!(
            full.window,
            WindowSpec::Relative {
                back_hours: 72,
                ahead_hours: 72
            }
        );
    }

    #[test]
    fn test_estimated_units() {
        let config = SyncConfig::default();
        // Two event filters, three channels, 101 units per call.
        let full = config.plan_for(SyncTier::Full);
        assert_eq!(full.estimated_units(3), 606);
        // Empty scope costs nothing.
        assert_eq!(full.estimated_units(0), 0);
    }

    #[test]
    fn test_ttl_and_interval_per_tier() {
        let config = SyncConfig::default();
        assert_eq!(config.ttl_for(SyncTier::Active), Duration::from_secs(120));
        assert_eq!(config.ttl_for(SyncTier::Full), Duration::from_secs(3_600));
        assert!(config.min_interval(SyncTier::Active) < config.min_interval(SyncTier::Today));
        assert!(config.tick_period(SyncTier::Active) <= config.min_interval(SyncTier::Active));
    }

    #[test]
    fn test_cache_labels_distinct() {
        let labels = [
            WindowSpec::Unbounded.cache_label(),
            WindowSpec::UtcDay.cache_label(),
            WindowSpec::Relative {
                back_hours: 72,
                ahead_hours: 72,
            }
            .cache_label(),
            WindowSpec::Relative {
                back_hours: 24,
                ahead_hours: 72,
            }
            .cache_label(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in labels.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
