//! Live stream (broadcast) database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A broadcast record, keyed by the upstream video id.
///
/// Rows are only ever inserted or moved forward through the status machine;
/// the sync path never deletes them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LiveStreamDbModel {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    /// Lifecycle status (upcoming, live, ended, missed).
    pub status: String,
    /// Unix epoch milliseconds (UTC) of the announced start, if any.
    pub scheduled_start_at: Option<i64>,
    pub actual_start_at: Option<i64>,
    pub actual_end_at: Option<i64>,
    /// When the sync layer last observed this broadcast upstream.
    pub fetched_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Broadcast lifecycle states.
///
/// Transitions are monotonic: `upcoming < live < ended`, with `missed`
/// absorbing from `upcoming` only. `ended` and `missed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Announced but not started.
    Upcoming,
    /// On air right now.
    Live,
    /// Finished broadcasting.
    Ended,
    /// Scheduled start passed the grace window without the stream going live.
    Missed,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Ended => "ended",
            Self::Missed => "missed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(Self::Upcoming),
            "live" => Some(Self::Live),
            "ended" => Some(Self::Ended),
            "missed" => Some(Self::Missed),
            _ => None,
        }
    }

    /// Position in the lifecycle order. `Ended` and `Missed` share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Upcoming => 0,
            Self::Live => 1,
            Self::Ended | Self::Missed => 2,
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Missed)
    }

    /// Check if this status allows transitioning to another status.
    ///
    /// Re-asserting the current status is always allowed (idempotent syncs).
    pub fn can_transition_to(&self, target: StreamStatus) -> bool {
        use StreamStatus::*;
        match (self, target) {
            (from, to) if *from == to => true,
            // A broadcast can skip straight to ended when only the completed
            // backfill ever observes it.
            (Upcoming, Live | Ended | Missed) => true,
            (Live, Ended) => true,
            _ => false,
        }
    }
}
