//! Pure lifecycle rules for observed broadcasts.
//!
//! Everything here is side-effect free; the executor feeds observations
//! through these functions and hands the results to the transactional
//! repository layer, which enforces the same monotonic rules in SQL against
//! concurrent writers.

use std::time::Duration;

use crate::database::models::StreamStatus;
use crate::database::repositories::StreamUpsert;
use crate::database::time::datetime_to_ms;
use crate::youtube::{BroadcastContent, BroadcastItem};

/// Map upstream broadcast content to a stream status.
///
/// An item with no live broadcast content is a finished broadcast: the API
/// stops flagging a video once its stream ends.
pub fn status_from_content(content: BroadcastContent) -> StreamStatus {
    match content {
        BroadcastContent::Live => StreamStatus::Live,
        BroadcastContent::Upcoming => StreamStatus::Upcoming,
        BroadcastContent::None => StreamStatus::Ended,
    }
}

/// Resolve an observation against the stored status.
///
/// Terminal states stick, and a live stream never falls back to upcoming on
/// a stale search result.
pub fn next_status(prior: Option<StreamStatus>, observed: StreamStatus) -> StreamStatus {
    match prior {
        Some(prior) if !prior.can_transition_to(observed) => prior,
        _ => observed,
    }
}

/// Build the row to upsert for one observed broadcast.
///
/// Missing timestamps fall back to the observation time: a stream first seen
/// live started "now" as far as we can tell, and one first seen ended
/// finished "now". Stored values win over these fallbacks at write time.
pub fn build_upsert(item: &BroadcastItem, status: StreamStatus, now_ms: i64) -> StreamUpsert {
    let mut actual_start_at = item.actual_start_at.map(datetime_to_ms);
    if actual_start_at.is_none() && status == StreamStatus::Live {
        actual_start_at = Some(now_ms);
    }

    let mut actual_end_at = item.actual_end_at.map(datetime_to_ms);
    if actual_end_at.is_none() && status == StreamStatus::Ended {
        actual_end_at = Some(now_ms);
    }

    StreamUpsert {
        video_id: item.video_id.clone(),
        channel_id: item.channel_id.clone(),
        title: item.title.clone(),
        status,
        scheduled_start_at: item.scheduled_start_at.map(datetime_to_ms),
        actual_start_at,
        actual_end_at,
    }
}

/// Scheduled-start cutoff before which an upcoming stream that never went
/// live counts as missed.
pub fn missed_cutoff(now_ms: i64, grace: Duration) -> i64 {
    now_ms - grace.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(content: BroadcastContent) -> BroadcastItem {
        BroadcastItem {
            video_id: "vid1".to_string(),
            channel_id: "UC1".to_string(),
            title: "stream".to_string(),
            content,
            published_at: None,
            scheduled_start_at: None,
            actual_start_at: None,
            actual_end_at: None,
        }
    }

    #[test]
    fn test_status_from_content() {
        assert_eq!(
            status_from_content(BroadcastContent::Live),
            StreamStatus::Live
        );
        assert_eq!(
            status_from_content(BroadcastContent::Upcoming),
            StreamStatus::Upcoming
        );
        assert_eq!(
            status_from_content(BroadcastContent::None),
            StreamStatus::Ended
        );
    }

    #[test]
    fn test_next_status_follows_lifecycle() {
        let cases = [
            (None, StreamStatus::Live, StreamStatus::Live),
            (
                Some(StreamStatus::Upcoming),
                StreamStatus::Live,
                StreamStatus::Live,
            ),
            (
                Some(StreamStatus::Upcoming),
                StreamStatus::Ended,
                StreamStatus::Ended,
            ),
            // Stale search snapshot cannot demote a live stream.
            (
                Some(StreamStatus::Live),
                StreamStatus::Upcoming,
                StreamStatus::Live,
            ),
            // Terminal states never move.
            (
                Some(StreamStatus::Ended),
                StreamStatus::Live,
                StreamStatus::Ended,
            ),
            (
                Some(StreamStatus::Missed),
                StreamStatus::Upcoming,
                StreamStatus::Missed,
            ),
            // Missed is reserved for streams that never started.
            (
                Some(StreamStatus::Live),
                StreamStatus::Missed,
                StreamStatus::Live,
            ),
        ];
        for (prior, observed, expected) in cases {
            assert_eq!(
                next_status(prior, observed),
                expected,
                "prior={prior:?} observed={observed:?}"
            );
        }
    }

    #[test]
    fn test_build_upsert_defaults_start_for_live() {
        let now = 1_700_000_000_000;
        let upsert = build_upsert(&item(BroadcastContent::Live), StreamStatus::Live, now);
        assert_eq!(upsert.actual_start_at, Some(now));
        assert_eq!(upsert.actual_end_at, None);
    }

    #[test]
    fn test_build_upsert_prefers_upstream_times() {
        let started = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        let mut observed = item(BroadcastContent::Live);
        observed.actual_start_at = Some(started);

        let upsert = build_upsert(&observed, StreamStatus::Live, 1_700_000_000_000);
        assert_eq!(upsert.actual_start_at, Some(datetime_to_ms(started)));
    }

    #[test]
    fn test_build_upsert_defaults_end_for_ended() {
        let now = 1_700_000_000_000;
        let upsert = build_upsert(&item(BroadcastContent::None), StreamStatus::Ended, now);
        assert_eq!(upsert.actual_end_at, Some(now));
        assert_eq!(upsert.actual_start_at, None);
    }

    #[test]
    fn test_build_upsert_upcoming_has_no_time_fallbacks() {
        let scheduled = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let mut observed = item(BroadcastContent::Upcoming);
        observed.scheduled_start_at = Some(scheduled);

        let upsert = build_upsert(&observed, StreamStatus::Upcoming, 1_700_000_000_000);
        assert_eq!(upsert.scheduled_start_at, Some(datetime_to_ms(scheduled)));
        assert_eq!(upsert.actual_start_at, None);
        assert_eq!(upsert.actual_end_at, None);
    }

    #[test]
    fn test_missed_cutoff() {
        let now = 10 * 3_600_000;
        assert_eq!(
            missed_cutoff(now, Duration::from_secs(6 * 3600)),
            4 * 3_600_000
        );
    }
}
