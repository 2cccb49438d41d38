//! Response cache for upstream fetches.
//!
//! Thread-safe TTL cache keyed by a normalized request signature, so two
//! syncs asking the upstream the same question within the TTL share one
//! answer. An expired entry is a miss and is dropped on observation.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::youtube::{BroadcastItem, EventType};

/// Normalized identity of an upstream fetch.
///
/// Channel ids are sorted and deduplicated, event types sorted, and the time
/// window is a relative label rather than absolute instants. Two requests
/// for the same thing therefore normalize to the same signature no matter
/// the channel ordering or the moment they were issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheSignature {
    endpoint: String,
    channel_ids: Vec<String>,
    event_types: Vec<String>,
    window: String,
}

impl CacheSignature {
    pub fn new(
        endpoint: impl Into<String>,
        channel_ids: &[String],
        event_types: &[EventType],
        window: impl Into<String>,
    ) -> Self {
        let mut channel_ids: Vec<String> = channel_ids.to_vec();
        channel_ids.sort();
        channel_ids.dedup();

        let mut event_types: Vec<String> = event_types
            .iter()
            .map(|e| e.as_str().to_string())
            .collect();
        event_types.sort();
        event_types.dedup();

        Self {
            endpoint: endpoint.into(),
            channel_ids,
            event_types,
            window: window.into(),
        }
    }
}

/// What one signature's response contains: the items fetched per channel and
/// event type. Kept per channel so the reconcile step knows which channels
/// got a definitive answer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelBatch {
    pub channel_id: String,
    pub event_type: EventType,
    pub items: Vec<BroadcastItem>,
}

/// Shared handle to a cached response.
pub type CachedBatches = Arc<Vec<ChannelBatch>>;

/// A cached response with its expiration time.
#[derive(Clone)]
struct CacheEntry {
    payload: CachedBatches,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(payload: CachedBatches, ttl: Duration) -> Self {
        Self {
            payload,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe TTL cache for upstream responses.
#[derive(Clone, Default)]
pub struct ResponseCache {
    entries: Arc<DashMap<CacheSignature, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a response. Expired entries count as misses and are removed.
    pub fn get(&self, signature: &CacheSignature) -> Option<CachedBatches> {
        let entry = self.entries.get(signature)?;

        if entry.is_expired() {
            drop(entry); // Release the lock before removing
            self.entries.remove(signature);
            return None;
        }

        Some(entry.payload.clone())
    }

    /// Insert a response, overwriting any previous entry for the signature.
    pub fn put(&self, signature: CacheSignature, batches: Vec<ChannelBatch>, ttl: Duration) {
        self.entries
            .insert(signature, CacheEntry::new(Arc::new(batches), ttl));
    }

    /// Remove all expired entries. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let before = self.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.len()
    }

    /// Number of cached entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the background sweep task.
    ///
    /// Expired entries already read as misses; the sweep just returns their
    /// memory on a timer.
    pub fn start_sweep_task(&self, cancellation_token: CancellationToken, period: Duration) {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut sweep_interval = interval(period);

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    _ = sweep_interval.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, "cache sweep dropped expired entries");
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
    use crate::youtube::BroadcastContent;

    fn signature(ids: &[&str]) -> CacheSignature {
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        CacheSignature::new("search", &ids, &[EventType::Live], "none")
    }

    fn batch(channel_id: &str) -> ChannelBatch {
        ChannelBatch {
            channel_id: channel_id.to_string(),
            event_type: EventType::Live,
            items: vec![BroadcastItem {
                video_id: "v1".to_string(),
                channel_id: channel_id.to_string(),
                title: "stream".to_string(),
                content: BroadcastContent::Live,
                published_at: None,
                scheduled_start_at: None,
                actual_start_at: None,
                actual_end_at: None,
            }],
        }
    }

    #[test]
    fn test_put_and_get() {
        let cache = ResponseCache::new();
        cache.put(
            signature(&["UC1"]),
            vec![batch("UC1")],
            Duration::from_secs(60),
        );

        let hit = cache.get(&signature(&["UC1"])).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].channel_id, "UC1");
    }

    #[test]
    fn test_miss() {
        let cache = ResponseCache::new();
        assert!(cache.get(&signature(&["UC1"])).is_none());
    }

    #[test]
    fn test_signature_normalizes_channel_order() {
        let a = signature(&["UC2", "UC1", "UC2"]);
        let b = signature(&["UC1", "UC2"]);
        assert_eq!(a, b);

        let cache = ResponseCache::new();
        cache.put(a, vec![batch("UC1")], Duration::from_secs(60));
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn test_signature_distinguishes_window_and_events() {
        let live = CacheSignature::new(
            "search",
            &["UC1".to_string()],
            &[EventType::Live],
            "none",
        );
        let upcoming = CacheSignature::new(
            "search",
            &["UC1".to_string()],
            &[EventType::Upcoming],
            "utc-day",
        );
        assert_ne!(live, upcoming);
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = ResponseCache::new();
        cache.put(
            signature(&["UC1"]),
            vec![batch("UC1")],
            Duration::from_millis(10),
        );

        // Should be present immediately
        assert!(cache.get(&signature(&["UC1"])).is_some());

        // Wait for expiration
        std::thread::sleep(Duration::from_millis(20));

        // Should be expired now, and removed on observation
        assert!(cache.get(&signature(&["UC1"])).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_removes_expired() {
        let cache = ResponseCache::new();
        cache.put(
            signature(&["UC1"]),
            vec![batch("UC1")],
            Duration::from_millis(10),
        );
        cache.put(
            signature(&["UC2"]),
            vec![batch("UC2")],
            Duration::from_secs(60),
        );

        std::thread::sleep(Duration::from_millis(20));

        let removed = cache.sweep();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&signature(&["UC2"])).is_some());
    }
}
