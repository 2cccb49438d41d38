//! Upstream YouTube Data API access.
//!
//! The [`YouTubeApi`] trait is the seam between the sync layer and the wire:
//! the production implementation is [`HttpYouTubeApi`], tests substitute a
//! scripted double.

pub mod client;
pub mod types;

pub use client::{HttpYouTubeApi, UpstreamConfig};
pub use types::{
    AvatarPage, BroadcastContent, BroadcastItem, BroadcastPage, ChannelAvatar, EventType,
};

use async_trait::async_trait;
use thiserror::Error;

/// Quota units charged for one `search.list` call.
pub const SEARCH_CALL_UNITS: i64 = 100;

/// Quota units charged for one `videos.list` call.
pub const VIDEOS_LIST_UNITS: i64 = 1;

/// Quota units charged for one `channels.list` call.
pub const CHANNELS_LIST_UNITS: i64 = 1;

/// `channels.list` accepts at most this many ids per call.
pub const MAX_CHANNELS_PER_CALL: usize = 50;

/// Upstream failure classes, used to decide retry and key handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The key's daily quota is spent. Not retryable until the reset.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The key itself was rejected.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Timeouts, connection trouble, 5xx, rate limiting. Worth one retry.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The response could not be understood.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Upstream API operations the sync layer depends on.
#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// One logical broadcast search against a channel: `search.list` plus the
    /// `videos.list` schedule enrichment when any items came back.
    async fn search_broadcasts(
        &self,
        secret: &str,
        channel_id: &str,
        event_type: EventType,
        max_results: u32,
    ) -> Result<BroadcastPage, UpstreamError>;

    /// Avatars for up to [`MAX_CHANNELS_PER_CALL`] channels in one call.
    async fn fetch_channel_avatars(
        &self,
        secret: &str,
        channel_ids: &[String],
    ) -> Result<AvatarPage, UpstreamError>;
}
