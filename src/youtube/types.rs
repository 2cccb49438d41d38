//! Wire types for the YouTube Data API v3 and the domain-facing results
//! built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broadcast search classes accepted by `search.list`'s `eventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Live,
    Upcoming,
    Completed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Upcoming => "upcoming",
            Self::Completed => "completed",
        }
    }
}

/// The `liveBroadcastContent` flag on a video snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastContent {
    Live,
    Upcoming,
    /// Not currently a live broadcast: finished streams and plain uploads.
    None,
}

/// One broadcast observed upstream, already merged from the search snippet
/// and the `liveStreamingDetails` enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastItem {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub content: BroadcastContent,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_start_at: Option<DateTime<Utc>>,
    pub actual_start_at: Option<DateTime<Utc>>,
    pub actual_end_at: Option<DateTime<Utc>>,
}

/// Result of one logical broadcast search against a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastPage {
    pub items: Vec<BroadcastItem>,
    /// Quota units actually spent, including the details enrichment.
    pub units_charged: i64,
}

/// One channel's avatar as returned by `channels.list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAvatar {
    pub channel_id: String,
    pub title: String,
    pub avatar_url: Option<String>,
}

/// Result of one `channels.list` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarPage {
    pub items: Vec<ChannelAvatar>,
    pub units_charged: i64,
}

// ---- raw API response shapes ----

#[derive(Debug, Deserialize)]
pub(crate) struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResult {
    pub id: SearchResultId,
    pub snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResultId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchSnippet {
    pub channel_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub live_broadcast_content: Option<BroadcastContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoResult {
    pub id: String,
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LiveStreamingDetails {
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<ChannelResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelResult {
    pub id: String,
    pub snippet: ChannelSnippet,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelSnippet {
    pub title: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Thumbnails {
    pub high: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnail {
    pub url: String,
}

impl Thumbnails {
    /// Best available resolution, highest first.
    pub fn best_url(&self) -> Option<String> {
        self.high
            .as_ref()
            .or(self.medium.as_ref())
            .or(self.default.as_ref())
            .map(|t| t.url.clone())
    }
}

/// Error envelope the API wraps failures in.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub reason: String,
}
