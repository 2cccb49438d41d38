//! HTTP implementation of the upstream API seam.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    AvatarPage, BroadcastContent, BroadcastItem, BroadcastPage, ChannelAvatar,
    ChannelListResponse, ErrorEnvelope, EventType, SearchListResponse, VideoListResponse,
};
use super::{
    CHANNELS_LIST_UNITS, MAX_CHANNELS_PER_CALL, SEARCH_CALL_UNITS, UpstreamError,
    VIDEOS_LIST_UNITS, YouTubeApi,
};

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Upstream client configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API base URL, overridable for tests against a local mock.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl UpstreamConfig {
    /// Load upstream config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `YOUTUBE_API_BASE_URL`
    /// - `YOUTUBE_API_TIMEOUT_SECS`
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("YOUTUBE_API_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(timeout) = std::env::var("YOUTUBE_API_TIMEOUT_SECS")
            && let Ok(parsed) = timeout.parse::<u64>()
        {
            config.request_timeout_secs = parsed;
        }

        config
    }
}

/// reqwest-backed [`YouTubeApi`] implementation.
pub struct HttpYouTubeApi {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpYouTubeApi {
    pub fn new(config: UpstreamConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let url = format!("{}/{}", self.config.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;
        decode(response).await
    }
}

#[async_trait::async_trait]
impl YouTubeApi for HttpYouTubeApi {
    async fn search_broadcasts(
        &self,
        secret: &str,
        channel_id: &str,
        event_type: EventType,
        max_results: u32,
    ) -> Result<BroadcastPage, UpstreamError> {
        let mut units_charged = SEARCH_CALL_UNITS;
        let max_results = max_results.to_string();

        let search: SearchListResponse = self
            .get_json(
                "search",
                &[
                    ("part", "snippet"),
                    ("channelId", channel_id),
                    ("type", "video"),
                    ("eventType", event_type.as_str()),
                    ("order", "date"),
                    ("maxResults", max_results.as_str()),
                    ("key", secret),
                ],
            )
            .await?;

        let mut items: Vec<BroadcastItem> = search
            .items
            .into_iter()
            .filter_map(|result| {
                let video_id = result.id.video_id?;
                Some(BroadcastItem {
                    video_id,
                    channel_id: result.snippet.channel_id,
                    title: result.snippet.title,
                    content: result
                        .snippet
                        .live_broadcast_content
                        .unwrap_or(BroadcastContent::None),
                    published_at: result.snippet.published_at,
                    scheduled_start_at: None,
                    actual_start_at: None,
                    actual_end_at: None,
                })
            })
            .collect();

        // Search snippets carry no schedule times; enrich through videos.list.
        if !items.is_empty() {
            let ids = items
                .iter()
                .map(|item| item.video_id.as_str())
                .collect::<Vec<_>>()
                .join(",");

            let details: VideoListResponse = self
                .get_json(
                    "videos",
                    &[
                        ("part", "liveStreamingDetails"),
                        ("id", ids.as_str()),
                        ("key", secret),
                    ],
                )
                .await?;
            units_charged += VIDEOS_LIST_UNITS;

            let by_id: HashMap<_, _> = details
                .items
                .into_iter()
                .filter_map(|video| video.live_streaming_details.map(|d| (video.id, d)))
                .collect();

            for item in &mut items {
                if let Some(d) = by_id.get(&item.video_id) {
                    item.scheduled_start_at = d.scheduled_start_time;
                    item.actual_start_at = d.actual_start_time;
                    item.actual_end_at = d.actual_end_time;
                }
            }
        }

        debug!(
            channel_id,
            event_type = %event_type,
            items = items.len(),
            units_charged,
            "broadcast search complete"
        );

        Ok(BroadcastPage {
            items,
            units_charged,
        })
    }

    async fn fetch_channel_avatars(
        &self,
        secret: &str,
        channel_ids: &[String],
    ) -> Result<AvatarPage, UpstreamError> {
        debug_assert!(channel_ids.len() <= MAX_CHANNELS_PER_CALL);

        let ids = channel_ids.join(",");
        let channels: ChannelListResponse = self
            .get_json(
                "channels",
                &[("part", "snippet"), ("id", ids.as_str()), ("key", secret)],
            )
            .await?;

        let items = channels
            .items
            .into_iter()
            .map(|channel| ChannelAvatar {
                avatar_url: channel.snippet.thumbnails.best_url(),
                channel_id: channel.id,
                title: channel.snippet.title,
            })
            .collect();

        Ok(AvatarPage {
            items,
            units_charged: CHANNELS_LIST_UNITS,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Malformed(e.without_url().to_string()));
    }

    let fallback = format!("upstream returned HTTP {status}");
    let envelope = response.json::<ErrorEnvelope>().await.ok();
    Err(classify_error(status, envelope, fallback))
}

/// Map an API error response to the error taxonomy.
///
/// The reason code wins over the HTTP status: a 403 can mean quota
/// exhaustion, a revoked key, or plain permission trouble.
fn classify_error(
    status: StatusCode,
    envelope: Option<ErrorEnvelope>,
    fallback: String,
) -> UpstreamError {
    let (message, reason) = match envelope {
        Some(env) => {
            let reason = env
                .error
                .errors
                .first()
                .map(|detail| detail.reason.clone())
                .unwrap_or_default();
            let message = if env.error.message.is_empty() {
                fallback
            } else {
                env.error.message
            };
            (message, reason)
        }
        None => (fallback, String::new()),
    };

    match reason.as_str() {
        "quotaExceeded" | "dailyLimitExceeded" => {
            return UpstreamError::QuotaExceeded(message);
        }
        "rateLimitExceeded" | "userRateLimitExceeded" => {
            return UpstreamError::Transient(message);
        }
        "keyInvalid" | "keyExpired" | "accessNotConfigured" | "forbidden" => {
            return UpstreamError::Auth(message);
        }
        _ => {}
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        UpstreamError::Transient(message)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        UpstreamError::Auth(message)
    } else {
        UpstreamError::Malformed(message)
    }
}

impl UpstreamError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        // Strip the URL so API keys never reach logs.
        let e = e.without_url();
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(reason: &str, message: &str) -> ErrorEnvelope {
        serde_json::from_str(&format!(
            r#"{{"error": {{"code": 403, "message": "{message}", "errors": [{{"reason": "{reason}"}}]}}}}"#,
        ))
        .unwrap()
    }

    #[test]
    fn test_quota_reasons_classified_as_quota() {
        for reason in ["quotaExceeded", "dailyLimitExceeded"] {
            let err = classify_error(
                StatusCode::FORBIDDEN,
                Some(envelope(reason, "quota exhausted")),
                "fallback".into(),
            );
            assert!(err.is_quota(), "{reason} should classify as quota");
        }
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let err = classify_error(
            StatusCode::FORBIDDEN,
            Some(envelope("rateLimitExceeded", "slow down")),
            "fallback".into(),
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_key_errors_are_auth() {
        let err = classify_error(
            StatusCode::BAD_REQUEST,
            Some(envelope("keyInvalid", "bad key")),
            "fallback".into(),
        );
        assert!(matches!(err, UpstreamError::Auth(_)));
    }

    #[test]
    fn test_status_fallbacks_without_reason() {
        assert!(
            classify_error(StatusCode::INTERNAL_SERVER_ERROR, None, "boom".into()).is_transient()
        );
        assert!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, None, "busy".into()).is_transient()
        );
        assert!(matches!(
            classify_error(StatusCode::FORBIDDEN, None, "denied".into()),
            UpstreamError::Auth(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, None, "gone".into()),
            UpstreamError::Malformed(_)
        ));
    }

    #[test]
    fn test_upstream_config_default() {
        let config = UpstreamConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }
}
