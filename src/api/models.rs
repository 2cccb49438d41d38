//! API request and response models (DTOs).
//!
//! All timestamps are Unix epoch milliseconds (UTC), matching the storage
//! layer.

use serde::{Deserialize, Serialize};

use crate::scheduler::{SkipReason, TierStatus};
use crate::sync::SyncOutcome;

// ============================================================================
// API keys
// ============================================================================

/// Create a pooled API key.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    /// The credential. Returned masked from every endpoint afterwards.
    pub secret: String,
}

/// An API key with its quota and error state, secret masked.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub masked_secret: String,
    pub status: String,
    pub quota_used_today: i64,
    pub total_requests: i64,
    pub consecutive_errors: i64,
    pub last_error: Option<String>,
    pub last_used_at: Option<i64>,
    pub last_quota_reset_at: i64,
    pub quota_exceeded_at: Option<i64>,
    pub created_at: i64,
}

/// Enable or disable a key or channel.
#[derive(Debug, Clone, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

/// Result of the operator quota reset.
#[derive(Debug, Clone, Serialize)]
pub struct ResetQuotaResponse {
    pub keys_reset: u64,
}

// ============================================================================
// Channels
// ============================================================================

/// Add a channel to the sync roster.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannelRequest {
    /// Upstream channel id (`UC...`).
    pub id: String,
    pub title: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelResponse {
    pub id: String,
    pub title: String,
    pub avatar_url: Option<String>,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

// ============================================================================
// Streams
// ============================================================================

/// Filters for the stream listing. All optional and AND-ed together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFilterParams {
    /// Lifecycle status (upcoming, live, ended, missed).
    pub status: Option<String>,
    pub channel_id: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamResponse {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub status: String,
    pub scheduled_start_at: Option<i64>,
    pub actual_start_at: Option<i64>,
    pub actual_end_at: Option<i64>,
    pub fetched_at: i64,
}

// ============================================================================
// Usage log
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UsageQueryParams {
    /// Number of most recent entries to return (default: 50)
    #[serde(default = "default_usage_limit")]
    pub limit: u32,
}

fn default_usage_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageLogResponse {
    pub id: i64,
    pub api_key_id: Option<String>,
    pub endpoint: String,
    pub channel_ids: Vec<String>,
    pub units_used: i64,
    pub response_cached: bool,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: i64,
}

/// Units charged since the start of the current UTC day.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummaryResponse {
    pub day_start_ms: i64,
    pub units_used_today: i64,
}

// ============================================================================
// Sync triggers
// ============================================================================

/// Outcome of a trigger request.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerResponse {
    Ran { outcome: SyncOutcome },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub tiers: Vec<TierStatus>,
    pub cache_entries: usize,
}

// ============================================================================
// Avatar refresh
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvatarRefreshRequest {
    /// Channels to consider this run; falls back to the configured batch
    /// limit.
    pub limit: Option<u32>,
    /// Refresh every channel, not just those missing an avatar.
    #[serde(default)]
    pub force_all: bool,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_channel_defaults_enabled() {
        let request: CreateChannelRequest =
            serde_json::from_str(r#"{"id":"UC123","title":"A Channel"}"#).unwrap();
        assert!(request.enabled);
    }

    #[test]
    fn test_trigger_response_tagging() {
        let response = TriggerResponse::Skipped {
            reason: SkipReason::InProgress,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""result":"skipped""#));
        assert!(json.contains("in_progress"));
    }
}
