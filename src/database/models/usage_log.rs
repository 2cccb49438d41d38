//! Quota usage log database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One audited quota event: an upstream call, or a cache-served run.
///
/// The log is append-only. `api_key_id` is kept as a plain string (no foreign
/// key) so deleting a key never rewrites history.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UsageLogDbModel {
    pub id: i64,
    pub api_key_id: Option<String>,
    pub endpoint: String,
    /// JSON array of the channel ids covered by this event.
    pub channel_ids: String,
    pub units_used: i64,
    pub response_cached: bool,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: i64,
}

/// Insert payload for a usage row (`id` is assigned by the database).
#[derive(Debug, Clone)]
pub struct NewUsageLogEntry {
    pub api_key_id: Option<String>,
    pub endpoint: String,
    pub channel_ids: Vec<String>,
    pub units_used: i64,
    pub response_cached: bool,
    pub success: bool,
    pub error: Option<String>,
}

impl NewUsageLogEntry {
    /// A successful upstream call charged against a key.
    pub fn call(
        api_key_id: impl Into<String>,
        endpoint: impl Into<String>,
        channel_ids: Vec<String>,
        units_used: i64,
    ) -> Self {
        Self {
            api_key_id: Some(api_key_id.into()),
            endpoint: endpoint.into(),
            channel_ids,
            units_used,
            response_cached: false,
            success: true,
            error: None,
        }
    }

    /// A failed upstream call (units may still have been charged).
    pub fn failed_call(
        api_key_id: impl Into<String>,
        endpoint: impl Into<String>,
        channel_ids: Vec<String>,
        units_used: i64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            api_key_id: Some(api_key_id.into()),
            endpoint: endpoint.into(),
            channel_ids,
            units_used,
            response_cached: false,
            success: false,
            error: Some(error.into()),
        }
    }

    /// A run served entirely from the response cache. No key, no units.
    pub fn cache_hit(endpoint: impl Into<String>, channel_ids: Vec<String>) -> Self {
        Self {
            api_key_id: None,
            endpoint: endpoint.into(),
            channel_ids,
            units_used: 0,
            response_cached: true,
            success: true,
            error: None,
        }
    }
}
