//! API key database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A pooled YouTube Data API credential with its quota and error state.
///
/// `quota_used_today` counts reserved units since `last_quota_reset_at`; the
/// daily reset sweep zeroes it once per UTC calendar day.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKeyDbModel {
    pub id: String,
    pub name: String,
    /// The credential itself. Redacted in API responses.
    pub secret: String,
    /// Current pool state (active, inactive, quota_exceeded).
    pub status: String,
    pub quota_used_today: i64,
    pub total_requests: i64,
    /// Unix epoch milliseconds (UTC) of the last acquire or successful call.
    pub last_used_at: Option<i64>,
    /// Unix epoch milliseconds (UTC) of the last daily quota reset.
    pub last_quota_reset_at: i64,
    /// Set when upstream reported quota exhaustion; always after the last reset.
    pub quota_exceeded_at: Option<i64>,
    pub consecutive_errors: i64,
    pub last_error: Option<String>,
    pub last_error_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ApiKeyDbModel {
    /// Create a new active key with zeroed counters.
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        let now = crate::database::time::now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            secret: secret.into(),
            status: ApiKeyStatus::Active.as_str().to_string(),
            quota_used_today: 0,
            total_requests: 0,
            last_used_at: None,
            last_quota_reset_at: now,
            quota_exceeded_at: None,
            consecutive_errors: 0,
            last_error: None,
            last_error_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Secret with the middle elided, safe for API responses and logs.
    pub fn masked_secret(&self) -> String {
        let s = self.secret.as_str();
        if s.len() <= 8 {
            return "****".to_string();
        }
        format!("{}****{}", &s[..4], &s[s.len() - 4..])
    }
}

/// Pool states for an API key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    /// Eligible for acquisition.
    Active,
    /// Taken out of rotation (operator action or repeated errors).
    Inactive,
    /// Upstream reported quota exhaustion; restored by the daily reset.
    QuotaExceeded,
}

impl ApiKeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::QuotaExceeded => "quota_exceeded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "quota_exceeded" => Some(Self::QuotaExceeded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_key_defaults() {
        let key = ApiKeyDbModel::new("primary", "AIzaSyExampleExampleExample");
        assert_eq!(key.status, "active");
        assert_eq!(key.quota_used_today, 0);
        assert_eq!(key.consecutive_errors, 0);
        assert!(key.last_used_at.is_none());
        assert!(key.quota_exceeded_at.is_none());
    }

    #[test]
    fn test_masked_secret_elides_middle() {
        let key = ApiKeyDbModel::new("primary", "AIzaSyExampleExampleExample");
        let masked = key.masked_secret();
        assert!(masked.starts_with("AIza"));
        assert!(masked.contains("****"));
        assert!(!masked.contains("Example"));

        let short = ApiKeyDbModel::new("short", "abc");
        assert_eq!(short.masked_secret(), "****");
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(ApiKeyStatus::QuotaExceeded.as_str(), "quota_exceeded");
        assert_eq!(
            ApiKeyStatus::parse("quota_exceeded"),
            Some(ApiKeyStatus::QuotaExceeded)
        );
        assert_eq!(ApiKeyStatus::parse("bogus"), None);
    }
}
