//! Channel roster database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A YouTube channel whose broadcasts are kept in sync.
///
/// The id is the upstream channel id (`UC...`), not a generated uuid, so
/// broadcast records can reference it directly.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChannelDbModel {
    pub id: String,
    pub title: String,
    pub avatar_url: Option<String>,
    /// Disabled channels are skipped by every sync tier.
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChannelDbModel {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = crate::database::time::now_ms();
        Self {
            id: id.into(),
            title: title.into(),
            avatar_url: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}
