//! Sync trigger routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{SyncStatusResponse, TriggerResponse};
use crate::api::server::AppState;
use crate::scheduler::TriggerOutcome;
use crate::sync::{SyncOptions, SyncTier};

/// Create the sync router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(sync_status))
        .route("/{tier}", post(trigger_tier))
}

/// Trigger one tier pass.
///
/// Honors the per-tier single-flight and debounce guards; `force_refresh`
/// bypasses the response cache, never the guards. A skipped trigger is a
/// normal 200 response with the reason.
async fn trigger_tier(
    State(state): State<AppState>,
    Path(tier): Path<String>,
    body: Option<Json<SyncOptions>>,
) -> ApiResult<Json<TriggerResponse>> {
    let tier = SyncTier::parse(&tier)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown sync tier '{tier}'")))?;
    let options = body.map(|Json(options)| options).unwrap_or_default();

    let scheduler = state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("sync scheduler not available".into()))?;

    let response = match scheduler.trigger(tier, options).await? {
        TriggerOutcome::Ran(outcome) => TriggerResponse::Ran { outcome },
        TriggerOutcome::Skipped(reason) => TriggerResponse::Skipped { reason },
    };
    Ok(Json(response))
}

/// Guard state for every tier plus the cache population.
async fn sync_status(State(state): State<AppState>) -> ApiResult<Json<SyncStatusResponse>> {
    let scheduler = state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("sync scheduler not available".into()))?;
    let cache_entries = state.cache.as_ref().map(|c| c.len()).unwrap_or(0);

    Ok(Json(SyncStatusResponse {
        tiers: scheduler.status(),
        cache_entries,
    }))
}
