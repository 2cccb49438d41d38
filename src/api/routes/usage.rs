//! Quota usage log routes.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{UsageLogResponse, UsageQueryParams, UsageSummaryResponse};
use crate::api::server::AppState;
use crate::database::models::UsageLogDbModel;
use crate::database::time::{now_ms, utc_day_start_ms};

/// Create the usage router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_usage))
        .route("/summary", get(usage_summary))
}

fn usage_to_response(model: &UsageLogDbModel) -> UsageLogResponse {
    // channel_ids is stored as a JSON array; a row that predates the current
    // format just comes back empty rather than failing the whole listing.
    let channel_ids = serde_json::from_str(&model.channel_ids).unwrap_or_default();
    UsageLogResponse {
        id: model.id,
        api_key_id: model.api_key_id.clone(),
        endpoint: model.endpoint.clone(),
        channel_ids,
        units_used: model.units_used,
        response_cached: model.response_cached,
        success: model.success,
        error: model.error.clone(),
        created_at: model.created_at,
    }
}

/// Most recent usage entries, newest first.
async fn list_usage(
    State(state): State<AppState>,
    Query(params): Query<UsageQueryParams>,
) -> ApiResult<Json<Vec<UsageLogResponse>>> {
    let repository = state
        .usage_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("usage repository not available".into()))?;

    let entries = repository.list_recent(params.limit).await?;
    Ok(Json(entries.iter().map(usage_to_response).collect()))
}

/// Units charged across all keys since the start of the current UTC day.
async fn usage_summary(State(state): State<AppState>) -> ApiResult<Json<UsageSummaryResponse>> {
    let repository = state
        .usage_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("usage repository not available".into()))?;

    let day_start_ms = utc_day_start_ms(now_ms());
    let units_used_today = repository.units_used_since(day_start_ms).await?;

    Ok(Json(UsageSummaryResponse {
        day_start_ms,
        units_used_today,
    }))
}
