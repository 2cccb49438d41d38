//! Avatar refresh routes.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::AvatarRefreshRequest;
use crate::api::server::AppState;
use crate::avatar::AvatarRefreshOutcome;

/// Create the avatars router.
pub fn router() -> Router<AppState> {
    Router::new().route("/refresh", post(refresh_avatars))
}

/// Refresh channel avatars from upstream.
///
/// Shares the credential pool with the sync tiers; if the pool is exhausted
/// the run reports the remaining channels as skipped rather than failing.
async fn refresh_avatars(
    State(state): State<AppState>,
    body: Option<Json<AvatarRefreshRequest>>,
) -> ApiResult<Json<AvatarRefreshOutcome>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let refresher = state
        .avatar_refresher
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("avatar refresher not available".into()))?;

    let outcome = refresher.run(request.limit, request.force_all).await?;
    Ok(Json(outcome))
}
