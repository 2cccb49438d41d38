//! API key pool routes.
//!
//! Secrets come in once on create and leave masked everywhere after that.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, patch, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    ApiKeyResponse, CreateApiKeyRequest, ResetQuotaResponse, SetEnabledRequest,
};
use crate::api::server::AppState;
use crate::database::models::ApiKeyDbModel;

/// Create the keys router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_key))
        .route("/", get(list_keys))
        .route("/reset-quota", post(reset_quota))
        .route("/{id}", get(get_key))
        .route("/{id}", delete(delete_key))
        .route("/{id}/enabled", patch(set_enabled))
}

fn key_to_response(model: &ApiKeyDbModel) -> ApiKeyResponse {
    ApiKeyResponse {
        id: model.id.clone(),
        name: model.name.clone(),
        masked_secret: model.masked_secret(),
        status: model.status.clone(),
        quota_used_today: model.quota_used_today,
        total_requests: model.total_requests,
        consecutive_errors: model.consecutive_errors,
        last_error: model.last_error.clone(),
        last_used_at: model.last_used_at,
        last_quota_reset_at: model.last_quota_reset_at,
        quota_exceeded_at: model.quota_exceeded_at,
        created_at: model.created_at,
    }
}

/// Add a credential to the pool.
async fn create_key(
    State(state): State<AppState>,
    Json(request): Json<CreateApiKeyRequest>,
) -> ApiResult<Json<ApiKeyResponse>> {
    let repository = state
        .key_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("key repository not available".into()))?;

    if request.name.trim().is_empty() {
        return Err(ApiError::Validation("key name cannot be empty".into()));
    }
    if request.secret.trim().is_empty() {
        return Err(ApiError::Validation("key secret cannot be empty".into()));
    }

    let key = ApiKeyDbModel::new(request.name, request.secret);
    repository.create_key(&key).await?;

    Ok(Json(key_to_response(&key)))
}

/// List every key with quota and error state, secrets masked.
async fn list_keys(State(state): State<AppState>) -> ApiResult<Json<Vec<ApiKeyResponse>>> {
    let repository = state
        .key_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("key repository not available".into()))?;

    let keys = repository.list_keys().await?;
    Ok(Json(keys.iter().map(key_to_response).collect()))
}

async fn get_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiKeyResponse>> {
    let repository = state
        .key_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("key repository not available".into()))?;

    let key = repository.get_key(&id).await?;
    Ok(Json(key_to_response(&key)))
}

/// Remove a credential from the pool. Usage history keeps its id.
async fn delete_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let repository = state
        .key_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("key repository not available".into()))?;

    repository.delete_key(&id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Key '{}' deleted", id)
    })))
}

/// Enable a key (back to active, errors cleared) or disable it.
async fn set_enabled(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> ApiResult<Json<ApiKeyResponse>> {
    let repository = state
        .key_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("key repository not available".into()))?;

    repository.set_enabled(&id, request.enabled).await?;
    let key = repository.get_key(&id).await?;
    Ok(Json(key_to_response(&key)))
}

/// Zero today's quota counters and restore quota-exceeded keys, regardless
/// of whether the UTC day has rolled over.
async fn reset_quota(State(state): State<AppState>) -> ApiResult<Json<ResetQuotaResponse>> {
    let pool = state
        .credential_pool
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("credential pool not available".into()))?;

    let keys_reset = pool.reset_daily_quota(true).await?;
    Ok(Json(ResetQuotaResponse { keys_reset }))
}
