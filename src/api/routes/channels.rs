//! Channel roster routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, patch, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ChannelResponse, CreateChannelRequest, SetEnabledRequest};
use crate::api::server::AppState;
use crate::database::models::ChannelDbModel;
use crate::error::Error;

/// Create the channels router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_channel))
        .route("/", get(list_channels))
        .route("/{id}", get(get_channel))
        .route("/{id}", delete(delete_channel))
        .route("/{id}/enabled", patch(set_enabled))
}

fn channel_to_response(model: &ChannelDbModel) -> ChannelResponse {
    ChannelResponse {
        id: model.id.clone(),
        title: model.title.clone(),
        avatar_url: model.avatar_url.clone(),
        enabled: model.enabled,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// Add a channel to the sync roster.
async fn create_channel(
    State(state): State<AppState>,
    Json(request): Json<CreateChannelRequest>,
) -> ApiResult<Json<ChannelResponse>> {
    let repository = state
        .channel_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("channel repository not available".into()))?;

    if request.id.trim().is_empty() {
        return Err(ApiError::Validation("channel id cannot be empty".into()));
    }
    if request.title.trim().is_empty() {
        return Err(ApiError::Validation("channel title cannot be empty".into()));
    }

    match repository.get_channel(&request.id).await {
        Ok(_) => {
            return Err(ApiError::Conflict(format!(
                "channel '{}' already exists",
                request.id
            )));
        }
        Err(Error::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    let mut channel = ChannelDbModel::new(request.id, request.title);
    channel.enabled = request.enabled;
    repository.create_channel(&channel).await?;

    Ok(Json(channel_to_response(&channel)))
}

/// List every channel on the roster, enabled or not.
async fn list_channels(State(state): State<AppState>) -> ApiResult<Json<Vec<ChannelResponse>>> {
    let repository = state
        .channel_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("channel repository not available".into()))?;

    let channels = repository.list_channels().await?;
    Ok(Json(channels.iter().map(channel_to_response).collect()))
}

async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChannelResponse>> {
    let repository = state
        .channel_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("channel repository not available".into()))?;

    let channel = repository.get_channel(&id).await?;
    Ok(Json(channel_to_response(&channel)))
}

/// Remove a channel. The cascade takes its broadcast records with it;
/// usage log rows keep their channel ids.
async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let repository = state
        .channel_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("channel repository not available".into()))?;

    repository.delete_channel(&id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Channel '{}' deleted", id)
    })))
}

/// Enable or disable a channel for syncing.
async fn set_enabled(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> ApiResult<Json<ChannelResponse>> {
    let repository = state
        .channel_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("channel repository not available".into()))?;

    repository.set_enabled(&id, request.enabled).await?;
    let channel = repository.get_channel(&id).await?;
    Ok(Json(channel_to_response(&channel)))
}
