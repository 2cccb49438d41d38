//! Stream query routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{StreamFilterParams, StreamResponse};
use crate::api::server::AppState;
use crate::database::models::{LiveStreamDbModel, StreamStatus};
use crate::database::repositories::StreamQuery;

/// Create the streams router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_streams))
        .route("/{video_id}", get(get_stream))
}

/// List streams, filterable by status, channel and scheduled-start window.
async fn list_streams(
    State(state): State<AppState>,
    Query(params): Query<StreamFilterParams>,
) -> ApiResult<Json<Vec<StreamResponse>>> {
    let repository = state
        .stream_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("stream repository not available".into()))?;

    let status = match params.status {
        Some(raw) => Some(
            StreamStatus::parse(&raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown stream status '{raw}'")))?,
        ),
        None => None,
    };

    let query = StreamQuery {
        status,
        channel_id: params.channel_id,
        from_ms: params.from_ms,
        to_ms: params.to_ms,
        limit: params.limit,
    };

    let streams = repository.query_streams(&query).await?;
    Ok(Json(streams.iter().map(stream_to_response).collect()))
}

/// Fetch a single stream by video id.
async fn get_stream(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> ApiResult<Json<StreamResponse>> {
    let repository = state
        .stream_repository
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("stream repository not available".into()))?;

    let stream = repository.get_stream(&video_id).await?;
    Ok(Json(stream_to_response(&stream)))
}

fn stream_to_response(model: &LiveStreamDbModel) -> StreamResponse {
    StreamResponse {
        video_id: model.video_id.clone(),
        channel_id: model.channel_id.clone(),
        title: model.title.clone(),
        status: model.status.clone(),
        scheduled_start_at: model.scheduled_start_at,
        actual_start_at: model.actual_start_at,
        actual_end_at: model.actual_end_at,
        fetched_at: model.fetched_at,
    }
}
