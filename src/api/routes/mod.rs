//! API route modules.
//!
//! Organizes routes by resource type.

pub mod avatars;
pub mod channels;
pub mod health;
pub mod keys;
pub mod streams;
pub mod sync;
pub mod usage;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/sync", sync::router())
        .nest("/api/streams", streams::router())
        .nest("/api/channels", channels::router())
        .nest("/api/avatars", avatars::router())
        .nest("/api/keys", keys::router())
        .nest("/api/usage", usage::router())
        .nest("/api/health", health::router())
        .with_state(state)
}
