//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::avatar::AvatarRefresher;
use crate::cache::ResponseCache;
use crate::database::repositories::{
    ApiKeyRepository, ChannelRepository, StreamRepository, UsageLogRepository,
};
use crate::error::Result;
use crate::keypool::CredentialPool;
use crate::scheduler::TierScheduler;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Permissive CORS, for operator dashboards served from elsewhere.
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    /// Read `API_BIND_ADDRESS` and `API_PORT`, keeping defaults for anything
    /// unset or unparsable.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        config
    }
}

/// Shared application state.
///
/// Every service is optional so route handlers can be exercised against a
/// partially wired state; a handler whose service is absent answers 503.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    pub scheduler: Option<Arc<TierScheduler>>,
    pub avatar_refresher: Option<Arc<AvatarRefresher>>,
    /// Credential pool, for the operator quota reset.
    pub credential_pool: Option<Arc<CredentialPool>>,
    /// Response cache, surfaced in the sync status endpoint.
    pub cache: Option<Arc<ResponseCache>>,
    pub key_repository: Option<Arc<dyn ApiKeyRepository>>,
    pub channel_repository: Option<Arc<dyn ChannelRepository>>,
    pub stream_repository: Option<Arc<dyn StreamRepository>>,
    pub usage_repository: Option<Arc<dyn UsageLogRepository>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            scheduler: None,
            avatar_refresher: None,
            credential_pool: None,
            cache: None,
            key_repository: None,
            channel_repository: None,
            stream_repository: None,
            usage_repository: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<TierScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_avatar_refresher(mut self, refresher: Arc<AvatarRefresher>) -> Self {
        self.avatar_refresher = Some(refresher);
        self
    }

    pub fn with_credential_pool(mut self, pool: Arc<CredentialPool>) -> Self {
        self.credential_pool = Some(pool);
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_key_repository(mut self, repo: Arc<dyn ApiKeyRepository>) -> Self {
        self.key_repository = Some(repo);
        self
    }

    pub fn with_channel_repository(mut self, repo: Arc<dyn ChannelRepository>) -> Self {
        self.channel_repository = Some(repo);
        self
    }

    pub fn with_stream_repository(mut self, repo: Arc<dyn StreamRepository>) -> Self {
        self.stream_repository = Some(repo);
        self
    }

    pub fn with_usage_repository(mut self, repo: Arc<dyn UsageLogRepository>) -> Self {
        self.usage_repository = Some(repo);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn with_state(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Token that stops the server and everything sharing it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Health probes poll every few seconds and would drown the request
        // log, so they get a disabled span and the hooks skip them.
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/api/health") {
                        Span::none()
                    } else {
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            path = %req.uri().path(),
                        )
                    }
                })
                .on_request(|_: &Request, _: &Span| {})
                .on_response(
                    |res: &axum::response::Response, latency: Duration, span: &Span| {
                        if !span.is_disabled() {
                            tracing::info!(
                                parent: span,
                                status = res.status().as_u16(),
                                latency_ms = latency.as_millis() as u64,
                                "response"
                            );
                        }
                    },
                )
                .on_failure(
                    |class: ServerErrorsFailureClass, latency: Duration, span: &Span| {
                        if !span.is_disabled() {
                            tracing::error!(
                                parent: span,
                                %class,
                                latency_ms = latency.as_millis() as u64,
                                "request failed"
                            );
                        }
                    },
                ),
        )
    }

    /// Bind and serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::error::Error::config(format!("invalid bind address: {e}")))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("API server listening on http://{addr}");

        let shutdown = self.cancel_token.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("API server shutting down");
            })
            .await?;

        Ok(())
    }
}
