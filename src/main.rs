use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamsync::api::server::{ApiServer, ApiServerConfig, AppState};
use streamsync::avatar::{AvatarConfig, AvatarRefresher};
use streamsync::cache::ResponseCache;
use streamsync::database;
use streamsync::database::repositories::{
    SqlxApiKeyRepository, SqlxChannelRepository, SqlxStreamRepository, SqlxUsageLogRepository,
};
use streamsync::keypool::{CredentialPool, PoolConfig};
use streamsync::scheduler::TierScheduler;
use streamsync::sync::{SyncConfig, SyncExecutor};
use streamsync::youtube::{HttpYouTubeApi, UpstreamConfig, YouTubeApi};

/// Cadence of the response cache sweep.
const CACHE_SWEEP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamsync=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:streamsync.db?mode=rwc".to_string());

    let read_pool = database::init_pool(&database_url).await?;
    let write_pool = database::init_write_pool(&database_url).await?;
    database::run_migrations(&read_pool).await?;

    // Core services
    let credentials = Arc::new(CredentialPool::new(
        write_pool.clone(),
        PoolConfig::from_env_or_default(),
    ));
    let cache = Arc::new(ResponseCache::new());
    let api: Arc<dyn YouTubeApi> =
        Arc::new(HttpYouTubeApi::new(UpstreamConfig::from_env_or_default())?);

    let executor = Arc::new(SyncExecutor::new(
        read_pool.clone(),
        write_pool,
        credentials.clone(),
        cache.clone(),
        api.clone(),
        SyncConfig::from_env_or_default(),
    ));
    let scheduler = Arc::new(TierScheduler::new(executor));
    let avatar_refresher = Arc::new(AvatarRefresher::new(
        read_pool.clone(),
        credentials.clone(),
        api,
        AvatarConfig::from_env_or_default(),
    ));

    let state = AppState::new()
        .with_scheduler(scheduler.clone())
        .with_avatar_refresher(avatar_refresher.clone())
        .with_credential_pool(credentials.clone())
        .with_cache(cache.clone())
        .with_key_repository(Arc::new(SqlxApiKeyRepository::new(read_pool.clone())))
        .with_channel_repository(Arc::new(SqlxChannelRepository::new(read_pool.clone())))
        .with_stream_repository(Arc::new(SqlxStreamRepository::new(read_pool.clone())))
        .with_usage_repository(Arc::new(SqlxUsageLogRepository::new(read_pool)));

    let server = ApiServer::with_state(ApiServerConfig::from_env_or_default(), state);
    let cancel_token = server.cancel_token();

    // Background tasks, all tied to the server's cancellation token
    scheduler.start_background_ticks(cancel_token.clone());
    credentials.start_daily_reset_task(cancel_token.clone());
    avatar_refresher.start_background_task(cancel_token.clone());
    cache.start_sweep_task(
        cancel_token.clone(),
        Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS),
    );

    // Ctrl-C triggers graceful shutdown
    tokio::spawn({
        let cancel_token = cancel_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                cancel_token.cancel();
            }
        }
    });

    server.run().await?;

    tracing::info!("streamsync stopped");
    Ok(())
}
