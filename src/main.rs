use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursehub_backend::cache::{RedisSessionCache, SessionCache};
use coursehub_backend::config::Config;
use coursehub_backend::db::connection::create_pool;
use coursehub_backend::db::redis::create_redis_pool;
use coursehub_backend::repositories::{PgSessionStore, PgUserStore, SessionStore, UserStore};
use coursehub_backend::router::build_router;
use coursehub_backend::scheduler::jobs::SessionCleanupJob;
use coursehub_backend::scheduler::Scheduler;
use coursehub_backend::services::{FixedWindowRateLimiter, SessionManager};
use coursehub_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursehub_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let redis_pool = create_redis_pool(&config).await?;

    let cache: Arc<dyn SessionCache> = Arc::new(RedisSessionCache::new(redis_pool));
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));

    let manager = Arc::new(SessionManager::new(
        Arc::clone(&users),
        Arc::clone(&sessions),
        Arc::clone(&cache),
        config.session_duration(),
    ));
    let limiter = Arc::new(FixedWindowRateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_seconds),
        config.rate_limit_enabled,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut scheduler = Scheduler::new();
    scheduler.add_job(Arc::new(SessionCleanupJob::new(
        Arc::clone(&sessions),
        config.session_retention(),
        Duration::from_secs(config.cleanup_interval_hours * 3600),
    )));
    let job_handles = scheduler.start(shutdown_rx);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let state = AppState::new(pool, cache, users, manager, limiter, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the background jobs once the server has drained.
    let _ = shutdown_tx.send(true);
    for handle in job_handles {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("Failed to install SIGTERM handler: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
