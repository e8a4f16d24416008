//! One-shot session cleanup, for cron or manual runs. The server runs the
//! same job on a schedule; this binary exists for operational catch-up.

use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursehub_backend::config::Config;
use coursehub_backend::db::connection::create_pool;
use coursehub_backend::repositories::{PgSessionStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;

    let store = Arc::new(PgSessionStore::new(pool));
    let cutoff = Utc::now() - config.session_retention();

    tracing::info!(%cutoff, "Starting session cleanup");
    let deleted = store.delete_revoked_before(cutoff).await?;
    tracing::info!(deleted, "Session cleanup finished");

    Ok(())
}
