use std::sync::Arc;

use crate::cache::SessionCache;
use crate::config::Config;
use crate::db::connection::DbPool;
use crate::repositories::UserStore;
use crate::services::{FixedWindowRateLimiter, SessionManager};

/// Shared application state threaded through handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub cache: Arc<dyn SessionCache>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<SessionManager>,
    pub limiter: Arc<FixedWindowRateLimiter>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        cache: Arc<dyn SessionCache>,
        users: Arc<dyn UserStore>,
        sessions: Arc<SessionManager>,
        limiter: Arc<FixedWindowRateLimiter>,
        config: Config,
    ) -> Self {
        Self {
            pool,
            cache,
            users,
            sessions,
            limiter,
            config,
        }
    }
}
