use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub redis_pool_size: u32,
    pub redis_connect_timeout: u64,
    pub server_port: u16,
    pub app_version: String,
    pub app_env: String,
    /// How long a session (and every one of its cache entries) stays valid.
    pub session_duration_hours: u64,
    pub refresh_token_duration_days: u64,
    /// Revoked sessions older than this are purged by the cleanup job.
    pub session_retention_days: u64,
    pub cleanup_interval_hours: u64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_enabled: bool,
    pub cors_allow_origins: Vec<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost:5432/coursehub".to_string());

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let redis_pool_size = env_parse("REDIS_POOL_SIZE", 5);
        let redis_connect_timeout = env_parse("REDIS_CONNECT_TIMEOUT", 5);

        let server_port = env_parse("SERVER_PORT", 8081);
        let app_version = env::var("APP_VERSION").unwrap_or_else(|_| "1.0.0".to_string());
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let session_duration_hours = env_parse("SESSION_DURATION_HOURS", 24);
        let refresh_token_duration_days = env_parse("REFRESH_TOKEN_DURATION_DAYS", 7);
        let session_retention_days = env_parse("SESSION_RETENTION_DAYS", 7);
        let cleanup_interval_hours = env_parse("CLEANUP_INTERVAL_HOURS", 24);

        let rate_limit_max_requests = env_parse("RATE_LIMIT_MAX_REQUESTS", 20);
        let rate_limit_window_seconds = env_parse("RATE_LIMIT_WINDOW_SECONDS", 5);
        let rate_limit_enabled = env::var("RATE_LIMIT_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            database_url,
            redis_url,
            redis_pool_size,
            redis_connect_timeout,
            server_port,
            app_version,
            app_env,
            session_duration_hours,
            refresh_token_duration_days,
            session_retention_days,
            cleanup_interval_hours,
            rate_limit_max_requests,
            rate_limit_window_seconds,
            rate_limit_enabled,
            cors_allow_origins,
        })
    }

    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_duration_hours as i64)
    }

    pub fn session_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_retention_days as i64)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}


#[cfg(test)]
impl Config {
    /// Fixed configuration for tests; never reads the environment.
    pub fn test_default() -> Self {
        Config {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://localhost:6379".into(),
            redis_pool_size: 1,
            redis_connect_timeout: 1,
            server_port: 0,
            app_version: "test".into(),
            app_env: "test".into(),
            session_duration_hours: 24,
            refresh_token_duration_days: 7,
            session_retention_days: 7,
            cleanup_interval_hours: 24,
            rate_limit_max_requests: 5,
            rate_limit_window_seconds: 1,
            rate_limit_enabled: true,
            cors_allow_origins: vec!["http://localhost:3000".into()],
        }
    }
}
