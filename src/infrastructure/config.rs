use std::env;

use crate::services::LendingPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Pool size. In-memory SQLite must stay at 1 so every call sees the same database.
    pub max_connections: u32,
    /// Seconds between maintenance sweeps; 0 turns the background sweep off.
    pub sweep_interval_secs: u64,
    pub cors_allowed_origins: Vec<String>,
    pub policy: LendingPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://circulation.db?mode=rwc".to_string());
        let default_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        Self {
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_connections),
            database_url,
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            policy: LendingPolicy::from_env(),
        }
    }
}
