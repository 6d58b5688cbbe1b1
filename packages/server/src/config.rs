use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub openweather_api_key: String,
    pub meta_app_id: Option<String>,
    pub meta_app_secret: Option<String>,
    pub google_ads_client_id: Option<String>,
    pub google_ads_client_secret: Option<String>,
    pub worker_max_concurrent_jobs: usize,
    pub worker_heartbeat_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            openweather_api_key: env::var("OPENWEATHER_API_KEY")
                .context("OPENWEATHER_API_KEY must be set")?,
            meta_app_id: env::var("META_APP_ID").ok(),
            meta_app_secret: env::var("META_APP_SECRET").ok(),
            google_ads_client_id: env::var("GOOGLE_ADS_CLIENT_ID").ok(),
            google_ads_client_secret: env::var("GOOGLE_ADS_CLIENT_SECRET").ok(),
            worker_max_concurrent_jobs: env::var("WORKER_MAX_CONCURRENT_JOBS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("WORKER_MAX_CONCURRENT_JOBS must be a valid number")?,
            worker_heartbeat_ms: env::var("WORKER_HEARTBEAT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .context("WORKER_HEARTBEAT_MS must be a valid number")?,
        })
    }
}
