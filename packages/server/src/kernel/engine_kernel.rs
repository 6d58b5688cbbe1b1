// EngineKernel - core infrastructure with all dependencies
//
// The EngineKernel holds the durable pool, the coordination store handle,
// and the external API clients, and provides access via traits for
// testability.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

use super::coordination::connect_coordination;
use super::traits::{BaseGoogleAdsApi, BaseMetaAdsApi, BaseWeatherApi};
use crate::config::Config;

/// EngineKernel holds all engine dependencies
pub struct EngineKernel {
    pub db_pool: PgPool,
    pub redis: ConnectionManager,
    pub weather: Arc<dyn BaseWeatherApi>,
    pub meta_ads: Arc<dyn BaseMetaAdsApi>,
    pub google_ads: Arc<dyn BaseGoogleAdsApi>,
    pub config: Config,
}

impl EngineKernel {
    /// Creates a new EngineKernel with the given dependencies
    pub fn new(
        db_pool: PgPool,
        redis: ConnectionManager,
        weather: Arc<dyn BaseWeatherApi>,
        meta_ads: Arc<dyn BaseMetaAdsApi>,
        google_ads: Arc<dyn BaseGoogleAdsApi>,
        config: Config,
    ) -> Self {
        Self {
            db_pool,
            redis,
            weather,
            meta_ads,
            google_ads,
            config,
        }
    }

    /// Connect both stores and build production API clients from config.
    pub async fn connect(config: Config) -> Result<Self> {
        let db_pool = PgPool::connect(&config.database_url)
            .await
            .context("failed to connect to database")?;
        let redis = connect_coordination(&config.redis_url).await?;

        let weather = openweather::OpenWeatherClient::new(config.openweather_api_key.clone())
            .context("failed to build openweather client")?;
        let meta_ads = meta_ads::MetaAdsClient::new(
            config.meta_app_id.clone().unwrap_or_default(),
            config.meta_app_secret.clone().unwrap_or_default(),
        )
        .context("failed to build meta ads client")?;
        let google_ads = google_ads::GoogleAdsClient::new(
            config.google_ads_client_id.clone().unwrap_or_default(),
            config.google_ads_client_secret.clone().unwrap_or_default(),
        )
        .context("failed to build google ads client")?;

        Ok(Self::new(
            db_pool,
            redis,
            Arc::new(weather),
            Arc::new(meta_ads),
            Arc::new(google_ads),
            config,
        ))
    }
}
