// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Rule evaluation and action dispatch live in the domain/engine layers
// and consume these seams.
//
// Naming convention: Base* for trait names (e.g., BaseWeatherApi)

use async_trait::async_trait;

use super::api_error::ApiError;

// =============================================================================
// Weather Trait (Infrastructure - current conditions lookup)
// =============================================================================

#[async_trait]
pub trait BaseWeatherApi: Send + Sync {
    /// Current weather for a coordinate pair, normalized to metric units
    async fn current_weather(&self, lat: f64, lon: f64)
        -> Result<openweather::CurrentWeather, ApiError>;
}

// =============================================================================
// Meta Ads Trait (Infrastructure - Marketing API)
// =============================================================================

#[async_trait]
pub trait BaseMetaAdsApi: Send + Sync {
    /// Fetch ad set details; `None` when the ad set does not exist
    async fn get_ad_set(
        &self,
        ad_set_id: &str,
        access_token: &str,
    ) -> Result<Option<meta_ads::AdSet>, ApiError>;

    /// Flip ad set delivery between ACTIVE and PAUSED
    async fn update_ad_set_status(
        &self,
        ad_set_id: &str,
        status: meta_ads::DeliveryStatus,
        access_token: &str,
    ) -> Result<(), ApiError>;

    /// Flip campaign delivery between ACTIVE and PAUSED
    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: meta_ads::DeliveryStatus,
        access_token: &str,
    ) -> Result<(), ApiError>;
}

// =============================================================================
// Google Ads Trait (Infrastructure - Google Ads API)
// =============================================================================

#[async_trait]
pub trait BaseGoogleAdsApi: Send + Sync {
    /// Flip ad group serving between ENABLED and PAUSED
    async fn update_ad_group_status(
        &self,
        ad_group_id: &str,
        status: google_ads::ServingStatus,
        access_token: &str,
    ) -> Result<(), ApiError>;

    /// Flip campaign serving between ENABLED and PAUSED
    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: google_ads::ServingStatus,
        access_token: &str,
    ) -> Result<(), ApiError>;
}
