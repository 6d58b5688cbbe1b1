//! Production implementations of the kernel API traits.
//!
//! Each impl delegates to the matching client crate and normalizes its
//! error type into [`ApiError`](super::api_error::ApiError).

use async_trait::async_trait;

use super::api_error::ApiError;
use super::traits::{BaseGoogleAdsApi, BaseMetaAdsApi, BaseWeatherApi};

#[async_trait]
impl BaseWeatherApi for openweather::OpenWeatherClient {
    async fn current_weather(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<openweather::CurrentWeather, ApiError> {
        openweather::OpenWeatherClient::current_weather(self, lat, lon)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl BaseMetaAdsApi for meta_ads::MetaAdsClient {
    async fn get_ad_set(
        &self,
        ad_set_id: &str,
        access_token: &str,
    ) -> Result<Option<meta_ads::AdSet>, ApiError> {
        meta_ads::MetaAdsClient::get_ad_set(self, ad_set_id, access_token)
            .await
            .map_err(Into::into)
    }

    async fn update_ad_set_status(
        &self,
        ad_set_id: &str,
        status: meta_ads::DeliveryStatus,
        access_token: &str,
    ) -> Result<(), ApiError> {
        meta_ads::MetaAdsClient::update_ad_set_status(self, ad_set_id, status, access_token)
            .await
            .map_err(Into::into)
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: meta_ads::DeliveryStatus,
        access_token: &str,
    ) -> Result<(), ApiError> {
        meta_ads::MetaAdsClient::update_campaign_status(self, campaign_id, status, access_token)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl BaseGoogleAdsApi for google_ads::GoogleAdsClient {
    async fn update_ad_group_status(
        &self,
        ad_group_id: &str,
        status: google_ads::ServingStatus,
        access_token: &str,
    ) -> Result<(), ApiError> {
        google_ads::GoogleAdsClient::update_ad_group_status(self, ad_group_id, status, access_token)
            .await
            .map_err(Into::into)
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: google_ads::ServingStatus,
        access_token: &str,
    ) -> Result<(), ApiError> {
        google_ads::GoogleAdsClient::update_campaign_status(self, campaign_id, status, access_token)
            .await
            .map_err(Into::into)
    }
}
