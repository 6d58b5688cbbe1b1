//! Mock implementations of the kernel API traits for tests.
//!
//! Mocks record every call so tests can assert on exactly which external
//! requests an execution produced, and can be scripted to fail first
//! (rate limits, timeouts) before succeeding.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::api_error::ApiError;
use super::traits::{BaseGoogleAdsApi, BaseMetaAdsApi, BaseWeatherApi};

// =============================================================================
// Weather
// =============================================================================

/// Scripted weather source. Responses queued with [`with_script`] are
/// consumed first; afterwards every call returns the fallback snapshot.
///
/// [`with_script`]: MockWeatherApi::with_script
pub struct MockWeatherApi {
    script: Mutex<VecDeque<Result<openweather::CurrentWeather, ApiError>>>,
    fallback: Option<openweather::CurrentWeather>,
    calls: AtomicU32,
}

impl MockWeatherApi {
    pub fn returning(snapshot: openweather::CurrentWeather) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(snapshot),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_script(
        self,
        steps: Vec<Result<openweather::CurrentWeather, ApiError>>,
    ) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A plausible snapshot for tests that only care about one parameter.
pub fn test_weather(temperature: f64) -> openweather::CurrentWeather {
    openweather::CurrentWeather {
        temperature,
        humidity: 50.0,
        wind_speed: 3.0,
        precipitation: 0.0,
        visibility: Some(10.0),
        cloud_cover: 20.0,
        description: "clear sky".to_string(),
        icon: "01d".to_string(),
        condition_id: 800,
    }
}

#[async_trait]
impl BaseWeatherApi for MockWeatherApi {
    async fn current_weather(
        &self,
        _lat: f64,
        _lon: f64,
    ) -> Result<openweather::CurrentWeather, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return step;
        }
        self.fallback
            .clone()
            .ok_or_else(|| ApiError::new("mock weather has no scripted response"))
    }
}

// =============================================================================
// Meta Ads
// =============================================================================

/// In-memory ad-set store plus a log of every status update issued.
pub struct MockMetaAdsApi {
    ad_sets: Mutex<HashMap<String, meta_ads::AdSet>>,
    pub ad_set_updates: Mutex<Vec<(String, String)>>,
    pub campaign_updates: Mutex<Vec<(String, String)>>,
    update_failure: Mutex<Option<ApiError>>,
    get_calls: AtomicU32,
    update_calls: AtomicU32,
}

impl MockMetaAdsApi {
    pub fn new() -> Self {
        Self {
            ad_sets: Mutex::new(HashMap::new()),
            ad_set_updates: Mutex::new(Vec::new()),
            campaign_updates: Mutex::new(Vec::new()),
            update_failure: Mutex::new(None),
            get_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
        }
    }

    pub fn with_ad_set(self, ad_set_id: &str, campaign_id: &str) -> Self {
        self.ad_sets.lock().unwrap().insert(
            ad_set_id.to_string(),
            meta_ads::AdSet {
                id: ad_set_id.to_string(),
                name: Some(format!("ad set {ad_set_id}")),
                status: Some("ACTIVE".to_string()),
                campaign_id: Some(campaign_id.to_string()),
            },
        );
        self
    }

    /// Make the next status updates fail with the given error.
    pub fn fail_updates_with(&self, error: ApiError) {
        *self.update_failure.lock().unwrap() = Some(error);
    }

    pub fn get_call_count(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockMetaAdsApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseMetaAdsApi for MockMetaAdsApi {
    async fn get_ad_set(
        &self,
        ad_set_id: &str,
        _access_token: &str,
    ) -> Result<Option<meta_ads::AdSet>, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ad_sets.lock().unwrap().get(ad_set_id).cloned())
    }

    async fn update_ad_set_status(
        &self,
        ad_set_id: &str,
        status: meta_ads::DeliveryStatus,
        _access_token: &str,
    ) -> Result<(), ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.update_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.ad_set_updates
            .lock()
            .unwrap()
            .push((ad_set_id.to_string(), status.as_str().to_string()));
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: meta_ads::DeliveryStatus,
        _access_token: &str,
    ) -> Result<(), ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.update_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.campaign_updates
            .lock()
            .unwrap()
            .push((campaign_id.to_string(), status.as_str().to_string()));
        Ok(())
    }
}

// =============================================================================
// Google Ads
// =============================================================================

/// Records status mutations; can be scripted to fail.
pub struct MockGoogleAdsApi {
    pub ad_group_updates: Mutex<Vec<(String, String)>>,
    pub campaign_updates: Mutex<Vec<(String, String)>>,
    update_failure: Mutex<Option<ApiError>>,
    update_calls: AtomicU32,
}

impl MockGoogleAdsApi {
    pub fn new() -> Self {
        Self {
            ad_group_updates: Mutex::new(Vec::new()),
            campaign_updates: Mutex::new(Vec::new()),
            update_failure: Mutex::new(None),
            update_calls: AtomicU32::new(0),
        }
    }

    pub fn fail_updates_with(&self, error: ApiError) {
        *self.update_failure.lock().unwrap() = Some(error);
    }

    pub fn update_call_count(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockGoogleAdsApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseGoogleAdsApi for MockGoogleAdsApi {
    async fn update_ad_group_status(
        &self,
        ad_group_id: &str,
        status: google_ads::ServingStatus,
        _access_token: &str,
    ) -> Result<(), ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.update_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.ad_group_updates
            .lock()
            .unwrap()
            .push((ad_group_id.to_string(), status.as_str().to_string()));
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: google_ads::ServingStatus,
        _access_token: &str,
    ) -> Result<(), ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.update_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.campaign_updates
            .lock()
            .unwrap()
            .push((campaign_id.to_string(), status.as_str().to_string()));
        Ok(())
    }
}
