//! Shared helpers for integration tests.
#![allow(dead_code)]

mod harness;

use std::sync::Arc;

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use automation_core::config::Config;
use automation_core::domains::rules::{
    AdPlatform, CampaignTarget, ConditionOperator, Rule, TargetAction, TargetType,
    WeatherCondition, WeatherParameter,
};
use automation_core::engine::AutomationEngine;
use automation_core::kernel::{
    EngineKernel, MockGoogleAdsApi, MockMetaAdsApi, MockWeatherApi,
};

pub use harness::SharedTestInfra;

/// Unique id so tests sharing the containers never collide.
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

pub fn test_config(db_url: &str, redis_url: &str) -> Config {
    Config {
        database_url: db_url.to_string(),
        redis_url: redis_url.to_string(),
        openweather_api_key: "test-key".to_string(),
        meta_app_id: None,
        meta_app_secret: None,
        google_ads_client_id: None,
        google_ads_client_secret: None,
        worker_max_concurrent_jobs: 5,
        worker_heartbeat_ms: 15_000,
    }
}

/// An engine wired to mock external APIs against the shared containers.
pub struct TestEngine {
    pub engine: Arc<AutomationEngine>,
    pub weather: Arc<MockWeatherApi>,
    pub meta: Arc<MockMetaAdsApi>,
    pub google: Arc<MockGoogleAdsApi>,
    pub pool: sqlx::PgPool,
}

pub async fn build_engine(
    weather: MockWeatherApi,
    meta: MockMetaAdsApi,
    google: MockGoogleAdsApi,
) -> TestEngine {
    let infra = SharedTestInfra::get().await;
    let pool = infra.pg_pool().await;
    let redis = infra.redis().await;

    let weather = Arc::new(weather);
    let meta = Arc::new(meta);
    let google = Arc::new(google);

    let weather_api: Arc<dyn automation_core::kernel::BaseWeatherApi> =
        Arc::clone(&weather) as Arc<dyn automation_core::kernel::BaseWeatherApi>;
    let meta_api: Arc<dyn automation_core::kernel::BaseMetaAdsApi> =
        Arc::clone(&meta) as Arc<dyn automation_core::kernel::BaseMetaAdsApi>;
    let google_api: Arc<dyn automation_core::kernel::BaseGoogleAdsApi> =
        Arc::clone(&google) as Arc<dyn automation_core::kernel::BaseGoogleAdsApi>;

    let kernel = EngineKernel::new(
        pool.clone(),
        redis,
        weather_api,
        meta_api,
        google_api,
        test_config(infra.db_url(), infra.redis_url()),
    );
    let engine = AutomationEngine::with_worker_id(kernel, unique_id("test-worker"));

    TestEngine {
        engine,
        weather,
        meta,
        google,
        pool,
    }
}

pub fn condition(
    parameter: WeatherParameter,
    operator: ConditionOperator,
    value: f64,
    range: Option<f64>,
) -> WeatherCondition {
    WeatherCondition {
        parameter,
        operator,
        value,
        unit: String::new(),
        range,
    }
}

pub fn meta_pause_target(campaign_id: &str, ad_set_id: &str) -> CampaignTarget {
    CampaignTarget {
        platform: AdPlatform::Meta,
        campaign_id: campaign_id.to_string(),
        ad_set_id: Some(ad_set_id.to_string()),
        action: TargetAction::Pause,
        target_type: TargetType::AdSet,
    }
}

pub fn google_pause_target(campaign_id: &str, ad_group_id: &str) -> CampaignTarget {
    CampaignTarget {
        platform: AdPlatform::Google,
        campaign_id: campaign_id.to_string(),
        ad_set_id: Some(ad_group_id.to_string()),
        action: TargetAction::Pause,
        target_type: TargetType::AdSet,
    }
}

/// Build and insert an active rule with a flat condition list.
pub async fn seed_rule(
    pool: &sqlx::PgPool,
    id: &str,
    user_id: &str,
    conditions: Vec<WeatherCondition>,
    campaigns: Vec<CampaignTarget>,
) -> Rule {
    let now = Utc::now();
    let rule = Rule {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: format!("rule {id}"),
        is_active: true,
        lat: 0.0,
        lon: 0.0,
        conditions: Json(conditions),
        condition_logic: None,
        campaigns: Json(campaigns),
        check_interval_minutes: 60,
        last_checked_at: None,
        last_executed_at: None,
        created_at: now,
        updated_at: now,
    };
    rule.insert(pool).await.expect("failed to insert rule");
    rule
}
