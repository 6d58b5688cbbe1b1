//! Per-target action dispatch against the ad platforms.
//!
//! Targets within one execution run in parallel and never fail each other:
//! a missing account or ad set becomes a failed [`ActionResult`], not an
//! error. Results come back in target-list order regardless of completion
//! order.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

use crate::domains::credentials::AdPlatformAccount;
use crate::domains::rules::{ActionResult, AdPlatform, CampaignTarget, TargetAction};
use crate::kernel::rate_limiter::{SERVICE_GOOGLE_ADS, SERVICE_META_ADS};
use crate::kernel::{BackoffConfig, EngineKernel, RateLimiter};

/// Platform calls retry twice before giving up on a target.
const PLATFORM_MAX_RETRIES: u32 = 2;

pub(crate) struct ActionContext<'a> {
    pub kernel: &'a EngineKernel,
    pub rate_limiter: &'a RateLimiter,
    pub backoff: &'a BackoffConfig,
    pub meta_calls: &'a AtomicU32,
    pub google_calls: &'a AtomicU32,
}

/// Dispatch every target in parallel; results are collected in input order.
pub(crate) async fn dispatch_targets(
    ctx: &ActionContext<'_>,
    user_id: &str,
    targets: &[CampaignTarget],
) -> Vec<ActionResult> {
    let futures = targets
        .iter()
        .map(|target| dispatch_action(ctx, user_id, target));
    futures::future::join_all(futures).await
}

async fn dispatch_action(
    ctx: &ActionContext<'_>,
    user_id: &str,
    target: &CampaignTarget,
) -> ActionResult {
    let mut result = ActionResult {
        campaign_id: target.campaign_id.clone(),
        platform: target.platform,
        action: target.action,
        success: false,
        error_message: None,
        target_type: target.target_type,
        ad_set_id: target.ad_set_id.clone(),
    };

    let outcome = match target.platform {
        AdPlatform::Meta => run_meta_target(ctx, user_id, target).await,
        AdPlatform::Google => run_google_target(ctx, user_id, target).await,
    };

    match outcome {
        Ok(()) => result.success = true,
        Err(message) => {
            warn!(
                user_id = %user_id,
                campaign_id = %target.campaign_id,
                platform = target.platform.as_str(),
                error = %message,
                "target action failed"
            );
            result.error_message = Some(message);
        }
    }
    result
}

async fn run_meta_target(
    ctx: &ActionContext<'_>,
    user_id: &str,
    target: &CampaignTarget,
) -> Result<(), String> {
    let account = AdPlatformAccount::meta_for(user_id, &ctx.kernel.db_pool)
        .await
        .map_err(|e| format!("credential lookup failed: {e}"))?
        .ok_or_else(|| "Meta account not found".to_string())?;
    let token = account.access_token;

    let status = match target.action {
        TargetAction::Pause => meta_ads::DeliveryStatus::Paused,
        TargetAction::Resume => meta_ads::DeliveryStatus::Active,
    };

    let api = &ctx.kernel.meta_ads;
    let calls = ctx.meta_calls;

    if let Some(ad_set_id) = &target.ad_set_id {
        // Validate the ad set exists before touching its status
        let ad_set = ctx
            .rate_limiter
            .execute_with_backoff(SERVICE_META_ADS, "adset_update", PLATFORM_MAX_RETRIES, ctx.backoff, || {
                calls.fetch_add(1, Ordering::SeqCst);
                api.get_ad_set(ad_set_id, &token)
            })
            .await
            .map_err(|e| e.to_string())?;
        if ad_set.is_none() {
            return Err(format!("Meta ad set {ad_set_id} not found"));
        }

        ctx.rate_limiter
            .execute_with_backoff(SERVICE_META_ADS, "adset_update", PLATFORM_MAX_RETRIES, ctx.backoff, || {
                calls.fetch_add(1, Ordering::SeqCst);
                api.update_ad_set_status(ad_set_id, status, &token)
            })
            .await
            .map_err(|e| e.to_string())?;
    } else {
        ctx.rate_limiter
            .execute_with_backoff(SERVICE_META_ADS, "campaign_update", PLATFORM_MAX_RETRIES, ctx.backoff, || {
                calls.fetch_add(1, Ordering::SeqCst);
                api.update_campaign_status(&target.campaign_id, status, &token)
            })
            .await
            .map_err(|e| e.to_string())?;
    }

    Ok(())
}

async fn run_google_target(
    ctx: &ActionContext<'_>,
    user_id: &str,
    target: &CampaignTarget,
) -> Result<(), String> {
    let account = AdPlatformAccount::google_for(user_id, &ctx.kernel.db_pool)
        .await
        .map_err(|e| format!("credential lookup failed: {e}"))?
        .ok_or_else(|| "Google account not found".to_string())?;
    let token = account.access_token;

    let status = match target.action {
        TargetAction::Pause => google_ads::ServingStatus::Paused,
        TargetAction::Resume => google_ads::ServingStatus::Enabled,
    };

    let api = &ctx.kernel.google_ads;
    let calls = ctx.google_calls;

    if let Some(ad_group_id) = &target.ad_set_id {
        ctx.rate_limiter
            .execute_with_backoff(SERVICE_GOOGLE_ADS, "adset_update", PLATFORM_MAX_RETRIES, ctx.backoff, || {
                calls.fetch_add(1, Ordering::SeqCst);
                api.update_ad_group_status(ad_group_id, status, &token)
            })
            .await
            .map_err(|e| e.to_string())?;
    } else {
        ctx.rate_limiter
            .execute_with_backoff(SERVICE_GOOGLE_ADS, "campaign_update", PLATFORM_MAX_RETRIES, ctx.backoff, || {
                calls.fetch_add(1, Ordering::SeqCst);
                api.update_campaign_status(&target.campaign_id, status, &token)
            })
            .await
            .map_err(|e| e.to_string())?;
    }

    Ok(())
}
