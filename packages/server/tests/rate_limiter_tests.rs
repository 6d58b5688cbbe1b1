//! Rate limiter behavior against a real Redis: window exhaustion, scoped
//! identifiers, and the retry driver's classification branches.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use redis::AsyncCommands;

use automation_core::kernel::{
    ApiError, BackoffConfig, RateDecision, RateLimiter, ServiceLimit,
};
use common::{unique_id, SharedTestInfra};

/// A limiter whose only service is a tiny test-local window, so tests
/// sharing the container cannot starve each other.
async fn tiny_limiter(max_requests: u32) -> (RateLimiter, String) {
    let infra = SharedTestInfra::get().await;
    let service = unique_id("svc");
    let services = HashMap::from([(
        service.clone(),
        ServiceLimit {
            max_requests,
            window_ms: 60_000,
            default_retry_after_ms: 1_000,
        },
    )]);
    (
        RateLimiter::with_services(infra.redis().await, services),
        service,
    )
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: 10,
        multiplier: 2.0,
        max_delay_ms: 100,
        jitter: false,
    }
}

#[tokio::test]
async fn window_fills_then_refuses() {
    let (limiter, service) = tiny_limiter(3).await;

    for expected_remaining in [2u32, 1, 0] {
        match limiter.check(&service, None).await {
            RateDecision::Allowed { remaining } => assert_eq!(remaining, expected_remaining),
            RateDecision::Limited { .. } => panic!("refused before the window filled"),
        }
    }

    match limiter.check(&service, None).await {
        RateDecision::Limited { retry_after_ms } => {
            assert!(retry_after_ms > 0 && retry_after_ms <= 60_000);
        }
        RateDecision::Allowed { .. } => panic!("window should be exhausted"),
    }

    let usage = limiter.usage(&service, None).await;
    assert_eq!(usage.limit, 3);
    assert!(usage.used >= 3);
}

#[tokio::test]
async fn identifiers_get_separate_windows() {
    let (limiter, service) = tiny_limiter(1).await;

    assert!(matches!(
        limiter.check(&service, Some("user-a")).await,
        RateDecision::Allowed { .. }
    ));
    assert!(matches!(
        limiter.check(&service, Some("user-a")).await,
        RateDecision::Limited { .. }
    ));
    // a different identifier still has budget
    assert!(matches!(
        limiter.check(&service, Some("user-b")).await,
        RateDecision::Allowed { .. }
    ));
}

#[tokio::test]
async fn unknown_services_fail_open() {
    let infra = SharedTestInfra::get().await;
    let limiter = RateLimiter::new(infra.redis().await);
    match limiter.check(&unique_id("never-configured"), None).await {
        RateDecision::Allowed { remaining } => assert_eq!(remaining, u32::MAX),
        RateDecision::Limited { .. } => panic!("unknown services must be allowed"),
    }
}

#[tokio::test]
async fn transient_errors_retry_until_success() {
    let (limiter, service) = tiny_limiter(100).await;
    let attempts = AtomicU32::new(0);

    let result: Result<&str, ApiError> = limiter
        .execute_with_backoff(&service, "op", 3, &fast_backoff(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::new("connection reset by peer").with_status(502))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn terminal_errors_are_not_retried() {
    let (limiter, service) = tiny_limiter(100).await;
    let attempts = AtomicU32::new(0);

    let result: Result<(), ApiError> = limiter
        .execute_with_backoff(&service, "op", 3, &fast_backoff(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::new("invalid parameter").with_status(400)) }
        })
        .await;

    assert_eq!(result.unwrap_err().status, Some(400));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_cause() {
    let (limiter, service) = tiny_limiter(100).await;
    let attempts = AtomicU32::new(0);

    let result: Result<(), ApiError> = limiter
        .execute_with_backoff(&service, "op", 3, &fast_backoff(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::new("upstream timeout").with_status(504)) }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.message.contains("retries exhausted"));
    assert!(err.message.contains("upstream timeout"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limited_errors_persist_a_backoff_gate() {
    let infra = SharedTestInfra::get().await;
    let (limiter, service) = tiny_limiter(100).await;
    let endpoint = "update";

    // Exhaust retries on a 429 that advertises a short Retry-After
    let result: Result<(), ApiError> = limiter
        .execute_with_backoff(&service, endpoint, 2, &fast_backoff(), || async {
            Err(ApiError::new("rate limit exceeded")
                .with_status(429)
                .with_retry_after_ms(200))
        })
        .await;
    assert!(result.is_err());

    let mut conn = infra.redis().await;
    let gate: Option<i64> = conn
        .get(format!("backoff:{service}:{endpoint}"))
        .await
        .unwrap();
    assert!(gate.is_some(), "backoff deadline should be persisted");

    // The next call waits out the gate, succeeds, and clears it
    let result: Result<&str, ApiError> = limiter
        .execute_with_backoff(&service, endpoint, 3, &fast_backoff(), || async { Ok("ok") })
        .await;
    assert_eq!(result.unwrap(), "ok");

    let gate: Option<i64> = conn
        .get(format!("backoff:{service}:{endpoint}"))
        .await
        .unwrap();
    assert!(gate.is_none(), "backoff deadline should be cleared on success");
}

#[tokio::test]
async fn server_retry_after_drives_the_wait() {
    let (limiter, service) = tiny_limiter(100).await;
    let attempts = AtomicU32::new(0);

    let started = std::time::Instant::now();
    let result: Result<&str, ApiError> = limiter
        .execute_with_backoff(&service, "op", 3, &fast_backoff(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::new("too many requests")
                        .with_status(429)
                        .with_retry_after_ms(300))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "recovered");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= std::time::Duration::from_millis(300));
}
