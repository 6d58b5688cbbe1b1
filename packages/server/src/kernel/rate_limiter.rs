//! Distributed rate limiting and retry driving for outbound API calls.
//!
//! Every external call the engine makes goes through [`RateLimiter`]:
//! a per-service sliding window shared across workers via Redis, plus an
//! exponential-backoff retry loop that honors server `Retry-After` hints
//! and persists a per-endpoint backoff deadline so sibling workers stop
//! hammering a service that already told one of us to slow down.
//!
//! The limiter is deliberately fail-open: if Redis is unreachable the
//! request is allowed with a warning. Losing throttling for a few seconds
//! is cheaper than stalling every rule evaluation.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::api_error::{ApiError, ErrorClass};
use super::clock::{epoch_ms, BackoffConfig};

/// Service name for Meta Marketing API calls.
pub const SERVICE_META_ADS: &str = "meta_ads";
/// Service name for Google Ads API calls.
pub const SERVICE_GOOGLE_ADS: &str = "google_ads";
/// Service name for OpenWeather calls.
pub const SERVICE_WEATHER: &str = "weather";

/// Sliding-window budget for one named service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceLimit {
    pub max_requests: u32,
    pub window_ms: u64,
    pub default_retry_after_ms: u64,
}

fn default_services() -> HashMap<String, ServiceLimit> {
    HashMap::from([
        (
            SERVICE_META_ADS.to_string(),
            ServiceLimit {
                max_requests: 200,
                window_ms: 3_600_000,
                default_retry_after_ms: 3_600_000,
            },
        ),
        (
            SERVICE_GOOGLE_ADS.to_string(),
            ServiceLimit {
                max_requests: 10_000,
                window_ms: 86_400_000,
                default_retry_after_ms: 300_000,
            },
        ),
        (
            SERVICE_WEATHER.to_string(),
            ServiceLimit {
                max_requests: 1_000,
                window_ms: 86_400_000,
                default_retry_after_ms: 60_000,
            },
        ),
    ])
}

/// Outcome of a window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_ms: u64 },
}

/// Point-in-time usage for one service window, for stats surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceUsage {
    pub service: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    redis: ConnectionManager,
    services: HashMap<String, ServiceLimit>,
}

impl RateLimiter {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            services: default_services(),
        }
    }

    /// Replace the service table. Used by tests to shrink windows.
    pub fn with_services(redis: ConnectionManager, services: HashMap<String, ServiceLimit>) -> Self {
        Self { redis, services }
    }

    /// Check and consume one slot in the service's sliding window.
    ///
    /// Unknown services and coordination-store failures both fail open.
    pub async fn check(&self, service: &str, identifier: Option<&str>) -> RateDecision {
        let Some(limit) = self.services.get(service).copied() else {
            warn!(service = %service, "no rate limit configured for service, allowing request");
            return RateDecision::Allowed {
                remaining: u32::MAX,
            };
        };

        match self.check_window(service, identifier, limit).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    service = %service,
                    error = %e,
                    "rate limit check failed, allowing request"
                );
                RateDecision::Allowed { remaining: 0 }
            }
        }
    }

    async fn check_window(
        &self,
        service: &str,
        identifier: Option<&str>,
        limit: ServiceLimit,
    ) -> Result<RateDecision, redis::RedisError> {
        let key = window_key(service, identifier);
        let now = epoch_ms();
        let window_start = now - limit.window_ms as i64;
        // Timestamp plus uuid keeps concurrent marks from colliding
        let member = format!("{}-{}", now, Uuid::new_v4());

        let mut conn = self.redis.clone();
        let (_, count, _, _): (i64, u32, i64, i64) = redis::pipe()
            .atomic()
            .zrembyscore(&key, 0, window_start)
            .zcard(&key)
            .zadd(&key, member.as_str(), now)
            .pexpire(&key, limit.window_ms as i64)
            .query_async(&mut conn)
            .await?;

        if count >= limit.max_requests {
            let retry_after_ms = self
                .window_reset_ms(&key, limit, now)
                .await
                .unwrap_or(limit.default_retry_after_ms);
            return Ok(RateDecision::Limited { retry_after_ms });
        }

        Ok(RateDecision::Allowed {
            remaining: limit.max_requests.saturating_sub(count + 1),
        })
    }

    /// Time until the oldest mark ages out of the window.
    async fn window_reset_ms(&self, key: &str, limit: ServiceLimit, now: i64) -> Option<u64> {
        let mut conn = self.redis.clone();
        let oldest: Vec<(String, i64)> = conn.zrange_withscores(key, 0, 0).await.ok()?;
        let (_, score) = oldest.first()?;
        let reset = score + limit.window_ms as i64 - now;
        if reset > 0 {
            Some(reset as u64)
        } else {
            None
        }
    }

    /// Current window usage without consuming a slot.
    pub async fn usage(&self, service: &str, identifier: Option<&str>) -> ServiceUsage {
        let limit = self.services.get(service).copied();
        let used = match limit {
            Some(limit) => self
                .count_window(service, identifier, limit)
                .await
                .unwrap_or(0),
            None => 0,
        };
        let max = limit.map(|l| l.max_requests).unwrap_or(0);
        ServiceUsage {
            service: service.to_string(),
            used,
            limit: max,
            remaining: max.saturating_sub(used),
        }
    }

    async fn count_window(
        &self,
        service: &str,
        identifier: Option<&str>,
        limit: ServiceLimit,
    ) -> Result<u32, redis::RedisError> {
        let key = window_key(service, identifier);
        let now = epoch_ms();
        let mut conn = self.redis.clone();
        let (_, count): (i64, u32) = redis::pipe()
            .atomic()
            .zrembyscore(&key, 0, now - limit.window_ms as i64)
            .zcard(&key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// Usage across every configured service, sorted by name for stable output.
    pub async fn usage_snapshot(&self) -> Vec<ServiceUsage> {
        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        let mut snapshot = Vec::with_capacity(names.len());
        for name in names {
            snapshot.push(self.usage(name, None).await);
        }
        snapshot
    }

    /// Run `call` under the service's rate limit with retries.
    ///
    /// Each attempt first consults the persisted backoff deadline and the
    /// sliding window; a refusal sleeps out the advertised wait and consumes
    /// one attempt. Failures are classified: rate-limit errors persist a
    /// backoff deadline for sibling workers, transient errors back off
    /// exponentially, terminal errors are returned immediately.
    pub async fn execute_with_backoff<T, F, Fut>(
        &self,
        service: &str,
        endpoint: &str,
        max_retries: u32,
        backoff: &BackoffConfig,
        mut call: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut last_error: Option<ApiError> = None;

        for attempt in 1..=max_retries.max(1) {
            if let Some(wait_ms) = self.backoff_gate_wait(service, endpoint).await {
                debug!(
                    service = %service,
                    endpoint = %endpoint,
                    wait_ms,
                    "backoff gate active, waiting"
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                continue;
            }

            if let RateDecision::Limited { retry_after_ms } = self.check(service, None).await {
                warn!(
                    service = %service,
                    endpoint = %endpoint,
                    retry_after_ms,
                    attempt,
                    "rate limit window exhausted, waiting"
                );
                tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                continue;
            }

            match call().await {
                Ok(value) => {
                    self.clear_backoff(service, endpoint).await;
                    return Ok(value);
                }
                Err(err) => {
                    let class = err.classify();
                    match class {
                        ErrorClass::Terminal => return Err(err),
                        ErrorClass::RateLimited => {
                            let delay_ms = err
                                .retry_after_ms
                                .unwrap_or_else(|| backoff.delay_for_attempt(attempt));
                            warn!(
                                service = %service,
                                endpoint = %endpoint,
                                attempt,
                                delay_ms,
                                error = %err,
                                "rate limited by service, backing off"
                            );
                            self.set_backoff(service, endpoint, delay_ms).await;
                            last_error = Some(err);
                            if attempt < max_retries {
                                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                            }
                        }
                        ErrorClass::Retryable => {
                            let delay_ms = backoff.delay_for_attempt(attempt);
                            warn!(
                                service = %service,
                                endpoint = %endpoint,
                                attempt,
                                delay_ms,
                                error = %err,
                                "transient error, retrying"
                            );
                            last_error = Some(err);
                            if attempt < max_retries {
                                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                            }
                        }
                    }
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            ApiError::new(format!("{service} rate limit window never opened"))
        });
        Err(ApiError::retries_exhausted(service, max_retries, last))
    }

    /// Remaining wait for the persisted per-endpoint backoff deadline.
    async fn backoff_gate_wait(&self, service: &str, endpoint: &str) -> Option<u64> {
        let key = backoff_key(service, endpoint);
        let mut conn = self.redis.clone();
        match conn.get::<_, Option<i64>>(&key).await {
            Ok(Some(until)) => {
                let now = epoch_ms();
                if until > now {
                    Some((until - now) as u64)
                } else {
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "backoff gate read failed, allowing request");
                None
            }
        }
    }

    async fn set_backoff(&self, service: &str, endpoint: &str, delay_ms: u64) {
        let key = backoff_key(service, endpoint);
        let until = epoch_ms() + delay_ms as i64;
        let mut conn = self.redis.clone();
        let result: Result<(), redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg(until)
            .arg("PX")
            .arg(delay_ms)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(key = %key, error = %e, "failed to persist backoff deadline");
        }
    }

    async fn clear_backoff(&self, service: &str, endpoint: &str) {
        let key = backoff_key(service, endpoint);
        let mut conn = self.redis.clone();
        let result: Result<i64, redis::RedisError> = conn.del(&key).await;
        if let Err(e) = result {
            warn!(key = %key, error = %e, "failed to clear backoff deadline");
        }
    }
}

fn window_key(service: &str, identifier: Option<&str>) -> String {
    format!("ratelimit:{}:{}", service, identifier.unwrap_or("default"))
}

fn backoff_key(service: &str, endpoint: &str) -> String {
    format!("backoff:{}:{}", service, endpoint)
}
