//! Connection handling for the Redis coordination store.
//!
//! The scheduler and rate limiter share one multiplexed connection manager;
//! it reconnects internally, so callers just clone the handle.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;

/// Connect to the coordination store.
pub async fn connect_coordination(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .with_context(|| format!("invalid redis url {redis_url}"))?;
    let manager = client
        .get_connection_manager()
        .await
        .context("failed to connect to redis coordination store")?;
    Ok(manager)
}
