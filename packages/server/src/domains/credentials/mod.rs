//! Connected ad-platform accounts.
//!
//! OAuth token acquisition and refresh belong to the accounts service;
//! the engine only reads the latest stored token for a user when it
//! dispatches an action.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domains::rules::AdPlatform;

/// A user's connection to one ad platform.
#[derive(Debug, Clone, FromRow)]
pub struct AdPlatformAccount {
    pub id: Uuid,
    pub user_id: String,
    pub platform: String,
    pub access_token: String,
    pub account_name: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl AdPlatformAccount {
    /// Latest Meta connection for a user.
    pub async fn meta_for(user_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        Self::for_platform(user_id, AdPlatform::Meta, pool).await
    }

    /// Latest Google connection for a user.
    pub async fn google_for(user_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        Self::for_platform(user_id, AdPlatform::Google, pool).await
    }

    async fn for_platform(
        user_id: &str,
        platform: AdPlatform,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let account = sqlx::query_as::<_, AdPlatformAccount>(
            r#"
            SELECT *
            FROM ad_platform_accounts
            WHERE user_id = $1
              AND platform = $2
            ORDER BY connected_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(pool)
        .await?;
        Ok(account)
    }

    /// Insert a connection row (used by seeding and tests).
    pub async fn insert(
        user_id: &str,
        platform: AdPlatform,
        access_token: &str,
        pool: &PgPool,
    ) -> Result<Self> {
        let account = sqlx::query_as::<_, AdPlatformAccount>(
            r#"
            INSERT INTO ad_platform_accounts (id, user_id, platform, access_token, connected_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(platform.as_str())
        .bind(access_token)
        .fetch_one(pool)
        .await?;
        Ok(account)
    }
}
