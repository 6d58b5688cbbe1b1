//! Database operations for rules.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::models::Rule;

impl Rule {
    pub async fn find_by_id(id: &str, pool: &PgPool) -> Result<Option<Rule>> {
        let rule = sqlx::query_as::<_, Rule>(
            r#"
            SELECT *
            FROM rules
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(rule)
    }

    /// All rules currently eligible for scheduling.
    pub async fn find_active(pool: &PgPool) -> Result<Vec<Rule>> {
        let rules = sqlx::query_as::<_, Rule>(
            r#"
            SELECT *
            FROM rules
            WHERE is_active = TRUE
            ORDER BY created_at
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(rules)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Rule>> {
        let rules = sqlx::query_as::<_, Rule>(
            r#"
            SELECT *
            FROM rules
            ORDER BY created_at
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(rules)
    }

    pub async fn set_last_checked(id: &str, at: DateTime<Utc>, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rules
            SET last_checked_at = $1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_last_executed(id: &str, at: DateTime<Utc>, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rules
            SET last_executed_at = $1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Insert a rule row. The CRUD service owns rule creation in
    /// production; this is used by seeding and tests.
    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rules (
                id, user_id, name, is_active, lat, lon,
                conditions, condition_logic, campaigns,
                check_interval_minutes, last_checked_at, last_executed_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&self.id)
        .bind(&self.user_id)
        .bind(&self.name)
        .bind(self.is_active)
        .bind(self.lat)
        .bind(self.lon)
        .bind(&self.conditions)
        .bind(&self.condition_logic)
        .bind(&self.campaigns)
        .bind(self.check_interval_minutes)
        .bind(self.last_checked_at)
        .bind(self.last_executed_at)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
