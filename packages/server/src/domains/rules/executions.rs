//! Execution records: the immutable audit trail of rule ticks.

use anyhow::Result;
use chrono::{DateTime, Utc};
use openweather::CurrentWeather;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{AdPlatform, TargetAction, TargetType};

/// Outcome of one dispatched target action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub campaign_id: String,
    pub platform: AdPlatform,
    pub action: TargetAction,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub target_type: TargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_set_id: Option<String>,
}

/// Per-execution call and timing counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Weather API attempts (retried attempts count individually)
    pub weather_calls: u32,
    pub meta_api_calls: u32,
    pub google_api_calls: u32,
    pub total_time_ms: u64,
    pub conditions_evaluated: u32,
    pub actions_executed: u32,
}

/// One tick of a rule: what the weather was, whether conditions matched,
/// and what the engine did about it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RuleExecution {
    pub id: Uuid,
    pub rule_id: String,
    pub executed_at: DateTime<Utc>,
    /// Snapshot at evaluation time; NULL when the fetch itself failed
    pub weather_data: Option<Json<CurrentWeather>>,
    pub conditions_met: bool,
    pub actions_taken: Json<Vec<ActionResult>>,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_metrics: Json<ExecutionMetrics>,
}

impl RuleExecution {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rule_id: &str,
        weather_data: Option<CurrentWeather>,
        conditions_met: bool,
        actions_taken: Vec<ActionResult>,
        success: bool,
        error_message: Option<String>,
        execution_metrics: ExecutionMetrics,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule_id.to_string(),
            executed_at: Utc::now(),
            weather_data: weather_data.map(Json),
            conditions_met,
            actions_taken: Json(actions_taken),
            success,
            error_message,
            execution_metrics: Json(execution_metrics),
        }
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rule_executions (
                id, rule_id, executed_at, weather_data, conditions_met,
                actions_taken, success, error_message, execution_metrics
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(self.id)
        .bind(&self.rule_id)
        .bind(self.executed_at)
        .bind(&self.weather_data)
        .bind(self.conditions_met)
        .bind(&self.actions_taken)
        .bind(self.success)
        .bind(&self.error_message)
        .bind(&self.execution_metrics)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Latest executions for a rule, newest first.
    pub async fn recent_for_rule(
        rule_id: &str,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<RuleExecution>> {
        let executions = sqlx::query_as::<_, RuleExecution>(
            r#"
            SELECT *
            FROM rule_executions
            WHERE rule_id = $1
            ORDER BY executed_at DESC
            LIMIT $2
            "#,
        )
        .bind(rule_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(executions)
    }
}
