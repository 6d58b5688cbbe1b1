//! Rule model and the condition/target shapes stored inside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

// ============================================================================
// Conditions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherParameter {
    Temperature,
    Humidity,
    WindSpeed,
    Precipitation,
    Visibility,
    CloudCover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    GreaterThan,
    LessThan,
    Equals,
    Between,
}

/// A single threshold on one weather parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub parameter: WeatherParameter,
    pub operator: ConditionOperator,
    pub value: f64,
    /// Display unit captured at rule creation, e.g. "°C" or "%"
    pub unit: String,
    /// Half-width for `between`; defaults to 5 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOperator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// One bracket of conditions combined with a single operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: LogicOperator,
    pub conditions: Vec<WeatherCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrameAction {
    On,
    Off,
}

/// Forecast window attached by the UI. Carried through storage; the
/// current-conditions evaluator does not consume it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub days: u8,
    pub action: TimeFrameAction,
}

/// Nested condition shape: groups of conditions, each group reduced by its
/// own operator, then combined by `global_operator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionLogic {
    pub groups: Vec<ConditionGroup>,
    pub global_operator: LogicOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_frame: Option<TimeFrame>,
}

// ============================================================================
// Targets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdPlatform {
    Meta,
    Google,
}

impl AdPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdPlatform::Meta => "meta",
            AdPlatform::Google => "google",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAction {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[default]
    AdSet,
    Campaign,
}

/// One ad-platform object to pause or resume when conditions are met.
///
/// The ingress surface only accepts ad-set targets; `campaign_id` is kept
/// alongside for audit display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignTarget {
    pub platform: AdPlatform,
    pub campaign_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_set_id: Option<String>,
    pub action: TargetAction,
    #[serde(default)]
    pub target_type: TargetType,
}

impl CampaignTarget {
    pub fn is_ad_set(&self) -> bool {
        self.target_type == TargetType::AdSet
    }
}

// ============================================================================
// Rule
// ============================================================================

/// A persisted automation rule.
///
/// `conditions` is the legacy flat list (AND semantics); newer rules carry
/// `condition_logic` instead, which wins when both are present.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Rule {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub is_active: bool,
    pub lat: f64,
    pub lon: f64,
    pub conditions: Json<Vec<WeatherCondition>>,
    pub condition_logic: Option<Json<ConditionLogic>>,
    pub campaigns: Json<Vec<CampaignTarget>>,
    pub check_interval_minutes: i32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_logic_parses_stored_shape() {
        let logic: ConditionLogic = serde_json::from_value(serde_json::json!({
            "groups": [
                {
                    "operator": "AND",
                    "conditions": [
                        { "parameter": "temperature", "operator": "greater_than", "value": 30.0, "unit": "°C" },
                        { "parameter": "humidity", "operator": "between", "value": 50.0, "unit": "%", "range": 10.0 }
                    ]
                }
            ],
            "global_operator": "OR",
            "time_frame": { "days": 3, "action": "on" }
        }))
        .unwrap();

        assert_eq!(logic.groups.len(), 1);
        assert_eq!(logic.groups[0].operator, LogicOperator::And);
        assert_eq!(
            logic.groups[0].conditions[0].parameter,
            WeatherParameter::Temperature
        );
        assert_eq!(logic.groups[0].conditions[1].range, Some(10.0));
        assert_eq!(logic.time_frame.unwrap().days, 3);
    }

    #[test]
    fn target_defaults_to_ad_set() {
        let target: CampaignTarget = serde_json::from_value(serde_json::json!({
            "platform": "meta",
            "campaign_id": "c1",
            "ad_set_id": "a1",
            "action": "pause"
        }))
        .unwrap();

        assert!(target.is_ad_set());
        assert_eq!(target.platform, AdPlatform::Meta);
        assert_eq!(target.action, TargetAction::Pause);
    }
}
