//! Automation rules: the user-defined directives binding a location,
//! weather conditions, and ad-platform actions.
//!
//! The CRUD surface that creates and edits rules lives in a separate
//! service; this core reads rules, evaluates their conditions, and appends
//! execution records.

pub mod conditions;
mod executions;
mod models;
mod repository;

pub use executions::{ActionResult, ExecutionMetrics, RuleExecution};
pub use models::{
    AdPlatform, CampaignTarget, ConditionGroup, ConditionLogic, ConditionOperator, LogicOperator,
    Rule, TargetAction, TargetType, TimeFrame, TimeFrameAction, WeatherCondition, WeatherParameter,
};
