//! Job model for scheduled rule evaluation.

use serde::{Deserialize, Serialize};

use crate::kernel::clock::epoch_ms;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Kinds of work the scheduler carries. Rule checks are the only kind
/// today; the type tag keeps old records readable if more are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    AutomationRuleCheck,
}

/// A scheduled unit of work: one due evaluation of a rule.
///
/// Serialized as JSON into the `data` field of the `job:<id>` hash.
/// Timestamps are epoch milliseconds, matching the scheduled-set scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub rule_id: String,
    pub user_id: String,
    /// Recurrence interval; the next tick lands this many minutes after
    /// the completion instant.
    pub interval_minutes: u32,
    /// Lower runs sooner when due times tie.
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: i64,
    pub scheduled_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<i64>,
}

impl Job {
    /// Deterministic id for a rule's recurring check, so re-scheduling a
    /// rule updates its one job instead of accumulating duplicates.
    pub fn rule_check_id(rule_id: &str) -> String {
        format!("rule_check_{rule_id}")
    }

    /// A recurring rule-check job due one interval from now.
    pub fn rule_check(rule_id: &str, user_id: &str, interval_minutes: u32) -> Self {
        let now = epoch_ms();
        Self {
            id: Self::rule_check_id(rule_id),
            job_type: JobType::AutomationRuleCheck,
            rule_id: rule_id.to_string(),
            user_id: user_id.to_string(),
            interval_minutes,
            priority: 0,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now,
            scheduled_at: now + interval_minutes as i64 * 60_000,
            last_executed_at: None,
        }
    }

    /// Override the due time (e.g. resuming a rule that is already overdue).
    pub fn with_scheduled_at(mut self, scheduled_at: i64) -> Self {
        self.scheduled_at = scheduled_at.max(self.created_at);
        self
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_minutes as i64 * 60_000
    }
}

/// What a worker reports back when a job finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    /// Terminal failures drop the job instead of retrying.
    pub fatal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Engine-chosen retry delay; the scheduler falls back to its own
    /// exponential ladder when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl JobResult {
    pub fn success() -> Self {
        Self {
            success: true,
            fatal: false,
            error: None,
            retry_after_ms: None,
        }
    }

    pub fn failure(error: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self {
            success: false,
            fatal: false,
            error: Some(error.into()),
            retry_after_ms,
        }
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            success: false,
            fatal: true,
            error: Some(error.into()),
            retry_after_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_check_id_is_deterministic() {
        assert_eq!(Job::rule_check_id("r-42"), "rule_check_r-42");
        assert_eq!(
            Job::rule_check("r-42", "u-1", 60).id,
            Job::rule_check("r-42", "u-9", 30).id
        );
    }

    #[test]
    fn rule_check_is_due_one_interval_out() {
        let job = Job::rule_check("r-1", "u-1", 60);
        assert_eq!(job.scheduled_at - job.created_at, 3_600_000);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn scheduled_at_never_precedes_created_at() {
        let job = Job::rule_check("r-1", "u-1", 5);
        let past = job.created_at - 10_000;
        assert_eq!(job.clone().with_scheduled_at(past).scheduled_at, job.created_at);
    }

    #[test]
    fn job_round_trips_through_json() {
        let job = Job::rule_check("r-1", "u-1", 720);
        let raw = serde_json::to_string(&job).unwrap();
        assert!(raw.contains("automation_rule_check"));
        let parsed: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, job);
    }
}
