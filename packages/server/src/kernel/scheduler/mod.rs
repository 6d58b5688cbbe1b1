//! Job scheduling infrastructure over the Redis coordination store.
//!
//! This module provides the persistent time-ordered queue that coordinates
//! rule evaluation across the worker pool:
//! - [`Job`] - serialized job model with the deterministic recurring id
//! - [`JobScheduler`] - scheduled set / processing set / result ledger
//!
//! # Architecture
//!
//! ```text
//! Engine.schedule_rule_check(rule)
//!     │
//!     └─► schedule()  ─► jobs:scheduled (ZSET, score = due time)
//!
//! Worker loop
//!     ├─► ready_jobs()   read due ids, load job:<id> records
//!     ├─► claim()        ZREM from scheduled is the linearization point
//!     ├─► process rule
//!     └─► complete()     next tick / backoff retry / drop, plus
//!                        jobs:results:<id> ledger entry (24 h TTL)
//! ```
//!
//! Workers that die mid-job leave their claim in jobs:processing; the
//! recovery sweep returns anything older than ten minutes to the
//! scheduled set.

mod job;
#[allow(clippy::module_inception)]
mod scheduler;

pub use job::{Job, JobResult, JobType};
pub use scheduler::{ClaimOutcome, JobScheduler, JobStats, LastResult};
