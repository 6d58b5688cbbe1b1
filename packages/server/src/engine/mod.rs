//! The automation engine: consumes ready jobs, evaluates rules, and
//! dispatches ad-platform actions.
//!
//! # Architecture
//!
//! ```text
//! AutomationEngine.start()
//!     ├─► register worker, schedule all active rules
//!     ├─► processing loop (5 s):  ready_jobs → claim → process_rule
//!     ├─► recovery loop  (5 min): recover_stuck
//!     └─► heartbeat loop (15 s):  registry.heartbeat(current_jobs)
//!
//! process_rule
//!     ├─► load rule, stamp last_checked_at
//!     ├─► fetch weather   (rate limited, 3 attempts)
//!     ├─► evaluate conditions (pure)
//!     ├─► dispatch targets in parallel (rate limited, 2 attempts each)
//!     └─► append execution record, stamp last_executed_at on success
//! ```

mod actions;
#[allow(clippy::module_inception)]
mod engine;
mod error;

pub use engine::{AutomationEngine, EngineStats};
pub use error::{retry_delay_ms, EngineError};
