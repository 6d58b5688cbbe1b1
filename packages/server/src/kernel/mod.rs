// Kernel - core infrastructure with dependency injection
//
// The EngineKernel holds the shared stores and external API clients and
// provides dependency injection through traits for testability.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Rule evaluation and action dispatch belong in the domain/engine layers.

pub mod api_error;
pub mod clients;
pub mod clock;
pub mod coordination;
pub mod engine_kernel;
pub mod rate_limiter;
pub mod scheduler;
pub mod test_dependencies;
pub mod traits;
pub mod worker_registry;

pub use api_error::{ApiError, ErrorClass};
pub use clock::{epoch_ms, BackoffConfig};
pub use coordination::connect_coordination;
pub use engine_kernel::EngineKernel;
pub use rate_limiter::{
    RateDecision, RateLimiter, ServiceLimit, ServiceUsage, SERVICE_GOOGLE_ADS, SERVICE_META_ADS,
    SERVICE_WEATHER,
};
pub use scheduler::{ClaimOutcome, Job, JobResult, JobScheduler, JobStats, JobType, LastResult};
pub use test_dependencies::{test_weather, MockGoogleAdsApi, MockMetaAdsApi, MockWeatherApi};
pub use traits::{BaseGoogleAdsApi, BaseMetaAdsApi, BaseWeatherApi};
pub use worker_registry::{WorkerRecord, WorkerRegistry, WorkerStatus};
