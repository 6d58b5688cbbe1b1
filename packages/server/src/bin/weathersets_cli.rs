//! Operations CLI for the automation engine.
//!
//! `start-worker` runs a full engine until interrupted; the remaining
//! commands are thin one-shot wrappers over the stores for operators and
//! scripts. Output is JSON. Exits 0 on success, 1 on failure.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::PgPool;

use automation_core::config::Config;
use automation_core::domains::rules::{Rule, RuleExecution};
use automation_core::engine::AutomationEngine;
use automation_core::kernel::{
    connect_coordination, EngineKernel, JobScheduler, RateLimiter, WorkerRegistry, WorkerStatus,
};

#[derive(Parser)]
#[command(name = "weathersets")]
#[command(about = "Weather-triggered ad automation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker until interrupted
    StartWorker,

    /// Flag a worker as stopping (it drains and exits on its own)
    StopWorker { worker_id: String },

    /// List registered workers, newest first
    ListWorkers,

    /// List all automation rules
    ListRules,

    /// Schedule (or reschedule) a rule's recurring check
    ScheduleRule {
        rule_id: String,
        user_id: String,
        /// Check interval in minutes
        #[arg(default_value_t = 60)]
        interval: u32,
    },

    /// Run a rule's pipeline immediately, bypassing the scheduler
    RunRule { rule_id: String },

    /// List scheduled jobs, soonest first
    ListJobs,

    /// Job queue depth counters
    JobStats,

    /// Rate limit window usage per service
    RateLimitStats,

    /// Dry-run a rule: evaluate conditions without touching the platforms
    TestRule { rule_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // clap exits 2 on usage errors by default; ops scripts expect 1
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e)
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };
    let config = Config::from_env()?;

    match cli.command {
        Commands::StartWorker => start_worker(config).await,
        Commands::StopWorker { worker_id } => {
            let pool = connect_pg(&config).await?;
            WorkerRegistry::set_status_for(&pool, &worker_id, WorkerStatus::Stopping).await?;
            println!("{{\"worker_id\":\"{worker_id}\",\"status\":\"stopping\"}}");
            Ok(())
        }
        Commands::ListWorkers => {
            let pool = connect_pg(&config).await?;
            let workers = WorkerRegistry::list_workers(&pool).await?;
            print_json(&workers)
        }
        Commands::ListRules => {
            let pool = connect_pg(&config).await?;
            let rules = Rule::list_all(&pool).await?;
            print_json(&rules)
        }
        Commands::ScheduleRule {
            rule_id,
            user_id,
            interval,
        } => {
            let scheduler = connect_scheduler(&config).await?;
            let job = automation_core::kernel::Job::rule_check(&rule_id, &user_id, interval);
            scheduler.schedule(&job).await?;
            print_json(&job)
        }
        Commands::RunRule { rule_id } => {
            let engine = build_engine(config).await?;
            let record = engine
                .run_rule_once(&rule_id)
                .await
                .map_err(anyhow::Error::from)?;
            match record {
                Some(record) => print_json::<RuleExecution>(&record),
                None => {
                    println!("{{\"rule_id\":\"{rule_id}\",\"skipped\":\"rule inactive\"}}");
                    Ok(())
                }
            }
        }
        Commands::ListJobs => {
            let scheduler = connect_scheduler(&config).await?;
            let jobs = scheduler.list_scheduled(100).await?;
            print_json(&jobs)
        }
        Commands::JobStats => {
            let scheduler = connect_scheduler(&config).await?;
            print_json(&scheduler.stats().await?)
        }
        Commands::RateLimitStats => {
            let redis = connect_coordination(&config.redis_url).await?;
            let limiter = RateLimiter::new(redis);
            print_json(&limiter.usage_snapshot().await)
        }
        Commands::TestRule { rule_id } => {
            let engine = build_engine(config).await?;
            let record = engine
                .test_rule(&rule_id)
                .await
                .map_err(anyhow::Error::from)?;
            print_json(&record)
        }
    }
}

async fn start_worker(config: Config) -> Result<()> {
    let kernel = EngineKernel::connect(config).await?;
    sqlx::migrate!("./migrations")
        .run(&kernel.db_pool)
        .await
        .context("failed to run migrations")?;

    let engine = AutomationEngine::new(kernel);
    std::sync::Arc::clone(&engine).start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    engine.stop().await
}

async fn build_engine(config: Config) -> Result<std::sync::Arc<AutomationEngine>> {
    let kernel = EngineKernel::connect(config).await?;
    Ok(AutomationEngine::new(kernel))
}

async fn connect_pg(config: &Config) -> Result<PgPool> {
    PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to database")
}

async fn connect_scheduler(config: &Config) -> Result<JobScheduler> {
    let redis = connect_coordination(&config.redis_url).await?;
    Ok(JobScheduler::new(redis))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
