//! Runtime wiring: configuration, the process-wide registry, the scheduler
//! and the facade the transport layer calls.

pub mod config;
pub mod jobs;
pub mod registry;
pub mod scheduler;
pub mod suite;
pub mod upstream;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use registry::{with_retries, EngineRegistry};
pub use scheduler::{CronSchedule, ScheduledJob, TaskRunner, TaskScope, TaskSpec};
pub use suite::AnalysisSuite;

/// Install the tracing subscriber for a worker process. Call once at
/// startup, before `EngineRegistry::init`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
