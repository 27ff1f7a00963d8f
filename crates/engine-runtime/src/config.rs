use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Runtime configuration, loaded from the environment with sane defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prediction horizon when the caller does not specify one.
    pub default_horizon_days: i64,

    // Deadlines
    pub request_deadline_secs: u64,   // 30
    pub training_deadline_secs: u64,  // 900

    // Training cadence (cron, UTC)
    pub training_schedule: String,        // "0 1 * * *"
    pub industry_refresh_schedule: String, // "0 2 * * 1"
    pub schedule_jitter_seconds: u64,

    // Upstream circuit breaker
    pub upstream_max_attempts: u32,   // 3
    pub upstream_backoff_ms: u64,     // 250, doubled per attempt
    pub breaker_cooloff_secs: u64,

    /// Statements older than this many days mark results stale.
    pub stale_statement_days: i64,

    /// SQLite database URL for the core-owned tables.
    pub database_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_horizon_days: 90,
            request_deadline_secs: 30,
            training_deadline_secs: 900,
            training_schedule: "0 1 * * *".to_string(),
            industry_refresh_schedule: "0 2 * * 1".to_string(),
            schedule_jitter_seconds: 30,
            upstream_max_attempts: 3,
            upstream_backoff_ms: 250,
            breaker_cooloff_secs: 300,
            stale_statement_days: 540,
            database_url: "sqlite://valuation.db".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Ok(Self {
            default_horizon_days: env_parse("DEFAULT_HORIZON_DAYS", defaults.default_horizon_days),
            request_deadline_secs: env_parse("REQUEST_DEADLINE_SECS", defaults.request_deadline_secs),
            training_deadline_secs: env_parse("TRAINING_DEADLINE_SECS", defaults.training_deadline_secs),
            training_schedule: env::var("TRAINING_SCHEDULE")
                .unwrap_or(defaults.training_schedule),
            industry_refresh_schedule: env::var("INDUSTRY_REFRESH_SCHEDULE")
                .unwrap_or(defaults.industry_refresh_schedule),
            schedule_jitter_seconds: env_parse("SCHEDULE_JITTER_SECONDS", defaults.schedule_jitter_seconds),
            upstream_max_attempts: env_parse("UPSTREAM_MAX_ATTEMPTS", defaults.upstream_max_attempts),
            upstream_backoff_ms: env_parse("UPSTREAM_BACKOFF_MS", defaults.upstream_backoff_ms),
            breaker_cooloff_secs: env_parse("BREAKER_COOLOFF_SECS", defaults.breaker_cooloff_secs),
            stale_statement_days: env_parse("STALE_STATEMENT_DAYS", defaults.stale_statement_days),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        })
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }

    pub fn training_deadline(&self) -> Duration {
        Duration::from_secs(self.training_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_horizon_days, 90);
        assert_eq!(config.request_deadline(), Duration::from_secs(30));
        assert_eq!(config.training_deadline(), Duration::from_secs(900));
        assert_eq!(config.training_schedule, "0 1 * * *");
    }
}
