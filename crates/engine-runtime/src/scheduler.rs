//! Scheduled background jobs.
//!
//! Tasks declare a five-field cron expression (UTC), a scope, a jitter and a
//! lock key. The runner sleeps to each occurrence, takes the scope lock so
//! concurrent workers cannot race a deployment, and runs the job under the
//! training deadline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::Rng;

use crate::registry::EngineRegistry;

/// Scope a scheduled task operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScope {
    Global,
    Industry,
}

/// A scheduled task definition.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    /// Five-field cron: minute hour day-of-month month day-of-week, UTC.
    pub schedule: String,
    pub scope: TaskScope,
    pub jitter_seconds: u64,
    pub lock_key: String,
}

/// Parsed cron expression. Supports numbers and `*` per field, which covers
/// the daily/weekly cadences the engine schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    minute: Option<u32>,
    hour: Option<u32>,
    day_of_month: Option<u32>,
    month: Option<u32>,
    /// 0 = Sunday, as in conventional cron.
    day_of_week: Option<u32>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Option<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return None;
        }
        let field = |raw: &str, max: u32| -> Option<Option<u32>> {
            if raw == "*" {
                Some(None)
            } else {
                raw.parse::<u32>().ok().filter(|v| *v <= max).map(Some)
            }
        };
        Some(Self {
            minute: field(fields[0], 59)?,
            hour: field(fields[1], 23)?,
            day_of_month: field(fields[2], 31)?,
            month: field(fields[3], 12)?,
            day_of_week: field(fields[4], 6)?,
        })
    }

    fn matches(&self, at: DateTime<Utc>) -> bool {
        self.minute.map_or(true, |m| at.minute() == m)
            && self.hour.map_or(true, |h| at.hour() == h)
            && self.day_of_month.map_or(true, |d| at.day() == d)
            && self.month.map_or(true, |m| at.month() == m)
            && self
                .day_of_week
                .map_or(true, |d| at.weekday().num_days_from_sunday() == d)
    }

    /// Next occurrence strictly after `after`, scanning minute by minute for
    /// up to 366 days.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut probe = (after + chrono::Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;
        for _ in 0..(366 * 24 * 60) {
            if self.matches(probe) {
                return Some(probe);
            }
            probe += chrono::Duration::minutes(1);
        }
        None
    }
}

/// A job run by the scheduler. Boxed-future form so implementations stay
/// object-safe.
pub trait ScheduledJob: Send + Sync {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

pub struct TaskRunner {
    registry: Arc<EngineRegistry>,
    deadline: Duration,
}

impl TaskRunner {
    pub fn new(registry: Arc<EngineRegistry>, deadline: Duration) -> Self {
        Self { registry, deadline }
    }

    /// Spawn the task loop. Each firing takes the task's scope lock, runs
    /// the job under the deadline, and releases the lock on every exit path.
    pub fn spawn(&self, spec: TaskSpec, job: Arc<dyn ScheduledJob>) -> tokio::task::JoinHandle<()> {
        let registry = self.registry.clone();
        let deadline = self.deadline;

        tokio::spawn(async move {
            let schedule = match CronSchedule::parse(&spec.schedule) {
                Some(schedule) => schedule,
                None => {
                    tracing::error!(task = %spec.name, schedule = %spec.schedule, "invalid cron expression");
                    return;
                }
            };

            loop {
                let now = Utc::now();
                let next = match schedule.next_after(now) {
                    Some(next) => next,
                    None => {
                        tracing::error!(task = %spec.name, "no next occurrence; stopping");
                        return;
                    }
                };
                let jitter = if spec.jitter_seconds > 0 {
                    rand::thread_rng().gen_range(0..spec.jitter_seconds)
                } else {
                    0
                };
                let wait = (next - now)
                    .to_std()
                    .unwrap_or(Duration::from_secs(0))
                    + Duration::from_secs(jitter);
                tokio::time::sleep(wait).await;

                let _guard = registry.scoped_lock(&spec.lock_key).await;
                tracing::info!(task = %spec.name, "scheduled task firing");
                match tokio::time::timeout(deadline, job.run()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(task = %spec.name, "task failed: {e}"),
                    Err(_) => {
                        tracing::error!(task = %spec.name, "task exceeded deadline; lock released")
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_daily_and_weekly() {
        let daily = CronSchedule::parse("0 1 * * *").unwrap();
        assert_eq!(daily.minute, Some(0));
        assert_eq!(daily.hour, Some(1));
        assert_eq!(daily.day_of_week, None);

        let weekly = CronSchedule::parse("0 2 * * 1").unwrap();
        assert_eq!(weekly.day_of_week, Some(1));

        assert!(CronSchedule::parse("not a cron").is_none());
        assert!(CronSchedule::parse("61 1 * * *").is_none());
    }

    #[test]
    fn test_next_after_daily() {
        let schedule = CronSchedule::parse("0 1 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 5, 30, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap());

        let before_one = Utc.with_ymd_and_hms(2026, 3, 10, 0, 15, 0).unwrap();
        let same_day = schedule.next_after(before_one).unwrap();
        assert_eq!(same_day, Utc.with_ymd_and_hms(2026, 3, 10, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_next_after_weekly() {
        let schedule = CronSchedule::parse("0 2 * * 1").unwrap();
        // 2026-03-10 is a Tuesday; next Monday is the 16th.
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 16, 2, 0, 0).unwrap());
    }
}
