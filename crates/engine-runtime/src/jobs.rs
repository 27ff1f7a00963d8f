//! Standard background jobs: daily weight training, daily outcome
//! reconciliation, weekly industry refresh.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use weight_trainer::TrainScope;

use crate::config::EngineConfig;
use crate::scheduler::{ScheduledJob, TaskRunner, TaskScope, TaskSpec};
use crate::suite::AnalysisSuite;

/// Daily pipeline: the global scope trains first, then every industry with
/// a deep enough window (thin industries fill by transfer/meta).
pub struct DailyTrainingJob {
    suite: Arc<AnalysisSuite>,
    tenant_id: Uuid,
}

impl DailyTrainingJob {
    pub fn new(suite: Arc<AnalysisSuite>, tenant_id: Uuid) -> Self {
        Self { suite, tenant_id }
    }
}

impl ScheduledJob for DailyTrainingJob {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let outcome = self
                .suite
                .train_scope(self.tenant_id, TrainScope::Global)
                .await?;
            tracing::info!(?outcome, "daily global training done");
            let summary = self.suite.train_industries(self.tenant_id).await?;
            tracing::info!(trained = summary.trained.len(), "daily industry training done");
            let refreshed = self.suite.refresh_weight_network(self.tenant_id).await?;
            tracing::info!(refreshed, "weighting network refresh done");
            Ok(())
        })
    }
}

/// Daily reconciliation of matured predictions.
pub struct ReconcileJob {
    suite: Arc<AnalysisSuite>,
}

impl ReconcileJob {
    pub fn new(suite: Arc<AnalysisSuite>) -> Self {
        Self { suite }
    }
}

impl ScheduledJob for ReconcileJob {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let written = self.suite.reconcile_outcomes(Utc::now()).await?;
            tracing::info!(written, "outcome reconciliation done");
            Ok(())
        })
    }
}

/// Weekly industry maintenance: profiles, meta-learner, per-industry
/// training with gap-fill.
pub struct IndustryRefreshJob {
    suite: Arc<AnalysisSuite>,
    tenant_id: Uuid,
}

impl IndustryRefreshJob {
    pub fn new(suite: Arc<AnalysisSuite>, tenant_id: Uuid) -> Self {
        Self { suite, tenant_id }
    }
}

impl ScheduledJob for IndustryRefreshJob {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let summary = self.suite.refresh_industry_profiles(self.tenant_id).await?;
            tracing::info!(
                trained = summary.trained.len(),
                transferred = summary.transferred.len(),
                meta = summary.meta_filled.len(),
                "industry refresh done"
            );
            Ok(())
        })
    }
}

/// Register the standard schedule for one tenant worker.
pub fn spawn_standard_schedule(
    runner: &TaskRunner,
    suite: Arc<AnalysisSuite>,
    config: &EngineConfig,
    tenant_id: Uuid,
) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        runner.spawn(
            TaskSpec {
                name: "daily-weight-training".into(),
                schedule: config.training_schedule.clone(),
                scope: TaskScope::Global,
                jitter_seconds: config.schedule_jitter_seconds,
                lock_key: "train:global".into(),
            },
            Arc::new(DailyTrainingJob::new(suite.clone(), tenant_id)),
        ),
        runner.spawn(
            TaskSpec {
                name: "daily-outcome-reconciliation".into(),
                schedule: config.training_schedule.clone(),
                scope: TaskScope::Global,
                jitter_seconds: config.schedule_jitter_seconds,
                lock_key: "reconcile".into(),
            },
            Arc::new(ReconcileJob::new(suite.clone())),
        ),
        runner.spawn(
            TaskSpec {
                name: "weekly-industry-refresh".into(),
                schedule: config.industry_refresh_schedule.clone(),
                scope: TaskScope::Industry,
                jitter_seconds: config.schedule_jitter_seconds,
                lock_key: "train:industries".into(),
            },
            Arc::new(IndustryRefreshJob::new(suite, tenant_id)),
        ),
    ]
}
