use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::types::{
    CompanyInfo, IndustryProfile, MarketSnapshot, PredictionOutcome, PredictionRecord,
    ScoredPrediction, StatementSet, WeightOwner, WeightVector,
};

/// Source of company master data. External collaborator; read-only.
#[async_trait]
pub trait CompanyProvider: Send + Sync {
    async fn company(&self, company_id: Uuid) -> EngineResult<CompanyInfo>;
    async fn companies_in_industry(&self, industry: &str) -> EngineResult<Vec<CompanyInfo>>;
    async fn all_companies(&self, tenant_id: Uuid) -> EngineResult<Vec<CompanyInfo>>;
}

/// Source of financial statements. External collaborator; read-only.
#[async_trait]
pub trait StatementProvider: Send + Sync {
    /// Latest statements at or before `as_of`, plus the prior period.
    async fn statements(&self, company_id: Uuid, as_of: NaiveDate) -> EngineResult<StatementSet>;

    /// Historical values of a named statement metric, oldest first.
    async fn metric_history(
        &self,
        company_id: Uuid,
        metric: &str,
        periods: usize,
    ) -> EngineResult<Vec<f64>>;
}

/// Source of market prices. External collaborator; read-only.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn snapshot(&self, company_id: Uuid, as_of: NaiveDate) -> EngineResult<MarketSnapshot>;

    /// Close on the given date, snapping backwards to the latest prior
    /// trading day with data.
    async fn close_on(
        &self,
        company_id: Uuid,
        date: NaiveDate,
    ) -> EngineResult<rust_decimal::Decimal>;
}

/// Industry-level medians for the multiple-based models and scorer.
#[async_trait]
pub trait IndustryStatsProvider: Send + Sync {
    /// Median of a named metric (e.g. "ps_ratio", "pcf_ratio", "pe_ratio")
    /// across the industry, or None when unavailable.
    async fn median(&self, industry: &str, metric: &str) -> EngineResult<Option<f64>>;
}

/// Macro inputs per (country, as_of). External collaborator; read-only.
#[async_trait]
pub trait MacroProvider: Send + Sync {
    async fn risk_free_rate(&self, as_of: NaiveDate) -> EngineResult<f64>;
    async fn equity_risk_premium(&self, as_of: NaiveDate) -> EngineResult<f64>;
    async fn effective_tax_rate(&self, as_of: NaiveDate) -> EngineResult<f64>;
}

/// Append-only store of weight vectors. Owned by the core.
#[async_trait]
pub trait WeightRepository: Send + Sync {
    /// The single active vector for the owner, if any.
    async fn active_for(&self, owner: &WeightOwner) -> EngineResult<Option<WeightVector>>;

    /// Append a new vector row. Never mutates existing rows.
    async fn append(&self, vector: &WeightVector) -> EngineResult<()>;

    /// Close out the currently-active vector (sets effective_to, marks
    /// Retired) and append `replacement` as Active, atomically per owner.
    async fn activate(
        &self,
        owner: &WeightOwner,
        replacement: &WeightVector,
        now: DateTime<Utc>,
    ) -> EngineResult<()>;

    async fn history(&self, owner: &WeightOwner, limit: usize) -> EngineResult<Vec<WeightVector>>;
}

/// Append-only prediction/outcome log. Owned by the core.
#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn record(&self, prediction: &PredictionRecord) -> EngineResult<()>;

    async fn record_outcome(&self, outcome: &PredictionOutcome) -> EngineResult<()>;

    /// Predictions past their horizon with no outcome yet, as of `until`.
    async fn pending(&self, until: DateTime<Utc>) -> EngineResult<Vec<PredictionRecord>>;

    /// Scored prediction/outcome pairs for a scope over the trailing window.
    /// `industry: None` means the global scope.
    async fn window(
        &self,
        tenant_id: Uuid,
        industry: Option<&str>,
        days: i64,
    ) -> EngineResult<Vec<ScoredPrediction>>;
}

/// Industry profiles, overwritten on refresh. Owned by the core.
#[async_trait]
pub trait IndustryProfileRepository: Send + Sync {
    async fn upsert(&self, profile: &IndustryProfile) -> EngineResult<()>;
    async fn get(&self, industry: &str) -> EngineResult<Option<IndustryProfile>>;
    async fn all(&self) -> EngineResult<Vec<IndustryProfile>>;
}
