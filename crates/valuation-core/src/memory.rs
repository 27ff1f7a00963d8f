//! In-memory providers and repositories.
//!
//! These back the test fixtures and double as the cached-input fallback the
//! circuit breaker falls through to when an upstream stays down.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::traits::*;
use crate::types::*;

/// A self-contained dataset serving every read-only provider trait.
#[derive(Debug, Default)]
pub struct StaticDataSet {
    pub companies: HashMap<Uuid, CompanyInfo>,
    pub statements: HashMap<Uuid, StatementSet>,
    pub metric_histories: HashMap<(Uuid, String), Vec<f64>>,
    pub snapshots: HashMap<Uuid, MarketSnapshot>,
    pub closes: HashMap<(Uuid, NaiveDate), Decimal>,
    pub industry_medians: HashMap<(String, String), f64>,
    pub risk_free_rate: f64,
    pub equity_risk_premium: f64,
    pub tax_rate: f64,
}

impl StaticDataSet {
    pub fn new() -> Self {
        Self {
            risk_free_rate: 0.045,
            equity_risk_premium: 0.055,
            tax_rate: 0.21,
            ..Default::default()
        }
    }

    pub fn add_company(&mut self, company: CompanyInfo) -> &mut Self {
        self.companies.insert(company.id, company);
        self
    }

    pub fn set_statements(&mut self, company_id: Uuid, set: StatementSet) -> &mut Self {
        self.statements.insert(company_id, set);
        self
    }

    pub fn set_snapshot(&mut self, company_id: Uuid, snapshot: MarketSnapshot) -> &mut Self {
        self.snapshots.insert(company_id, snapshot);
        self
    }

    pub fn set_median(&mut self, industry: &str, metric: &str, value: f64) -> &mut Self {
        self.industry_medians
            .insert((industry.to_string(), metric.to_string()), value);
        self
    }

    pub fn set_metric_history(
        &mut self,
        company_id: Uuid,
        metric: &str,
        values: Vec<f64>,
    ) -> &mut Self {
        self.metric_histories
            .insert((company_id, metric.to_string()), values);
        self
    }
}

#[async_trait]
impl CompanyProvider for StaticDataSet {
    async fn company(&self, company_id: Uuid) -> EngineResult<CompanyInfo> {
        self.companies
            .get(&company_id)
            .cloned()
            .ok_or_else(|| EngineError::InsufficientData(format!("unknown company {company_id}")))
    }

    async fn companies_in_industry(&self, industry: &str) -> EngineResult<Vec<CompanyInfo>> {
        Ok(self
            .companies
            .values()
            .filter(|c| c.industry == industry)
            .cloned()
            .collect())
    }

    async fn all_companies(&self, _tenant_id: Uuid) -> EngineResult<Vec<CompanyInfo>> {
        let mut companies: Vec<CompanyInfo> = self.companies.values().cloned().collect();
        companies.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(companies)
    }
}

#[async_trait]
impl StatementProvider for StaticDataSet {
    async fn statements(&self, company_id: Uuid, _as_of: NaiveDate) -> EngineResult<StatementSet> {
        self.statements.get(&company_id).cloned().ok_or_else(|| {
            EngineError::InsufficientData(format!("no statements for company {company_id}"))
        })
    }

    async fn metric_history(
        &self,
        company_id: Uuid,
        metric: &str,
        periods: usize,
    ) -> EngineResult<Vec<f64>> {
        let values = self
            .metric_histories
            .get(&(company_id, metric.to_string()))
            .cloned()
            .unwrap_or_default();
        let start = values.len().saturating_sub(periods);
        Ok(values[start..].to_vec())
    }
}

#[async_trait]
impl MarketDataProvider for StaticDataSet {
    async fn snapshot(&self, company_id: Uuid, _as_of: NaiveDate) -> EngineResult<MarketSnapshot> {
        self.snapshots.get(&company_id).cloned().ok_or_else(|| {
            EngineError::InsufficientData(format!("no market data for company {company_id}"))
        })
    }

    async fn close_on(&self, company_id: Uuid, date: NaiveDate) -> EngineResult<Decimal> {
        // Snap backwards up to ten calendar days to the latest close.
        let mut probe = date;
        for _ in 0..10 {
            if let Some(close) = self.closes.get(&(company_id, probe)) {
                return Ok(*close);
            }
            probe = probe.pred_opt().ok_or_else(|| {
                EngineError::InsufficientData("date underflow in close lookup".into())
            })?;
        }
        Err(EngineError::InsufficientData(format!(
            "no close for company {company_id} near {date}"
        )))
    }
}

#[async_trait]
impl IndustryStatsProvider for StaticDataSet {
    async fn median(&self, industry: &str, metric: &str) -> EngineResult<Option<f64>> {
        Ok(self
            .industry_medians
            .get(&(industry.to_string(), metric.to_string()))
            .copied())
    }
}

#[async_trait]
impl MacroProvider for StaticDataSet {
    async fn risk_free_rate(&self, _as_of: NaiveDate) -> EngineResult<f64> {
        Ok(self.risk_free_rate)
    }

    async fn equity_risk_premium(&self, _as_of: NaiveDate) -> EngineResult<f64> {
        Ok(self.equity_risk_premium)
    }

    async fn effective_tax_rate(&self, _as_of: NaiveDate) -> EngineResult<f64> {
        Ok(self.tax_rate)
    }
}

/// Append-only in-memory weight store with per-owner active tracking.
#[derive(Debug, Default)]
pub struct InMemoryWeightRepository {
    rows: RwLock<Vec<WeightVector>>,
}

impl InMemoryWeightRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WeightRepository for InMemoryWeightRepository {
    async fn active_for(&self, owner: &WeightOwner) -> EngineResult<Option<WeightVector>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| EngineError::Storage("weight store poisoned".into()))?;
        Ok(rows
            .iter()
            .filter(|v| &v.owner == owner && v.deployed == DeploymentState::Active)
            .max_by_key(|v| v.effective_from)
            .cloned())
    }

    async fn append(&self, vector: &WeightVector) -> EngineResult<()> {
        if !vector.is_simplex(1e-6) && vector.deployed == DeploymentState::Active {
            return Err(EngineError::InvariantViolation(format!(
                "weights do not sum to 1 for owner {}",
                vector.owner.cache_key()
            )));
        }
        let mut rows = self
            .rows
            .write()
            .map_err(|_| EngineError::Storage("weight store poisoned".into()))?;
        rows.push(vector.clone());
        Ok(())
    }

    async fn activate(
        &self,
        owner: &WeightOwner,
        replacement: &WeightVector,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if !replacement.is_simplex(1e-6) {
            return Err(EngineError::InvariantViolation(format!(
                "weights do not sum to 1 for owner {}",
                owner.cache_key()
            )));
        }
        let mut rows = self
            .rows
            .write()
            .map_err(|_| EngineError::Storage("weight store poisoned".into()))?;
        for row in rows.iter_mut() {
            if &row.owner == owner && row.deployed == DeploymentState::Active {
                row.deployed = DeploymentState::Retired;
                row.effective_to = Some(now);
            }
        }
        let mut active = replacement.clone();
        active.deployed = DeploymentState::Active;
        active.effective_from = now;
        active.effective_to = None;
        rows.push(active);
        Ok(())
    }

    async fn history(&self, owner: &WeightOwner, limit: usize) -> EngineResult<Vec<WeightVector>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| EngineError::Storage("weight store poisoned".into()))?;
        let mut matching: Vec<WeightVector> = rows
            .iter()
            .filter(|v| &v.owner == owner)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.effective_from.cmp(&a.effective_from));
        matching.truncate(limit);
        Ok(matching)
    }
}

/// Append-only in-memory prediction log.
#[derive(Debug, Default)]
pub struct InMemoryPredictionRepository {
    predictions: DashMap<Uuid, PredictionRecord>,
    outcomes: DashMap<Uuid, PredictionOutcome>,
}

impl InMemoryPredictionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionRepository for InMemoryPredictionRepository {
    async fn record(&self, prediction: &PredictionRecord) -> EngineResult<()> {
        self.predictions.insert(prediction.id, prediction.clone());
        Ok(())
    }

    async fn record_outcome(&self, outcome: &PredictionOutcome) -> EngineResult<()> {
        if !self.predictions.contains_key(&outcome.prediction_id) {
            return Err(EngineError::InvariantViolation(format!(
                "outcome for unknown prediction {}",
                outcome.prediction_id
            )));
        }
        if self.outcomes.contains_key(&outcome.prediction_id) {
            return Err(EngineError::InvariantViolation(format!(
                "duplicate outcome for prediction {}",
                outcome.prediction_id
            )));
        }
        self.outcomes.insert(outcome.prediction_id, outcome.clone());
        Ok(())
    }

    async fn pending(&self, until: DateTime<Utc>) -> EngineResult<Vec<PredictionRecord>> {
        let mut pending: Vec<PredictionRecord> = self
            .predictions
            .iter()
            .filter(|entry| {
                let matured =
                    entry.issued_at + chrono::Duration::days(entry.horizon_days) <= until;
                matured && !self.outcomes.contains_key(&entry.id)
            })
            .map(|entry| entry.clone())
            .collect();
        pending.sort_by_key(|p| p.issued_at);
        Ok(pending)
    }

    async fn window(
        &self,
        tenant_id: Uuid,
        industry: Option<&str>,
        days: i64,
    ) -> EngineResult<Vec<ScoredPrediction>> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut pairs: Vec<ScoredPrediction> = self
            .predictions
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.issued_at >= cutoff)
            .filter(|p| industry.map_or(true, |ind| p.industry == ind))
            .filter_map(|p| {
                self.outcomes.get(&p.id).map(|o| ScoredPrediction {
                    prediction: p.clone(),
                    outcome: o.clone(),
                })
            })
            .collect();
        pairs.sort_by_key(|p| p.prediction.issued_at);
        Ok(pairs)
    }
}

/// Industry profile table, overwritten on refresh.
#[derive(Debug, Default)]
pub struct InMemoryProfileRepository {
    profiles: DashMap<String, IndustryProfile>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndustryProfileRepository for InMemoryProfileRepository {
    async fn upsert(&self, profile: &IndustryProfile) -> EngineResult<()> {
        self.profiles.insert(profile.industry.clone(), profile.clone());
        Ok(())
    }

    async fn get(&self, industry: &str) -> EngineResult<Option<IndustryProfile>> {
        Ok(self.profiles.get(industry).map(|p| p.clone()))
    }

    async fn all(&self) -> EngineResult<Vec<IndustryProfile>> {
        let mut profiles: Vec<IndustryProfile> =
            self.profiles.iter().map(|p| p.clone()).collect();
        profiles.sort_by(|a, b| a.industry.cmp(&b.industry));
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_weight_activation_retires_prior() {
        let repo = InMemoryWeightRepository::new();
        let owner = WeightOwner::global();
        let now = Utc::now();

        let first = WeightVector::default_vector(owner.clone(), now);
        repo.activate(&owner, &first, now).await.unwrap();

        let mut second = WeightVector::default_vector(owner.clone(), now);
        second.weights = [0.30, 0.10, 0.15, 0.12, 0.10, 0.08, 0.05, 0.10];
        repo.activate(&owner, &second, now + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let active = repo.active_for(&owner).await.unwrap().unwrap();
        assert!((active.weights[0] - 0.30).abs() < 1e-12);

        let history = repo.history(&owner, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        let retired = history
            .iter()
            .filter(|v| v.deployed == DeploymentState::Retired)
            .count();
        assert_eq!(retired, 1);
    }

    #[tokio::test]
    async fn test_activation_rejects_broken_simplex() {
        let repo = InMemoryWeightRepository::new();
        let owner = WeightOwner::global();
        let mut v = WeightVector::default_vector(owner.clone(), Utc::now());
        v.weights[0] = 0.9;
        let err = repo.activate(&owner, &v, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn test_outcome_uniqueness() {
        let repo = InMemoryPredictionRepository::new();
        let prediction = PredictionRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            industry: "Steel".into(),
            issued_at: Utc::now() - chrono::Duration::days(100),
            horizon_days: 90,
            fair_value: Decimal::new(120, 0),
            confidence: 0.7,
            model_values: [Some(100.0); MODEL_COUNT],
            features: vec![0.0; 20],
            weights_digest: "abc".into(),
        };
        repo.record(&prediction).await.unwrap();

        let outcome = PredictionOutcome {
            prediction_id: prediction.id,
            observed_at: Utc::now(),
            actual_price: Decimal::new(110, 0),
            abs_pct_error: 0.09,
            model_errors: [Some(0.09); MODEL_COUNT],
        };
        repo.record_outcome(&outcome).await.unwrap();
        assert!(repo.record_outcome(&outcome).await.is_err());
        assert!(repo.pending(Utc::now()).await.unwrap().is_empty());
    }
}
