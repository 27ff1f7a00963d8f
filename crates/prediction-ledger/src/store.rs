use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, Row, SqlitePool};
use uuid::Uuid;

use valuation_core::error::{EngineError, EngineResult};
use valuation_core::traits::{
    IndustryProfileRepository, PredictionRepository, WeightRepository,
};
use valuation_core::types::*;

/// One pool, all four core-owned tables.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

fn storage_err<E: std::fmt::Display>(e: E) -> EngineError {
    EngineError::Storage(e.to_string())
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weight_vectors (
                id TEXT PRIMARY KEY,
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                effective_from TEXT NOT NULL,
                effective_to TEXT,
                weights TEXT NOT NULL,
                source TEXT NOT NULL,
                train_mape REAL NOT NULL DEFAULT 0,
                backtest_mape REAL NOT NULL DEFAULT 0,
                cv_std REAL NOT NULL DEFAULT 0,
                sample_count INTEGER NOT NULL DEFAULT 0,
                ml_confidence REAL NOT NULL DEFAULT 0,
                deployed TEXT NOT NULL,
                rejection_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                company_id TEXT NOT NULL,
                industry TEXT NOT NULL,
                issued_at TEXT NOT NULL,
                horizon_days INTEGER NOT NULL,
                fair_value TEXT NOT NULL,
                confidence REAL NOT NULL,
                model_values TEXT NOT NULL,
                features TEXT NOT NULL,
                weights_digest TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prediction_outcomes (
                prediction_id TEXT PRIMARY KEY,
                observed_at TEXT NOT NULL,
                actual_price TEXT NOT NULL,
                abs_pct_error REAL NOT NULL,
                model_errors TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS industry_profiles (
                industry TEXT PRIMARY KEY,
                sample_count INTEGER NOT NULL,
                centroid TEXT NOT NULL,
                best_models TEXT NOT NULL,
                last_trained TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_predictions_tenant_issued
             ON predictions (tenant_id, issued_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct WeightRow {
    id: String,
    owner_kind: String,
    owner_id: String,
    effective_from: String,
    effective_to: Option<String>,
    weights: String,
    source: String,
    train_mape: f64,
    backtest_mape: f64,
    cv_std: f64,
    sample_count: i64,
    ml_confidence: f64,
    deployed: String,
    rejection_reason: Option<String>,
}

fn parse_datetime(raw: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(storage_err)
}

fn owner_kind_from_str(raw: &str) -> EngineResult<OwnerKind> {
    match raw {
        "global" => Ok(OwnerKind::Global),
        "industry" => Ok(OwnerKind::Industry),
        "company_override" => Ok(OwnerKind::CompanyOverride),
        other => Err(EngineError::Storage(format!("unknown owner kind {other}"))),
    }
}

fn source_from_str(raw: &str) -> EngineResult<WeightSource> {
    match raw {
        "default" => Ok(WeightSource::Default),
        "trained" => Ok(WeightSource::Trained),
        "transferred" => Ok(WeightSource::Transferred),
        "meta" => Ok(WeightSource::Meta),
        "smoothed" => Ok(WeightSource::Smoothed),
        other => Err(EngineError::Storage(format!("unknown weight source {other}"))),
    }
}

fn deployed_from_str(raw: &str) -> EngineResult<DeploymentState> {
    match raw {
        "candidate" => Ok(DeploymentState::Candidate),
        "shadow" => Ok(DeploymentState::Shadow),
        "active" => Ok(DeploymentState::Active),
        "retired" => Ok(DeploymentState::Retired),
        other => Err(EngineError::Storage(format!("unknown deployment state {other}"))),
    }
}

impl WeightRow {
    fn into_vector(self) -> EngineResult<WeightVector> {
        let weights: Vec<f64> = serde_json::from_str(&self.weights).map_err(storage_err)?;
        let mut array = [0.0; MODEL_COUNT];
        for (slot, value) in array.iter_mut().zip(weights.iter()) {
            *slot = *value;
        }
        Ok(WeightVector {
            id: Uuid::parse_str(&self.id).map_err(storage_err)?,
            owner: WeightOwner {
                kind: owner_kind_from_str(&self.owner_kind)?,
                id: self.owner_id,
            },
            effective_from: parse_datetime(&self.effective_from)?,
            effective_to: match self.effective_to {
                Some(raw) => Some(parse_datetime(&raw)?),
                None => None,
            },
            weights: array,
            source: source_from_str(&self.source)?,
            metrics: WeightMetrics {
                train_mape: self.train_mape,
                backtest_mape: self.backtest_mape,
                cv_std: self.cv_std,
                sample_count: self.sample_count.max(0) as usize,
                ml_confidence: self.ml_confidence,
            },
            deployed: deployed_from_str(&self.deployed)?,
            rejection_reason: self.rejection_reason,
        })
    }
}

async fn insert_vector<'e, E>(executor: E, vector: &WeightVector) -> EngineResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let weights_json = serde_json::to_string(&vector.weights.to_vec()).map_err(storage_err)?;
    sqlx::query(
        r#"
        INSERT INTO weight_vectors (
            id, owner_kind, owner_id, effective_from, effective_to, weights,
            source, train_mape, backtest_mape, cv_std, sample_count,
            ml_confidence, deployed, rejection_reason
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(vector.id.to_string())
    .bind(vector.owner.kind.as_str())
    .bind(&vector.owner.id)
    .bind(vector.effective_from.to_rfc3339())
    .bind(vector.effective_to.map(|dt| dt.to_rfc3339()))
    .bind(weights_json)
    .bind(vector.source.as_str())
    .bind(vector.metrics.train_mape)
    .bind(vector.metrics.backtest_mape)
    .bind(vector.metrics.cv_std)
    .bind(vector.metrics.sample_count as i64)
    .bind(vector.metrics.ml_confidence)
    .bind(vector.deployed.as_str())
    .bind(vector.rejection_reason.as_deref())
    .execute(executor)
    .await
    .map_err(storage_err)?;
    Ok(())
}

#[async_trait]
impl WeightRepository for SqliteLedger {
    async fn active_for(&self, owner: &WeightOwner) -> EngineResult<Option<WeightVector>> {
        let row: Option<WeightRow> = sqlx::query_as(
            r#"
            SELECT * FROM weight_vectors
            WHERE owner_kind = ? AND owner_id = ? AND deployed = 'active'
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
        )
        .bind(owner.kind.as_str())
        .bind(&owner.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(WeightRow::into_vector).transpose()
    }

    async fn append(&self, vector: &WeightVector) -> EngineResult<()> {
        if vector.deployed == DeploymentState::Active && !vector.is_simplex(1e-6) {
            return Err(EngineError::InvariantViolation(format!(
                "weights do not sum to 1 for owner {}",
                vector.owner.cache_key()
            )));
        }
        insert_vector(&self.pool, vector).await
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

        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            r#"
            UPDATE weight_vectors
            SET deployed = 'retired', effective_to = ?
            WHERE owner_kind = ? AND owner_id = ? AND deployed = 'active'
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(owner.kind.as_str())
        .bind(&owner.id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        let mut active = replacement.clone();
        active.owner = owner.clone();
        active.deployed = DeploymentState::Active;
        active.effective_from = now;
        active.effective_to = None;
        insert_vector(&mut *tx, &active).await?;

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn history(&self, owner: &WeightOwner, limit: usize) -> EngineResult<Vec<WeightVector>> {
        let rows: Vec<WeightRow> = sqlx::query_as(
            r#"
            SELECT * FROM weight_vectors
            WHERE owner_kind = ? AND owner_id = ?
            ORDER BY effective_from DESC
            LIMIT ?
            "#,
        )
        .bind(owner.kind.as_str())
        .bind(&owner.id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter().map(WeightRow::into_vector).collect()
    }
}

#[derive(Debug, FromRow)]
struct PredictionRow {
    id: String,
    tenant_id: String,
    company_id: String,
    industry: String,
    issued_at: String,
    horizon_days: i64,
    fair_value: String,
    confidence: f64,
    model_values: String,
    features: String,
    weights_digest: String,
}

impl PredictionRow {
    fn into_record(self) -> EngineResult<PredictionRecord> {
        let model_values: Vec<Option<f64>> =
            serde_json::from_str(&self.model_values).map_err(storage_err)?;
        let mut array = [None; MODEL_COUNT];
        for (slot, value) in array.iter_mut().zip(model_values.into_iter()) {
            *slot = value;
        }
        Ok(PredictionRecord {
            id: Uuid::parse_str(&self.id).map_err(storage_err)?,
            tenant_id: Uuid::parse_str(&self.tenant_id).map_err(storage_err)?,
            company_id: Uuid::parse_str(&self.company_id).map_err(storage_err)?,
            industry: self.industry,
            issued_at: parse_datetime(&self.issued_at)?,
            horizon_days: self.horizon_days,
            fair_value: Decimal::from_str(&self.fair_value).map_err(storage_err)?,
            confidence: self.confidence,
            model_values: array,
            features: serde_json::from_str(&self.features).map_err(storage_err)?,
            weights_digest: self.weights_digest,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutcomeRow {
    prediction_id: String,
    observed_at: String,
    actual_price: String,
    abs_pct_error: f64,
    model_errors: String,
}

impl OutcomeRow {
    fn into_outcome(self) -> EngineResult<PredictionOutcome> {
        let model_errors: Vec<Option<f64>> =
            serde_json::from_str(&self.model_errors).map_err(storage_err)?;
        let mut array = [None; MODEL_COUNT];
        for (slot, value) in array.iter_mut().zip(model_errors.into_iter()) {
            *slot = value;
        }
        Ok(PredictionOutcome {
            prediction_id: Uuid::parse_str(&self.prediction_id).map_err(storage_err)?,
            observed_at: parse_datetime(&self.observed_at)?,
            actual_price: Decimal::from_str(&self.actual_price).map_err(storage_err)?,
            abs_pct_error: self.abs_pct_error,
            model_errors: array,
        })
    }
}

#[async_trait]
impl PredictionRepository for SqliteLedger {
    async fn record(&self, prediction: &PredictionRecord) -> EngineResult<()> {
        let model_values_json =
            serde_json::to_string(&prediction.model_values.to_vec()).map_err(storage_err)?;
        let features_json =
            serde_json::to_string(&prediction.features).map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO predictions (
                id, tenant_id, company_id, industry, issued_at, horizon_days,
                fair_value, confidence, model_values, features, weights_digest
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(prediction.id.to_string())
        .bind(prediction.tenant_id.to_string())
        .bind(prediction.company_id.to_string())
        .bind(&prediction.industry)
        .bind(prediction.issued_at.to_rfc3339())
        .bind(prediction.horizon_days)
        .bind(prediction.fair_value.to_string())
        .bind(prediction.confidence)
        .bind(model_values_json)
        .bind(features_json)
        .bind(&prediction.weights_digest)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_outcome(&self, outcome: &PredictionOutcome) -> EngineResult<()> {
        let exists: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM prediction_outcomes WHERE prediction_id = ?",
        )
        .bind(outcome.prediction_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        if exists.is_some() {
            return Err(EngineError::InvariantViolation(format!(
                "duplicate outcome for prediction {}",
                outcome.prediction_id
            )));
        }

        let model_errors_json =
            serde_json::to_string(&outcome.model_errors.to_vec()).map_err(storage_err)?;
        sqlx::query(
            r#"
            INSERT INTO prediction_outcomes (
                prediction_id, observed_at, actual_price, abs_pct_error, model_errors
            )
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(outcome.prediction_id.to_string())
        .bind(outcome.observed_at.to_rfc3339())
        .bind(outcome.actual_price.to_string())
        .bind(outcome.abs_pct_error)
        .bind(model_errors_json)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn pending(&self, until: DateTime<Utc>) -> EngineResult<Vec<PredictionRecord>> {
        let rows: Vec<PredictionRow> = sqlx::query_as(
            r#"
            SELECT p.* FROM predictions p
            LEFT JOIN prediction_outcomes o ON o.prediction_id = p.id
            WHERE o.prediction_id IS NULL
            ORDER BY p.issued_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut matured = Vec::new();
        for row in rows {
            let record = row.into_record()?;
            if record.issued_at + chrono::Duration::days(record.horizon_days) <= until {
                matured.push(record);
            }
        }
        Ok(matured)
    }

    async fn window(
        &self,
        tenant_id: Uuid,
        industry: Option<&str>,
        days: i64,
    ) -> EngineResult<Vec<ScoredPrediction>> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();

        let rows = sqlx::query(
            r#"
            SELECT p.id AS p_id, p.tenant_id, p.company_id, p.industry, p.issued_at,
                   p.horizon_days, p.fair_value, p.confidence, p.model_values,
                   p.features, p.weights_digest,
                   o.prediction_id, o.observed_at, o.actual_price,
                   o.abs_pct_error, o.model_errors
            FROM predictions p
            JOIN prediction_outcomes o ON o.prediction_id = p.id
            WHERE p.tenant_id = ?
              AND p.issued_at >= ?
              AND (? IS NULL OR p.industry = ?)
            ORDER BY p.issued_at ASC, p.id ASC
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(cutoff)
        .bind(industry)
        .bind(industry)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let prediction = PredictionRow {
                id: row.try_get("p_id").map_err(storage_err)?,
                tenant_id: row.try_get("tenant_id").map_err(storage_err)?,
                company_id: row.try_get("company_id").map_err(storage_err)?,
                industry: row.try_get("industry").map_err(storage_err)?,
                issued_at: row.try_get("issued_at").map_err(storage_err)?,
                horizon_days: row.try_get("horizon_days").map_err(storage_err)?,
                fair_value: row.try_get("fair_value").map_err(storage_err)?,
                confidence: row.try_get("confidence").map_err(storage_err)?,
                model_values: row.try_get("model_values").map_err(storage_err)?,
                features: row.try_get("features").map_err(storage_err)?,
                weights_digest: row.try_get("weights_digest").map_err(storage_err)?,
            }
            .into_record()?;

            let outcome = OutcomeRow {
                prediction_id: row.try_get("prediction_id").map_err(storage_err)?,
                observed_at: row.try_get("observed_at").map_err(storage_err)?,
                actual_price: row.try_get("actual_price").map_err(storage_err)?,
                abs_pct_error: row.try_get("abs_pct_error").map_err(storage_err)?,
                model_errors: row.try_get("model_errors").map_err(storage_err)?,
            }
            .into_outcome()?;

            pairs.push(ScoredPrediction { prediction, outcome });
        }
        Ok(pairs)
    }
}

#[async_trait]
impl IndustryProfileRepository for SqliteLedger {
    async fn upsert(&self, profile: &IndustryProfile) -> EngineResult<()> {
        let centroid = serde_json::to_string(&profile.centroid).map_err(storage_err)?;
        let best: Vec<&str> = profile.best_models.iter().map(|m| m.as_str()).collect();
        let best_json = serde_json::to_string(&best).map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO industry_profiles (industry, sample_count, centroid, best_models, last_trained)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(industry) DO UPDATE SET
                sample_count = excluded.sample_count,
                centroid = excluded.centroid,
                best_models = excluded.best_models,
                last_trained = excluded.last_trained
            "#,
        )
        .bind(&profile.industry)
        .bind(profile.sample_count as i64)
        .bind(centroid)
        .bind(best_json)
        .bind(profile.last_trained.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn get(&self, industry: &str) -> EngineResult<Option<IndustryProfile>> {
        let row = sqlx::query(
            "SELECT industry, sample_count, centroid, best_models, last_trained
             FROM industry_profiles WHERE industry = ?",
        )
        .bind(industry)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| profile_from_row(&r)).transpose()
    }

    async fn all(&self) -> EngineResult<Vec<IndustryProfile>> {
        let rows = sqlx::query(
            "SELECT industry, sample_count, centroid, best_models, last_trained
             FROM industry_profiles ORDER BY industry ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(profile_from_row).collect()
    }
}

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> EngineResult<IndustryProfile> {
    let industry: String = row.try_get("industry").map_err(storage_err)?;
    let sample_count: i64 = row.try_get("sample_count").map_err(storage_err)?;
    let centroid_json: String = row.try_get("centroid").map_err(storage_err)?;
    let best_json: String = row.try_get("best_models").map_err(storage_err)?;
    let last_trained: String = row.try_get("last_trained").map_err(storage_err)?;

    let best_names: Vec<String> = serde_json::from_str(&best_json).map_err(storage_err)?;
    let best_models = best_names
        .iter()
        .filter_map(|name| ModelId::ALL.into_iter().find(|m| m.as_str() == name))
        .collect();

    Ok(IndustryProfile {
        industry,
        sample_count: sample_count.max(0) as usize,
        centroid: serde_json::from_str(&centroid_json).map_err(storage_err)?,
        best_models,
        last_trained: parse_datetime(&last_trained)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn ledger() -> SqliteLedger {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let ledger = SqliteLedger::new(pool);
        ledger.migrate().await.expect("migrate");
        ledger
    }

    fn vector(owner: WeightOwner) -> WeightVector {
        WeightVector::default_vector(owner, Utc::now())
    }

    #[tokio::test]
    async fn test_weight_round_trip_and_activation() {
        let ledger = ledger().await;
        let owner = WeightOwner::global();

        ledger.activate(&owner, &vector(owner.clone()), Utc::now()).await.unwrap();
        let mut second = vector(owner.clone());
        second.weights = [0.30, 0.10, 0.15, 0.12, 0.10, 0.08, 0.05, 0.10];
        second.source = WeightSource::Smoothed;
        ledger
            .activate(&owner, &second, Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let active = ledger.active_for(&owner).await.unwrap().unwrap();
        assert!((active.weights[0] - 0.30).abs() < 1e-9);
        assert_eq!(active.source, WeightSource::Smoothed);

        let history = ledger.history(&owner, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            history.iter().filter(|v| v.deployed == DeploymentState::Retired).count(),
            1
        );
        let retired = history
            .iter()
            .find(|v| v.deployed == DeploymentState::Retired)
            .unwrap();
        assert!(retired.effective_to.is_some());
    }

    #[tokio::test]
    async fn test_prediction_window_and_pending() {
        let ledger = ledger().await;
        let tenant = Uuid::new_v4();

        let matured = PredictionRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            company_id: Uuid::new_v4(),
            industry: "Steel".into(),
            issued_at: Utc::now() - chrono::Duration::days(120),
            horizon_days: 90,
            fair_value: Decimal::new(12050, 2),
            confidence: 0.7,
            model_values: [Some(118.0); MODEL_COUNT],
            features: vec![0.4; 20],
            weights_digest: "digest".into(),
        };
        let fresh = PredictionRecord {
            id: Uuid::new_v4(),
            issued_at: Utc::now() - chrono::Duration::days(5),
            ..matured.clone()
        };
        ledger.record(&matured).await.unwrap();
        ledger.record(&fresh).await.unwrap();

        let pending = ledger.pending(Utc::now()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, matured.id);

        ledger
            .record_outcome(&PredictionOutcome {
                prediction_id: matured.id,
                observed_at: Utc::now(),
                actual_price: Decimal::new(11000, 2),
                abs_pct_error: 0.095,
                model_errors: [Some(0.07); MODEL_COUNT],
            })
            .await
            .unwrap();

        assert!(ledger.pending(Utc::now()).await.unwrap().is_empty());

        let window = ledger.window(tenant, Some("Steel"), 180).await.unwrap();
        assert_eq!(window.len(), 1);
        assert!((window[0].outcome.abs_pct_error - 0.095).abs() < 1e-12);

        let other = ledger.window(tenant, Some("Banking"), 180).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_outcome_rejected() {
        let ledger = ledger().await;
        let prediction = PredictionRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            industry: "Steel".into(),
            issued_at: Utc::now() - chrono::Duration::days(100),
            horizon_days: 90,
            fair_value: Decimal::new(100, 0),
            confidence: 0.5,
            model_values: [None; MODEL_COUNT],
            features: vec![],
            weights_digest: "d".into(),
        };
        ledger.record(&prediction).await.unwrap();
        let outcome = PredictionOutcome {
            prediction_id: prediction.id,
            observed_at: Utc::now(),
            actual_price: Decimal::new(90, 0),
            abs_pct_error: 0.1,
            model_errors: [None; MODEL_COUNT],
        };
        ledger.record_outcome(&outcome).await.unwrap();
        assert!(matches!(
            ledger.record_outcome(&outcome).await,
            Err(EngineError::InvariantViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_upsert_overwrites() {
        let ledger = ledger().await;
        let mut profile = IndustryProfile {
            industry: "Steel".into(),
            sample_count: 10,
            centroid: vec![0.1; 20],
            best_models: vec![ModelId::Dcf, ModelId::Rim],
            last_trained: Utc::now(),
        };
        ledger.upsert(&profile).await.unwrap();
        profile.sample_count = 25;
        ledger.upsert(&profile).await.unwrap();

        let loaded = ledger.get("Steel").await.unwrap().unwrap();
        assert_eq!(loaded.sample_count, 25);
        assert_eq!(loaded.best_models, vec![ModelId::Dcf, ModelId::Rim]);
        assert_eq!(ledger.all().await.unwrap().len(), 1);
    }
}
