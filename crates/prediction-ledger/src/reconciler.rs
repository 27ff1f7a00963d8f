use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rust_decimal::prelude::ToPrimitive;

use valuation_core::error::EngineResult;
use valuation_core::traits::{MarketDataProvider, PredictionRepository};
use valuation_core::types::{PredictionOutcome, MODEL_COUNT};

/// Daily reconciliation: every prediction past its horizon gets exactly one
/// outcome, scored against the realised close at the business-day-snapped
/// target date.
pub struct OutcomeReconciler {
    predictions: Arc<dyn PredictionRepository>,
    market: Arc<dyn MarketDataProvider>,
}

impl OutcomeReconciler {
    pub fn new(
        predictions: Arc<dyn PredictionRepository>,
        market: Arc<dyn MarketDataProvider>,
    ) -> Self {
        Self { predictions, market }
    }

    /// Reconcile everything matured at `until`. Returns how many outcomes
    /// were written; predictions whose price is still unavailable stay
    /// pending for the next run.
    pub async fn reconcile(&self, until: DateTime<Utc>) -> EngineResult<usize> {
        let pending = self.predictions.pending(until).await?;
        let mut written = 0usize;

        for prediction in pending {
            let target = prediction.issued_at + Duration::days(prediction.horizon_days);
            let target_date = snap_to_business_day(target.date_naive());

            let actual_price = match self
                .market
                .close_on(prediction.company_id, target_date)
                .await
            {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!(
                        prediction = %prediction.id,
                        date = %target_date,
                        "no realised price yet: {e}"
                    );
                    continue;
                }
            };

            let actual = actual_price.to_f64().unwrap_or(0.0);
            if actual <= 0.0 {
                continue;
            }
            let predicted = prediction.fair_value.to_f64().unwrap_or(0.0);
            let abs_pct_error = ((predicted - actual) / actual).abs();

            let mut model_errors = [None; MODEL_COUNT];
            for (slot, value) in model_errors.iter_mut().zip(prediction.model_values.iter()) {
                *slot = value.map(|v| ((v - actual) / actual).abs());
            }

            self.predictions
                .record_outcome(&PredictionOutcome {
                    prediction_id: prediction.id,
                    observed_at: until,
                    actual_price,
                    abs_pct_error,
                    model_errors,
                })
                .await?;
            written += 1;
        }

        if written > 0 {
            tracing::info!(written, "outcome reconciliation complete");
        }
        Ok(written)
    }
}

/// Snap a weekend target back to Friday. Holiday gaps resolve inside the
/// market provider, which serves the latest prior close.
pub fn snap_to_business_day(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;
    use valuation_core::memory::{InMemoryPredictionRepository, StaticDataSet};
    use valuation_core::types::PredictionRecord;

    #[test]
    fn test_weekend_snap() {
        let saturday = NaiveDate::from_ymd_opt(2026, 1, 17).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2026, 1, 18).unwrap();
        let friday = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert_eq!(snap_to_business_day(saturday), friday);
        assert_eq!(snap_to_business_day(sunday), friday);
        assert_eq!(snap_to_business_day(friday), friday);
    }

    #[tokio::test]
    async fn test_reconcile_writes_one_outcome() {
        let predictions = Arc::new(InMemoryPredictionRepository::new());
        let company_id = Uuid::new_v4();

        let issued = Utc::now() - chrono::Duration::days(100);
        let prediction = PredictionRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            company_id,
            industry: "Steel".into(),
            issued_at: issued,
            horizon_days: 90,
            fair_value: Decimal::new(110, 0),
            confidence: 0.7,
            model_values: [Some(105.0); MODEL_COUNT],
            features: vec![0.1; 20],
            weights_digest: "d".into(),
        };
        predictions.record(&prediction).await.unwrap();

        let mut market = StaticDataSet::new();
        let target =
            snap_to_business_day((issued + chrono::Duration::days(90)).date_naive());
        market.closes.insert((company_id, target), Decimal::new(100, 0));
        let market = Arc::new(market);

        let reconciler = OutcomeReconciler::new(predictions.clone(), market);
        let written = reconciler.reconcile(Utc::now()).await.unwrap();
        assert_eq!(written, 1);

        // Second pass is a no-op: the prediction already has its outcome.
        assert_eq!(reconciler.reconcile(Utc::now()).await.unwrap(), 0);

        let window = prediction_window(&predictions, prediction.tenant_id).await;
        assert_eq!(window.len(), 1);
        assert!((window[0].outcome.abs_pct_error - 0.10).abs() < 1e-9);
        assert!((window[0].outcome.model_errors[0].unwrap() - 0.05).abs() < 1e-9);
    }

    async fn prediction_window(
        repo: &InMemoryPredictionRepository,
        tenant: Uuid,
    ) -> Vec<valuation_core::types::ScoredPrediction> {
        use valuation_core::traits::PredictionRepository as _;
        repo.window(tenant, None, 365).await.unwrap()
    }
}
