use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

use ensemble_engine::EnsembleProviders;
use prediction_ledger::snap_to_business_day;
use valuation_core::memory::{
    InMemoryPredictionRepository, InMemoryProfileRepository, InMemoryWeightRepository,
    StaticDataSet,
};
use valuation_core::traits::*;
use valuation_core::types::*;
use weight_trainer::{IndustryTrainer, TrainerConfig, WeightTrainer};

use crate::config::EngineConfig;
use crate::registry::EngineRegistry;
use crate::suite::AnalysisSuite;

fn dec(v: f64) -> Option<Decimal> {
    Decimal::from_f64(v)
}

/// Fixture: a healthy large-cap in the Steel industry. Statement money in
/// millions, shares in millions, so per-share figures line up.
fn healthy_large_cap(data: &mut StaticDataSet) -> CompanyInfo {
    let company = CompanyInfo {
        id: Uuid::new_v4(),
        ticker: "HLC".into(),
        industry: "Steel".into(),
        sector: "Materials".into(),
        shares_outstanding: Decimal::new(1_000, 0),
        fiscal_year_end: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
    };

    let period_end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    let income = IncomeStatement {
        company_id: company.id,
        period_end,
        period_kind: PeriodKind::Annual,
        revenue: dec(100_000.0),
        cost_of_revenue: dec(60_000.0),
        gross_profit: dec(40_000.0),
        operating_income: dec(20_000.0),
        ebitda: dec(25_000.0),
        interest_expense: dec(1_000.0),
        income_before_tax: dec(19_000.0),
        income_tax_expense: dec(4_000.0),
        net_income: dec(15_000.0),
        eps: dec(6.50),
    };
    let prev_income = IncomeStatement {
        revenue: dec(97_000.0),
        net_income: dec(14_200.0),
        eps: dec(6.30),
        ebitda: dec(24_000.0),
        ..income.clone()
    };
    let balance = BalanceSheet {
        company_id: company.id,
        period_end,
        period_kind: PeriodKind::Annual,
        current_assets: dec(45_000.0),
        total_assets: dec(88_000.0),
        cash_and_equivalents: dec(10_000.0),
        inventory: dec(8_000.0),
        accounts_receivable: dec(9_000.0),
        property_plant_equipment: dec(35_000.0),
        current_liabilities: dec(22_000.0),
        total_liabilities: dec(60_000.0),
        accounts_payable: dec(7_000.0),
        short_term_debt: dec(5_000.0),
        long_term_debt: dec(20_000.0),
        total_equity: dec(28_000.0),
        retained_earnings: dec(20_000.0),
    };
    let cash_flow = CashFlowStatement {
        company_id: company.id,
        period_end,
        period_kind: PeriodKind::Annual,
        operating_cash_flow: dec(18_000.0),
        investing_cash_flow: dec(-6_000.0),
        financing_cash_flow: dec(-5_000.0),
        capital_expenditures: dec(-6_000.0),
        free_cash_flow: dec(12_000.0),
        dividends_paid: dec(-2_000.0),
    };

    data.add_company(company.clone());
    data.set_statements(
        company.id,
        StatementSet {
            income: Some(income),
            prev_income: Some(prev_income),
            balance: Some(balance),
            prev_balance: None,
            cash_flow: Some(cash_flow),
            prev_cash_flow: None,
        },
    );
    data.set_snapshot(
        company.id,
        MarketSnapshot {
            as_of: NaiveDate::from_ymd_opt(2026, 1, 15),
            close_price: dec(120.0),
            market_cap: dec(120_000.0),
            shares_outstanding: dec(1_000.0),
            closes: (0..60).map(|i| 118.0 + (i % 7) as f64).collect(),
            beta: Some(1.1),
        },
    );
    data.set_median("Steel", "ps_ratio", 1.3);
    data.set_median("Steel", "pcf_ratio", 8.0);
    data.set_median("Steel", "pe_ratio", 18.0);
    data.set_median("Steel", "pb_ratio", 2.0);
    data.set_median("Steel", "ev_to_ebitda", 10.0);

    company
}

struct Fixture {
    suite: AnalysisSuite,
    predictions: Arc<InMemoryPredictionRepository>,
    weights: Arc<InMemoryWeightRepository>,
    company: CompanyInfo,
    tenant: Uuid,
}

fn build_fixture(mutate: impl FnOnce(&mut StaticDataSet, &CompanyInfo)) -> Fixture {
    let mut data = StaticDataSet::new();
    let company = healthy_large_cap(&mut data);
    mutate(&mut data, &company);
    let data = Arc::new(data);

    let weights = Arc::new(InMemoryWeightRepository::new());
    let predictions = Arc::new(InMemoryPredictionRepository::new());
    let profiles = Arc::new(InMemoryProfileRepository::new());

    let providers = EnsembleProviders {
        companies: data.clone(),
        statements: data.clone(),
        market: data.clone(),
        industry_stats: data.clone(),
        macros: data.clone(),
        weights: weights.clone(),
        predictions: predictions.clone(),
    };

    let trainer = WeightTrainer::new(weights.clone(), predictions.clone(), TrainerConfig::default());
    let industry_trainer = IndustryTrainer::new(
        WeightTrainer::new(weights.clone(), predictions.clone(), TrainerConfig::default()),
        data.clone(),
        predictions.clone(),
        weights.clone(),
        profiles.clone(),
    );

    let registry = EngineRegistry::init(3, std::time::Duration::from_secs(300));
    let suite = AnalysisSuite::new(
        EngineConfig::default(),
        registry,
        providers,
        trainer,
        industry_trainer,
    );

    Fixture { suite, predictions, weights, company, tenant: Uuid::new_v4() }
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
}

// =============================================================================
// Healthy large-cap: fair value near the market, solid confidence
// =============================================================================

#[tokio::test]
async fn test_healthy_large_cap_valuation() {
    let fixture = build_fixture(|_, _| {});
    let result = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();

    assert_eq!(result.status, ResultStatus::Ok, "reasons: {:?}", result.reasons);
    let fair_value = result.final_fair_value.unwrap().to_f64().unwrap();
    assert!(
        (115.0..=165.0).contains(&fair_value),
        "fair value out of band: {fair_value}"
    );
    assert!(result.confidence >= 0.55, "confidence {}", result.confidence);
    assert!(result.confidence <= 1.0);
    assert!(matches!(
        result.recommendation,
        Some(Recommendation::Hold) | Some(Recommendation::Buy)
    ));

    // 8 models x 3 scenarios, weights on the simplex.
    assert_eq!(result.per_model_values.len(), 24);
    let weight_sum: f64 = result.model_weights.iter().sum();
    assert!((weight_sum - 1.0).abs() < 1e-6);
    let scenario_sum: f64 = result.scenario_weights.iter().sum();
    assert!((scenario_sum - 1.0).abs() < 1e-9);

    // Range brackets the final value.
    let (low, high) = result.value_range;
    let low = low.to_f64().unwrap();
    let high = high.to_f64().unwrap();
    assert!(low <= fair_value && fair_value <= high);

    // A prediction was recorded for the feedback loop.
    assert!(result.prediction_id.is_some());
}

#[tokio::test]
async fn test_valuation_deterministic_for_fixed_inputs() {
    let fixture = build_fixture(|_, _| {});
    let first = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();
    let second = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();

    assert_eq!(first.final_fair_value, second.final_fair_value);
    assert_eq!(first.model_weights, second.model_weights);
    assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
}

// =============================================================================
// Loss-maker: Graham and Lynch drop out, the ensemble degrades gracefully
// =============================================================================

#[tokio::test]
async fn test_negative_eps_degrades_and_renormalises() {
    let fixture = build_fixture(|data, company| {
        let mut statements = data.statements.get(&company.id).cloned().unwrap();
        if let Some(income) = statements.income.as_mut() {
            income.eps = dec(-1.0);
            income.net_income = dec(-1_000.0);
        }
        data.set_statements(company.id, statements);
    });

    let result = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();

    assert_eq!(result.status, ResultStatus::Degraded);
    assert!(result
        .degraded_metrics
        .iter()
        .any(|m| m == "graham_number"));

    // Excluded models carry zero weight; the rest renormalise to 1.
    let graham_weight = result.model_weights[ModelId::Graham.index()];
    assert_eq!(graham_weight, 0.0);
    let weight_sum: f64 = result.model_weights.iter().sum();
    assert!((weight_sum - 1.0).abs() < 1e-6);

    // Still produces a value from the surviving models.
    assert!(result.final_fair_value.is_some());
}

// =============================================================================
// Discount rate below terminal growth: undefined-formula, not a crash
// =============================================================================

#[tokio::test]
async fn test_wacc_below_terminal_growth_reports_reason() {
    let fixture = build_fixture(|data, _| {
        data.risk_free_rate = 0.01;
        data.equity_risk_premium = 0.005;
    });

    let result = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();

    assert_eq!(result.status, ResultStatus::Degraded);
    assert!(
        result.reasons.iter().any(|r| r.contains("undefined_formula")),
        "reasons: {:?}",
        result.reasons
    );
    // The request as a whole still succeeds.
    assert!(result.final_fair_value.is_some());
}

// =============================================================================
// Prediction feedback loop: valuation -> reconciliation -> training window
// =============================================================================

#[tokio::test]
async fn test_prediction_reconciliation_round_trip() {
    let fixture = build_fixture(|data, company| {
        // Realised close at the snapped horizon date.
        let target =
            snap_to_business_day((Utc::now() + chrono::Duration::days(90)).date_naive());
        data.closes
            .insert((company.id, target), Decimal::new(125, 0));
    });
    let result = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();
    assert!(result.prediction_id.is_some());

    // Before the horizon nothing matures.
    assert_eq!(fixture.suite.reconcile_outcomes(Utc::now()).await.unwrap(), 0);

    // After the horizon the prediction gets exactly one outcome.
    let matured_at = Utc::now() + chrono::Duration::days(91);
    assert_eq!(fixture.suite.reconcile_outcomes(matured_at).await.unwrap(), 1);
    assert_eq!(fixture.suite.reconcile_outcomes(matured_at).await.unwrap(), 0);

    // The pair shows up in the training window.
    let window = fixture
        .predictions
        .window(fixture.tenant, Some("Steel"), 365)
        .await
        .unwrap();
    assert_eq!(window.len(), 1);
    assert!(window[0].outcome.abs_pct_error >= 0.0);
}

// =============================================================================
// Weight precedence: an industry vector overrides the default table
// =============================================================================

#[tokio::test]
async fn test_active_industry_vector_takes_precedence() {
    let fixture = build_fixture(|_, _| {});
    let owner = WeightOwner::industry("Steel");
    let mut vector = WeightVector::default_vector(owner.clone(), Utc::now());
    vector.weights = [0.50, 0.10, 0.10, 0.05, 0.05, 0.05, 0.05, 0.10];
    fixture.weights.activate(&owner, &vector, Utc::now()).await.unwrap();

    let result = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();

    assert!((result.model_weights[0] - 0.50).abs() < 1e-9);
}

// =============================================================================
// Network fallback: a refreshed snapshot replaces the default table when no
// trained vector applies
// =============================================================================

#[tokio::test]
async fn test_weight_network_refresh_feeds_the_fallback_tier() {
    let fixture = build_fixture(|_, _| {});

    // Deep scored history: model 0 consistently closest to the realised
    // price, model 4 consistently worst.
    for i in 0..120usize {
        let actual = 100.0 + (i % 9) as f64;
        let prediction = PredictionRecord {
            id: Uuid::new_v4(),
            tenant_id: fixture.tenant,
            company_id: Uuid::new_v4(),
            industry: "Steel".into(),
            issued_at: Utc::now() - chrono::Duration::days(60) + chrono::Duration::hours(i as i64),
            horizon_days: 30,
            fair_value: dec(actual * 1.05).unwrap(),
            confidence: 0.7,
            model_values: [Some(actual); MODEL_COUNT],
            features: (0..20).map(|f| ((i + f) % 10) as f64 / 10.0).collect(),
            weights_digest: "seed".into(),
        };
        fixture.predictions.record(&prediction).await.unwrap();
        fixture
            .predictions
            .record_outcome(&PredictionOutcome {
                prediction_id: prediction.id,
                observed_at: Utc::now(),
                actual_price: dec(actual).unwrap(),
                abs_pct_error: 0.05,
                model_errors: [
                    Some(0.01),
                    Some(0.15),
                    Some(0.20),
                    Some(0.25),
                    Some(0.60),
                    Some(0.35),
                    Some(0.10),
                    Some(0.12),
                ],
            })
            .await
            .unwrap();
    }

    assert!(fixture.suite.refresh_weight_network(fixture.tenant).await.unwrap());

    // No active vector exists at any level, so the valuation resolves its
    // weights from the refreshed network instead of the default table.
    let result = fixture
        .suite
        .value(fixture.tenant, fixture.company.id, as_of(), None)
        .await
        .unwrap();

    let weight_sum: f64 = result.model_weights.iter().sum();
    assert!((weight_sum - 1.0).abs() < 1e-6);
    assert!(
        result
            .model_weights
            .iter()
            .zip(DEFAULT_MODEL_WEIGHTS.iter())
            .any(|(w, d)| (w - d).abs() > 1e-6),
        "network output should differ from the default table: {:?}",
        result.model_weights
    );
}

// =============================================================================
// Scoring and ranking
// =============================================================================

#[tokio::test]
async fn test_rate_and_rank() {
    let fixture = build_fixture(|data, _| {
        // A second, weaker company to rank below the large cap.
        let weak = CompanyInfo {
            id: Uuid::new_v4(),
            ticker: "WEAK".into(),
            industry: "Steel".into(),
            sector: "Materials".into(),
            shares_outstanding: Decimal::new(500, 0),
            fiscal_year_end: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        };
        let period_end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        data.add_company(weak.clone());
        data.set_statements(
            weak.id,
            StatementSet {
                income: Some(IncomeStatement {
                    company_id: weak.id,
                    period_end,
                    period_kind: PeriodKind::Annual,
                    revenue: dec(10_000.0),
                    operating_income: dec(200.0),
                    net_income: dec(50.0),
                    income_before_tax: dec(80.0),
                    income_tax_expense: dec(30.0),
                    interest_expense: dec(400.0),
                    eps: dec(0.10),
                    ..Default::default()
                }),
                prev_income: Some(IncomeStatement {
                    company_id: weak.id,
                    period_end,
                    period_kind: PeriodKind::Annual,
                    revenue: dec(12_000.0),
                    net_income: dec(400.0),
                    ..Default::default()
                }),
                balance: Some(BalanceSheet {
                    company_id: weak.id,
                    period_end,
                    period_kind: PeriodKind::Annual,
                    current_assets: dec(1_000.0),
                    total_assets: dec(8_000.0),
                    current_liabilities: dec(2_500.0),
                    total_liabilities: dec(7_000.0),
                    short_term_debt: dec(1_500.0),
                    long_term_debt: dec(3_500.0),
                    total_equity: dec(1_000.0),
                    retained_earnings: dec(-500.0),
                    ..Default::default()
                }),
                prev_balance: None,
                cash_flow: None,
                prev_cash_flow: None,
            },
        );
        data.set_snapshot(
            weak.id,
            MarketSnapshot {
                as_of: NaiveDate::from_ymd_opt(2026, 1, 15),
                close_price: dec(8.0),
                market_cap: dec(4_000.0),
                shares_outstanding: dec(500.0),
                closes: (0..60).map(|i| 8.0 + (i % 9) as f64 * 0.5).collect(),
                beta: Some(2.1),
            },
        );
    });

    let strong = fixture.suite.rate(fixture.company.id, as_of()).await.unwrap();
    assert!((0.0..=100.0).contains(&strong.composite));
    assert_eq!(strong.source, ScoreWeightSource::Default);

    let ranked = fixture.suite.rank(fixture.tenant, as_of(), None).await.unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].0, "HLC");
    assert_eq!(ranked[1].0, "WEAK");
    assert!(ranked[0].1.composite > ranked[1].1.composite);

    // Rating bands are a step function of the composite.
    for (_, score) in &ranked {
        assert_eq!(score.rating, Rating::from_score(score.composite));
    }
}

// =============================================================================
// Trend surface
// =============================================================================

#[tokio::test]
async fn test_trend_operation() {
    let fixture = build_fixture(|data, company| {
        data.set_metric_history(
            company.id,
            "revenue",
            (0..12).map(|i| 80_000.0 * 1.05f64.powi(i)).collect(),
        );
    });

    let trend = fixture.suite.trend(fixture.company.id, "revenue").await.unwrap();
    assert!(trend.slope > 0.0);
    assert!(matches!(
        trend.direction,
        TrendDirection::Improving | TrendDirection::StrongImproving
    ));

    let missing = fixture.suite.trend(fixture.company.id, "net_margin").await;
    assert!(missing.is_err());
}

// =============================================================================
// Dimension-weight learning publishes into the scoring path
// =============================================================================

#[tokio::test]
async fn test_learned_dimension_weights_flow_into_rate() {
    let fixture = build_fixture(|_, _| {});

    let pairs: Vec<([f64; 5], f64)> = (0..200)
        .map(|i| {
            let valuation = (i % 25) as f64 * 4.0;
            (
                [valuation, 50.0, 40.0 + (i % 3) as f64, 60.0, 55.0],
                valuation * 0.002,
            )
        })
        .collect();
    assert!(fixture.suite.train_dimension_weights(&pairs, 42));

    let score = fixture.suite.rate(fixture.company.id, as_of()).await.unwrap();
    assert_eq!(score.source, ScoreWeightSource::Ml);
    assert!(score.ml_confidence.is_some());
    let weight_sum: f64 = score.dimension_weights.iter().sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
}
