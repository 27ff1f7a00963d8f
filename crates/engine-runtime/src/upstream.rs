//! Guarded upstream access.
//!
//! Wraps a statement or market provider with bounded retries feeding the
//! circuit breaker, and a last-good cache. While the breaker is open the
//! cached snapshot is served instead of hammering the upstream; callers see
//! a `StaleInputs` flavour only when there is no cache to fall back on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use valuation_core::error::{EngineError, EngineResult};
use valuation_core::traits::{MarketDataProvider, StatementProvider};
use valuation_core::types::{MarketSnapshot, StatementSet};

use crate::registry::{with_retries, EngineRegistry};

/// Statement provider with retry, breaker and last-good fallback.
pub struct GuardedStatementProvider {
    inner: Arc<dyn StatementProvider>,
    registry: Arc<EngineRegistry>,
    max_attempts: u32,
    backoff: Duration,
    last_good: DashMap<Uuid, StatementSet>,
}

impl GuardedStatementProvider {
    pub fn new(
        inner: Arc<dyn StatementProvider>,
        registry: Arc<EngineRegistry>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self { inner, registry, max_attempts, backoff, last_good: DashMap::new() }
    }

    fn fallback(&self, company_id: Uuid, err: EngineError) -> EngineResult<StatementSet> {
        match self.last_good.get(&company_id) {
            Some(cached) => {
                tracing::warn!(%company_id, "serving cached statements: {err}");
                Ok(cached.clone())
            }
            None => Err(EngineError::UpstreamUnavailable(format!(
                "statements for {company_id} unavailable and no cache: {err}"
            ))),
        }
    }
}

const STATEMENTS_UPSTREAM: &str = "statements";
const MARKET_UPSTREAM: &str = "market";

#[async_trait]
impl StatementProvider for GuardedStatementProvider {
    async fn statements(&self, company_id: Uuid, as_of: NaiveDate) -> EngineResult<StatementSet> {
        if self.registry.breaker_open(STATEMENTS_UPSTREAM) {
            return self.fallback(
                company_id,
                EngineError::UpstreamUnavailable("circuit open".into()),
            );
        }

        let inner = &self.inner;
        let result = with_retries(
            &self.registry,
            STATEMENTS_UPSTREAM,
            self.max_attempts,
            self.backoff,
            || inner.statements(company_id, as_of),
        )
        .await;

        match result {
            Ok(set) => {
                self.last_good.insert(company_id, set.clone());
                Ok(set)
            }
            Err(e) => self.fallback(company_id, e),
        }
    }

    async fn metric_history(
        &self,
        company_id: Uuid,
        metric: &str,
        periods: usize,
    ) -> EngineResult<Vec<f64>> {
        self.inner.metric_history(company_id, metric, periods).await
    }
}

/// Market data provider with retry, breaker and last-good fallback.
pub struct GuardedMarketProvider {
    inner: Arc<dyn MarketDataProvider>,
    registry: Arc<EngineRegistry>,
    max_attempts: u32,
    backoff: Duration,
    last_good: DashMap<Uuid, MarketSnapshot>,
}

impl GuardedMarketProvider {
    pub fn new(
        inner: Arc<dyn MarketDataProvider>,
        registry: Arc<EngineRegistry>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self { inner, registry, max_attempts, backoff, last_good: DashMap::new() }
    }

    fn fallback(&self, company_id: Uuid, err: EngineError) -> EngineResult<MarketSnapshot> {
        match self.last_good.get(&company_id) {
            Some(cached) => {
                tracing::warn!(%company_id, "serving cached market snapshot: {err}");
                Ok(cached.clone())
            }
            None => Err(EngineError::UpstreamUnavailable(format!(
                "market data for {company_id} unavailable and no cache: {err}"
            ))),
        }
    }
}

#[async_trait]
impl MarketDataProvider for GuardedMarketProvider {
    async fn snapshot(&self, company_id: Uuid, as_of: NaiveDate) -> EngineResult<MarketSnapshot> {
        if self.registry.breaker_open(MARKET_UPSTREAM) {
            return self.fallback(
                company_id,
                EngineError::UpstreamUnavailable("circuit open".into()),
            );
        }

        let inner = &self.inner;
        let result = with_retries(
            &self.registry,
            MARKET_UPSTREAM,
            self.max_attempts,
            self.backoff,
            || inner.snapshot(company_id, as_of),
        )
        .await;

        match result {
            Ok(snapshot) => {
                self.last_good.insert(company_id, snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => self.fallback(company_id, e),
        }
    }

    async fn close_on(&self, company_id: Uuid, date: NaiveDate) -> EngineResult<Decimal> {
        self.inner.close_on(company_id, date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Upstream that fails for the first `fail_first` calls, then serves.
    struct FlakyStatements {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl StatementProvider for FlakyStatements {
        async fn statements(
            &self,
            _company_id: Uuid,
            _as_of: NaiveDate,
        ) -> EngineResult<StatementSet> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(EngineError::UpstreamUnavailable("timeout".into()))
            } else {
                Ok(StatementSet::default())
            }
        }

        async fn metric_history(
            &self,
            _company_id: Uuid,
            _metric: &str,
            _periods: usize,
        ) -> EngineResult<Vec<f64>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let registry = EngineRegistry::init(5, Duration::from_secs(60));
        let flaky = Arc::new(FlakyStatements { calls: AtomicU32::new(0), fail_first: 2 });
        let guarded = GuardedStatementProvider::new(
            flaky.clone(),
            registry,
            3,
            Duration::from_millis(1),
        );
        let company = Uuid::new_v4();
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();

        assert!(guarded.statements(company, as_of).await.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_open_breaker_serves_cache() {
        let registry = EngineRegistry::init(3, Duration::from_secs(60));
        // Succeeds once (priming the cache), then always fails.
        let flaky = Arc::new(FlakyStatements { calls: AtomicU32::new(0), fail_first: 0 });
        let guarded = GuardedStatementProvider::new(
            flaky.clone(),
            registry.clone(),
            3,
            Duration::from_millis(1),
        );
        let company = Uuid::new_v4();
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();

        assert!(guarded.statements(company, as_of).await.is_ok());

        // Force the breaker open; the cached snapshot keeps serving.
        registry.record_upstream_failure("statements");
        registry.record_upstream_failure("statements");
        registry.record_upstream_failure("statements");
        assert!(registry.breaker_open("statements"));
        assert!(guarded.statements(company, as_of).await.is_ok());

        // No cache for an unknown company: the failure surfaces.
        let unknown = Uuid::new_v4();
        let err = guarded.statements(unknown, as_of).await.unwrap_err();
        assert!(matches!(err, EngineError::UpstreamUnavailable(_)));
    }
}
