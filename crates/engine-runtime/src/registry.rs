//! Process-wide shared state: the active-weight cache, training locks,
//! upstream circuit breakers and the learned dimension weights.
//!
//! All of it sits behind an explicit `init()`/`shutdown()` pair; nothing is
//! created as a module-load side effect. Readers of the weight cache take an
//! `Arc` snapshot, so a concurrent update can never present a torn vector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stock_scorer::LearnedDimensionWeights;
use valuation_core::types::{WeightOwner, WeightVector};

/// Per-upstream failure tracking with a cool-off window.
#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

pub struct EngineRegistry {
    initialized: AtomicBool,
    locks: DashMap<String, Arc<Mutex<()>>>,
    breakers: DashMap<String, BreakerState>,
    weight_cache: DashMap<String, Arc<WeightVector>>,
    dimension_weights: RwLock<Option<Arc<LearnedDimensionWeights>>>,
    failure_threshold: u32,
    cooloff: Duration,
}

impl EngineRegistry {
    pub fn init(failure_threshold: u32, cooloff: Duration) -> Arc<Self> {
        let registry = Arc::new(Self {
            initialized: AtomicBool::new(true),
            locks: DashMap::new(),
            breakers: DashMap::new(),
            weight_cache: DashMap::new(),
            dimension_weights: RwLock::new(None),
            failure_threshold,
            cooloff,
        });
        tracing::info!("engine registry initialised");
        registry
    }

    /// Drop all shared state. Idempotent.
    pub fn shutdown(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.locks.clear();
            self.breakers.clear();
            self.weight_cache.clear();
            if let Ok(mut slot) = self.dimension_weights.write() {
                *slot = None;
            }
            tracing::info!("engine registry shut down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Acquire the lock for a scope key. The returned guard releases on
    /// every exit path, including cancellation of the holding task.
    pub async fn scoped_lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    // --- Circuit breaker -------------------------------------------------

    /// Whether the named upstream is currently open (calls should fall back
    /// to cached inputs).
    pub fn breaker_open(&self, upstream: &str) -> bool {
        if let Some(state) = self.breakers.get(upstream) {
            if let Some(until) = state.open_until {
                return Instant::now() < until;
            }
        }
        false
    }

    pub fn record_upstream_success(&self, upstream: &str) {
        if let Some(mut state) = self.breakers.get_mut(upstream) {
            state.consecutive_failures = 0;
            state.open_until = None;
        }
    }

    /// Record a failure; opens the breaker once the threshold is reached.
    /// Returns true when the breaker is now open.
    pub fn record_upstream_failure(&self, upstream: &str) -> bool {
        let mut state = self
            .breakers
            .entry(upstream.to_string())
            .or_insert_with(|| BreakerState { consecutive_failures: 0, open_until: None });
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            state.open_until = Some(Instant::now() + self.cooloff);
            tracing::warn!(upstream, "circuit opened after repeated failures");
            true
        } else {
            false
        }
    }

    // --- Active weight cache ---------------------------------------------

    /// Cache a snapshot of the active vector for an owner. Copy-on-write:
    /// the existing Arc held by readers stays intact.
    pub fn cache_weights(&self, vector: WeightVector) {
        self.weight_cache
            .insert(vector.owner.cache_key(), Arc::new(vector));
    }

    pub fn cached_weights(&self, owner: &WeightOwner) -> Option<Arc<WeightVector>> {
        self.weight_cache.get(&owner.cache_key()).map(|v| v.clone())
    }

    pub fn invalidate_weights(&self, owner: &WeightOwner) {
        self.weight_cache.remove(&owner.cache_key());
    }

    // --- Learned dimension weights ---------------------------------------

    pub fn publish_dimension_weights(&self, learned: LearnedDimensionWeights) {
        if let Ok(mut slot) = self.dimension_weights.write() {
            *slot = Some(Arc::new(learned));
        }
    }

    pub fn dimension_weights(&self) -> Option<Arc<LearnedDimensionWeights>> {
        self.dimension_weights.read().ok().and_then(|slot| slot.clone())
    }
}

/// Retry an upstream call with exponential backoff, feeding the breaker.
/// After the attempts are exhausted the breaker opens and the last error is
/// returned for the caller's cache fallback.
pub async fn with_retries<T, E, F, Fut>(
    registry: &EngineRegistry,
    upstream: &str,
    max_attempts: u32,
    initial_backoff: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = initial_backoff;
    let mut last_err: Option<E> = None;

    for attempt in 1..=max_attempts.max(1) {
        match op().await {
            Ok(value) => {
                registry.record_upstream_success(upstream);
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(upstream, attempt, "upstream call failed: {e}");
                registry.record_upstream_failure(upstream);
                last_err = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_err.expect("at least one attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scoped_lock_serialises() {
        let registry = EngineRegistry::init(3, Duration::from_secs(60));
        let guard = registry.scoped_lock("train:global").await;
        // A second acquisition would block; try_lock on the same key fails.
        let mutex = registry.locks.get("train:global").unwrap().clone();
        assert!(mutex.try_lock().is_err());
        drop(guard);
        assert!(mutex.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold() {
        let registry = EngineRegistry::init(3, Duration::from_secs(60));
        assert!(!registry.breaker_open("prices"));
        assert!(!registry.record_upstream_failure("prices"));
        assert!(!registry.record_upstream_failure("prices"));
        assert!(registry.record_upstream_failure("prices"));
        assert!(registry.breaker_open("prices"));

        registry.record_upstream_success("prices");
        assert!(!registry.breaker_open("prices"));
    }

    #[tokio::test]
    async fn test_retry_helper_gives_up_and_opens_breaker() {
        let registry = EngineRegistry::init(3, Duration::from_millis(1));
        let mut calls = 0u32;
        let result: Result<(), String> = with_retries(
            &registry,
            "statements",
            3,
            Duration::from_millis(1),
            || {
                calls += 1;
                async { Err("boom".to_string()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert!(registry.breaker_open("statements"));
    }

    #[tokio::test]
    async fn test_weight_cache_snapshot_semantics() {
        use chrono::Utc;
        let registry = EngineRegistry::init(3, Duration::from_secs(60));
        let owner = WeightOwner::global();
        let first = WeightVector::default_vector(owner.clone(), Utc::now());
        registry.cache_weights(first);

        let snapshot = registry.cached_weights(&owner).unwrap();
        let mut replacement = WeightVector::default_vector(owner.clone(), Utc::now());
        replacement.weights = [0.30, 0.10, 0.15, 0.12, 0.10, 0.08, 0.05, 0.10];
        registry.cache_weights(replacement);

        // The old snapshot is unchanged; a fresh read sees the new vector.
        assert!((snapshot.weights[0] - 0.20).abs() < 1e-12);
        let fresh = registry.cached_weights(&owner).unwrap();
        assert!((fresh.weights[0] - 0.30).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_shutdown_clears_state() {
        let registry = EngineRegistry::init(3, Duration::from_secs(60));
        registry.record_upstream_failure("x");
        registry.shutdown();
        assert!(!registry.is_initialized());
        assert!(registry.breakers.is_empty());
    }
}
