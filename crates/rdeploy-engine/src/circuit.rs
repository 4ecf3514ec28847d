//! Per-service circuit breaking.
//!
//! A circuit counts consecutive failures of one key's operation. Once the
//! count reaches the threshold the circuit opens and calls are rejected
//! without invoking the operation. After the cooldown the next call becomes
//! a single half-open trial: success closes the circuit, failure reopens it.
//!
//! State lives in a [`CircuitBreakerRegistry`] owned by one orchestrator. It
//! is created lazily per key and never persisted.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use rdeploy_config::CircuitSettings;
use rdeploy_utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CircuitRecord {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Duration>,
    opened_at: Option<Duration>,
}

/// Serializable copy of one circuit. Timestamps are clock readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    #[serde(serialize_with = "crate::serde_secs::option::serialize")]
    pub last_failure_at: Option<Duration>,
    #[serde(serialize_with = "crate::serde_secs::option::serialize")]
    pub opened_at: Option<Duration>,
}

impl CircuitSnapshot {
    fn from_record(key: &str, record: &CircuitRecord) -> Self {
        Self {
            key: key.to_string(),
            state: record.state,
            consecutive_failures: record.consecutive_failures,
            last_failure_at: record.last_failure_at,
            opened_at: record.opened_at,
        }
    }

    /// Snapshot of a key that has never been called.
    #[must_use]
    pub fn closed(key: &str) -> Self {
        Self::from_record(key, &CircuitRecord::default())
    }
}

/// A call refused because its circuit is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpenRejection {
    pub key: String,
    pub consecutive_failures: u32,
    /// Time left until a trial call is allowed
    pub retry_in: Duration,
}

impl fmt::Display for CircuitOpenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "circuit for {} is open after {} consecutive failures; next trial in {}s",
            self.key,
            self.consecutive_failures,
            self.retry_in.as_secs()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError<E> {
    #[error("{0}")]
    Rejected(CircuitOpenRejection),
    #[error("{0}")]
    Failed(E),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one key's circuit.
///
/// The record's async mutex is held for the whole of [`execute`](Self::execute),
/// so calls for the same key never overlap and a half-open trial is
/// single-flight.
#[derive(Clone)]
pub struct CircuitBreaker {
    key: String,
    record: Arc<tokio::sync::Mutex<CircuitRecord>>,
    threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("key", &self.key)
            .field("threshold", &self.threshold)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run `operation` through the circuit.
    ///
    /// # Errors
    ///
    /// `CircuitError::Rejected` if the circuit is open and the cooldown has
    /// not elapsed (the operation is not invoked), `CircuitError::Failed`
    /// with the operation's own error otherwise.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut record = self.record.lock().await;

        if record.state == CircuitState::Open {
            let now = self.clock.now();
            let elapsed = now.saturating_sub(record.opened_at.unwrap_or(now));
            if elapsed < self.cooldown {
                debug!(
                    service = %self.key,
                    state = %record.state,
                    retry_in_secs = (self.cooldown - elapsed).as_secs(),
                    "Circuit open, rejecting call"
                );
                return Err(CircuitError::Rejected(CircuitOpenRejection {
                    key: self.key.clone(),
                    consecutive_failures: record.consecutive_failures,
                    retry_in: self.cooldown - elapsed,
                }));
            }
            record.state = CircuitState::HalfOpen;
            info!(service = %self.key, state = %record.state, "Cooldown elapsed, allowing trial call");
        }

        match operation().await {
            Ok(value) => {
                if record.state != CircuitState::Closed {
                    info!(service = %self.key, state = "closed", "Trial call succeeded, circuit closed");
                }
                record.state = CircuitState::Closed;
                record.consecutive_failures = 0;
                record.opened_at = None;
                Ok(value)
            }
            Err(error) => {
                let now = self.clock.now();
                record.consecutive_failures = record.consecutive_failures.saturating_add(1);
                record.last_failure_at = Some(now);

                let reopen = match record.state {
                    CircuitState::HalfOpen => true,
                    CircuitState::Closed => record.consecutive_failures >= self.threshold,
                    CircuitState::Open => false,
                };
                if reopen {
                    record.state = CircuitState::Open;
                    record.opened_at = Some(now);
                    warn!(
                        service = %self.key,
                        state = %record.state,
                        failures = record.consecutive_failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Circuit opened"
                    );
                } else {
                    debug!(
                        service = %self.key,
                        state = %record.state,
                        failures = record.consecutive_failures,
                        "Call failed"
                    );
                }
                Err(CircuitError::Failed(error))
            }
        }
    }

    pub async fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot::from_record(&self.key, &*self.record.lock().await)
    }
}

/// Owns every circuit of one orchestrator.
pub struct CircuitBreakerRegistry {
    threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    circuits: Mutex<BTreeMap<String, Arc<tokio::sync::Mutex<CircuitRecord>>>>,
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("threshold", &self.threshold)
            .field("cooldown", &self.cooldown)
            .field("keys", &lock(&self.circuits).keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerRegistry {
    /// A threshold of 0 is treated as 1.
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            clock,
            circuits: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &CircuitSettings, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            settings.threshold,
            Duration::from_secs(settings.cooldown),
            clock,
        )
    }

    /// The circuit for `key`, created closed on first use.
    #[must_use]
    pub fn breaker(&self, key: &str) -> CircuitBreaker {
        let record = Arc::clone(lock(&self.circuits).entry(key.to_string()).or_default());
        CircuitBreaker {
            key: key.to_string(),
            record,
            threshold: self.threshold,
            cooldown: self.cooldown,
            clock: Arc::clone(&self.clock),
        }
    }

    /// Shorthand for `self.breaker(key).execute(operation)`.
    ///
    /// # Errors
    ///
    /// See [`CircuitBreaker::execute`].
    pub async fn execute<T, E, F, Fut>(&self, key: &str, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(key).execute(operation).await
    }

    /// Current state of `key`; a key never called reports closed.
    pub async fn snapshot(&self, key: &str) -> CircuitSnapshot {
        let record = lock(&self.circuits).get(key).cloned();
        match record {
            Some(record) => CircuitSnapshot::from_record(key, &*record.lock().await),
            None => CircuitSnapshot::closed(key),
        }
    }

    /// Snapshots of every circuit created so far, ordered by key.
    pub async fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let records: Vec<_> = lock(&self.circuits)
            .iter()
            .map(|(key, record)| (key.clone(), Arc::clone(record)))
            .collect();
        let mut snapshots = Vec::with_capacity(records.len());
        for (key, record) in records {
            snapshots.push(CircuitSnapshot::from_record(&key, &*record.lock().await));
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rdeploy_utils::test_support::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(clock: &Arc<ManualClock>) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(5, Duration::from_secs(60), clock.clone())
    }

    async fn fail(registry: &CircuitBreakerRegistry, key: &str) -> CircuitError<&'static str> {
        registry
            .execute(key, || async { Err::<(), _>("start failed") })
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_opens_at_threshold_and_fails_fast_until_cooldown() {
        let clock = Arc::new(ManualClock::new());
        let registry = registry(&clock);

        for _ in 0..5 {
            assert!(matches!(fail(&registry, "mysql").await, CircuitError::Failed(_)));
        }
        let snapshot = registry.snapshot("mysql").await;
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.opened_at, Some(Duration::ZERO));

        clock.set(Duration::from_secs(30));
        let invoked = AtomicUsize::new(0);
        let result = registry
            .execute("mysql", || async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        match result {
            Err(CircuitError::Rejected(rejection)) => {
                assert_eq!(rejection.retry_in, Duration::from_secs(30));
                assert_eq!(rejection.consecutive_failures, 5);
            }
            other => panic!("Expected rejection, got {other:?}"),
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        clock.set(Duration::from_secs(61));
        let result = registry
            .execute("mysql", || async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_half_open_success_closes_and_resets_counter() {
        let clock = Arc::new(ManualClock::new());
        let registry = registry(&clock);
        for _ in 0..5 {
            fail(&registry, "api").await;
        }

        clock.set(Duration::from_secs(61));
        registry
            .execute("api", || async { Ok::<_, &str>(()) })
            .await
            .unwrap();

        let snapshot = registry.snapshot("api").await;
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.opened_at, None);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_with_new_timestamp() {
        let clock = Arc::new(ManualClock::new());
        let registry = registry(&clock);
        for _ in 0..5 {
            fail(&registry, "api").await;
        }

        clock.set(Duration::from_secs(61));
        assert!(matches!(fail(&registry, "api").await, CircuitError::Failed(_)));

        let snapshot = registry.snapshot("api").await;
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.opened_at, Some(Duration::from_secs(61)));
        assert_eq!(snapshot.last_failure_at, Some(Duration::from_secs(61)));

        clock.set(Duration::from_secs(100));
        assert!(matches!(fail(&registry, "api").await, CircuitError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_success_while_closed_resets_counter() {
        let clock = Arc::new(ManualClock::new());
        let registry = registry(&clock);
        for _ in 0..4 {
            fail(&registry, "redis").await;
        }
        registry
            .execute("redis", || async { Ok::<_, &str>(()) })
            .await
            .unwrap();
        for _ in 0..4 {
            fail(&registry, "redis").await;
        }
        let snapshot = registry.snapshot("redis").await;
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 4);
    }

    #[tokio::test]
    async fn test_keys_are_independent_and_created_lazily() {
        let clock = Arc::new(ManualClock::new());
        let registry = CircuitBreakerRegistry::new(1, Duration::from_secs(60), clock.clone());

        assert_eq!(registry.snapshot("never").await, CircuitSnapshot::closed("never"));
        assert!(registry.snapshots().await.is_empty());

        fail(&registry, "mysql").await;
        assert_eq!(registry.snapshot("mysql").await.state, CircuitState::Open);
        assert_eq!(registry.snapshot("redis").await.state, CircuitState::Closed);

        let keys: Vec<String> = registry.snapshots().await.into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["mysql"]);
    }

    #[tokio::test]
    async fn test_half_open_trial_is_single_flight() {
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(CircuitBreakerRegistry::new(
            1,
            Duration::from_secs(60),
            clock.clone(),
        ));
        fail(&registry, "api").await;
        clock.set(Duration::from_secs(61));

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                registry
                    .execute("api", || async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, &str>(())
                    })
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_display_and_serialization() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half-open\""
        );
        let json = serde_json::to_value(CircuitSnapshot::closed("mysql")).unwrap();
        assert_eq!(json["state"], "closed");
        assert!(json["opened_at"].is_null());
    }

    proptest! {
        #[test]
        fn prop_counter_tracks_trailing_failures(
            outcomes in proptest::collection::vec(any::<bool>(), 0..40),
            threshold in 1u32..6,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let clock = Arc::new(ManualClock::new());
                let registry = CircuitBreakerRegistry::new(threshold, Duration::from_secs(60), clock.clone());
                let invoked = AtomicUsize::new(0);

                let mut expected_failures = 0u32;
                let mut expected_open = false;
                let mut expected_invocations = 0usize;
                for succeed in outcomes {
                    let _ = registry
                        .execute("svc", || async {
                            invoked.fetch_add(1, Ordering::SeqCst);
                            if succeed { Ok(()) } else { Err("boom") }
                        })
                        .await;
                    if expected_open {
                        continue;
                    }
                    expected_invocations += 1;
                    if succeed {
                        expected_failures = 0;
                    } else {
                        expected_failures += 1;
                        expected_open = expected_failures >= threshold;
                    }
                }

                let snapshot = registry.snapshot("svc").await;
                prop_assert_eq!(snapshot.consecutive_failures, expected_failures);
                prop_assert_eq!(snapshot.state == CircuitState::Open, expected_open);
                prop_assert_eq!(invoked.load(Ordering::SeqCst), expected_invocations);
                Ok(())
            })?;
        }
    }
}
