//! Circuit breaker for calls to unreliable dependencies.
//!
//! ```text
//!  CLOSED ──failure threshold──► OPEN ──timeout──► HALF_OPEN ──success threshold──► CLOSED
//!                                 ▲                   │
//!                                 └─────any failure───┘
//! ```
//!
//! Breakers are process-local and never persisted. A [`BreakerRegistry`] hands
//! out one shared breaker per resource name; the registry itself is an owned
//! value, so independent engines (and tests) never share counters.

use std::{collections::HashMap, fmt, future::Future, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds of one breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures (while closed) needed to open the circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close it again.
    pub success_threshold: u32,
    /// Cool-down before an open circuit lets a probe through.
    pub timeout_ms: u64,
}

impl BreakerConfig {
    pub const fn new(failure_threshold: u32, success_threshold: u32, timeout_ms: u64) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            timeout_ms,
        }
    }

    pub const fn external_api() -> Self {
        Self::new(10, 3, 60_000)
    }

    pub const fn database() -> Self {
        Self::new(5, 2, 30_000)
    }

    pub const fn cache() -> Self {
        Self::new(3, 1, 10_000)
    }

    pub const fn webhook() -> Self {
        Self::new(20, 5, 120_000)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::new(5, 2, 60_000)
    }
}

/// Point-in-time copy of a breaker's counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakerStats {
    pub name: String,
    pub state: BreakerState,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub successful_calls: u64,
    pub half_open_successes: u32,
    pub last_error: Option<String>,
    pub last_failure_at: Option<Instant>,
    pub opened_at: Option<Instant>,
    pub next_attempt_at: Option<Instant>,
}

/// Rejection returned while the circuit is open; the wrapped call never ran.
#[derive(Clone, Debug, Error)]
#[error("circuit breaker \"{resource}\" is open, retry in {}ms", .retry_in.as_millis())]
pub struct BreakerOpen {
    pub resource: String,
    pub last_error: Option<String>,
    pub next_attempt_at: Instant,
    pub retry_in: Duration,
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker refused the call.
    Open(BreakerOpen),
    /// The wrapped call ran and failed.
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(open) => open.fmt(f),
            Self::Inner(err) => err.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(open) => Some(open),
            Self::Inner(err) => Some(err),
        }
    }
}

type StateChangeHook = Box<dyn Fn(BreakerState, BreakerState) + Send + Sync>;

#[derive(Debug, Default)]
struct Counters {
    total_calls: u64,
    failed_calls: u64,
    successful_calls: u64,
    half_open_successes: u32,
    last_error: Option<String>,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    counters: Counters,
}

type Transition = (BreakerState, BreakerState);

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    on_state_change: Option<StateChangeHook>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                counters: Counters::default(),
            }),
            on_state_change: None,
        }
    }

    /// Registers a callback run with `(from, to)` after every transition.
    pub fn with_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        let c = &inner.counters;
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            total_calls: c.total_calls,
            failed_calls: c.failed_calls,
            successful_calls: c.successful_calls,
            half_open_successes: c.half_open_successes,
            last_error: c.last_error.clone(),
            last_failure_at: c.last_failure_at,
            opened_at: c.opened_at,
            next_attempt_at: c.next_attempt_at,
        }
    }

    /// Runs `call` unless the circuit is open.
    ///
    /// The lock is never held across the call, so concurrent callers may all
    /// probe while half-open.
    pub async fn execute<T, E, F, Fut>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.before_call().map_err(BreakerError::Open)?;
        match call().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure(err.to_string());
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Forces the circuit open, starting a fresh cool-down.
    pub fn open(&self) {
        let change = {
            let mut inner = self.inner.lock();
            self.trip(&mut inner, Instant::now())
        };
        self.notify(change);
    }

    /// Forces the circuit closed.
    pub fn close(&self) {
        let change = {
            let mut inner = self.inner.lock();
            Self::enter_closed(&mut inner)
        };
        self.notify(change);
    }

    /// Closes the circuit and zeroes every counter.
    pub fn reset(&self) {
        let change = {
            let mut inner = self.inner.lock();
            let from = inner.state;
            inner.state = BreakerState::Closed;
            inner.counters = Counters::default();
            (from != BreakerState::Closed).then_some((from, BreakerState::Closed))
        };
        self.notify(change);
    }

    /// Moves an open circuit to half-open without waiting for the timeout.
    pub fn attempt_recovery(&self) {
        let change = {
            let mut inner = self.inner.lock();
            if inner.state == BreakerState::Open {
                Self::enter_half_open(&mut inner)
            } else {
                None
            }
        };
        self.notify(change);
    }

    fn before_call(&self) -> Result<(), BreakerOpen> {
        let change = {
            let mut inner = self.inner.lock();
            if inner.state != BreakerState::Open {
                return Ok(());
            }
            let now = Instant::now();
            let next = inner.counters.next_attempt_at.unwrap_or(now);
            if now < next {
                return Err(BreakerOpen {
                    resource: self.name.clone(),
                    last_error: inner.counters.last_error.clone(),
                    next_attempt_at: next,
                    retry_in: next - now,
                });
            }
            Self::enter_half_open(&mut inner)
        };
        self.notify(change);
        Ok(())
    }

    fn on_success(&self) {
        let change = {
            let mut inner = self.inner.lock();
            inner.counters.total_calls += 1;
            inner.counters.successful_calls += 1;
            if inner.state == BreakerState::HalfOpen {
                inner.counters.half_open_successes += 1;
                if inner.counters.half_open_successes >= self.config.success_threshold {
                    Self::enter_closed(&mut inner)
                } else {
                    None
                }
            } else {
                None
            }
        };
        self.notify(change);
    }

    fn on_failure(&self, error: String) {
        let change = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let c = &mut inner.counters;
            c.total_calls += 1;
            c.failed_calls += 1;
            c.last_error = Some(error);
            c.last_failure_at = Some(now);

            let state = inner.state;
            match state {
                BreakerState::HalfOpen => self.trip(&mut inner, now),
                BreakerState::Closed if self.should_trip(&inner.counters) => {
                    self.trip(&mut inner, now)
                }
                _ => None,
            }
        };
        self.notify(change);
    }

    fn should_trip(&self, c: &Counters) -> bool {
        let threshold = u64::from(self.config.failure_threshold);
        c.failed_calls >= threshold
            && (c.total_calls >= threshold || c.failed_calls * 2 > c.total_calls)
    }

    fn trip(&self, inner: &mut Inner, now: Instant) -> Option<Transition> {
        let from = inner.state;
        inner.state = BreakerState::Open;
        inner.counters.opened_at = Some(now);
        inner.counters.next_attempt_at = Some(now + self.config.timeout());
        (from != BreakerState::Open).then_some((from, BreakerState::Open))
    }

    fn enter_half_open(inner: &mut Inner) -> Option<Transition> {
        let from = inner.state;
        inner.state = BreakerState::HalfOpen;
        inner.counters.half_open_successes = 0;
        (from != BreakerState::HalfOpen).then_some((from, BreakerState::HalfOpen))
    }

    // Closing forgets past failures; otherwise the next single failure would
    // trip the circuit again straight away.
    fn enter_closed(inner: &mut Inner) -> Option<Transition> {
        let from = inner.state;
        inner.state = BreakerState::Closed;
        let c = &mut inner.counters;
        c.failed_calls = 0;
        c.half_open_successes = 0;
        c.opened_at = None;
        c.next_attempt_at = None;
        (from != BreakerState::Closed).then_some((from, BreakerState::Closed))
    }

    fn notify(&self, change: Option<Transition>) {
        let Some((from, to)) = change else {
            return;
        };
        match to {
            BreakerState::Open => {
                tracing::warn!(breaker = %self.name, %from, %to, "circuit breaker opened")
            }
            _ => tracing::info!(breaker = %self.name, %from, %to, "circuit breaker state change"),
        }
        if let Some(hook) = &self.on_state_change {
            hook(from, to);
        }
    }
}

/// Named breakers shared by whoever owns the registry.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker registered under `name`, creating it with `config`
    /// on first use. Later calls ignore `config`.
    pub fn get_or_create(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }

    pub fn external_api(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(name, BreakerConfig::external_api())
    }

    pub fn database(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(name, BreakerConfig::database())
    }

    pub fn cache(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(name, BreakerConfig::cache())
    }

    pub fn webhook(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(name, BreakerConfig::webhook())
    }

    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.lock().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Stats of every registered breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.lock().values().cloned().collect();
        let mut stats: Vec<BreakerStats> = breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<String>> {
        breaker
            .execute(|| async { Err::<(), _>("boom".to_string()) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<String>> {
        breaker.execute(|| async { Ok::<_, String>(7) }).await
    }

    fn small() -> BreakerConfig {
        BreakerConfig::new(3, 2, 1_000)
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_rejects_without_calling() {
        let breaker = CircuitBreaker::new("db", small());
        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = breaker
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        let Err(BreakerError::Open(open)) = result else {
            panic!("expected an open-circuit rejection");
        };
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(open.resource, "db");
        assert_eq!(open.last_error.as_deref(), Some("boom"));
        assert_eq!(open.retry_in, Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new("db", small());
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), BreakerState::Closed);

        let stats = breaker.stats();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.failed_calls, 2);
        assert_eq!(stats.successful_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_after_timeout_and_closes_on_success_threshold() {
        let breaker = CircuitBreaker::new("db", small());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(succeed(&breaker).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.stats().failed_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("db", small());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_millis(1_000)).await;

        assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(succeed(&breaker).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_controls_and_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let breaker = CircuitBreaker::new("api", small())
            .with_state_change(move |from, to| sink.lock().push((from, to)));

        breaker.open();
        breaker.attempt_recovery();
        breaker.close();
        fail(&breaker).await.unwrap_err();
        breaker.reset();

        assert_eq!(
            *seen.lock(),
            vec![
                (BreakerState::Closed, BreakerState::Open),
                (BreakerState::Open, BreakerState::HalfOpen),
                (BreakerState::HalfOpen, BreakerState::Closed),
            ]
        );
        assert_eq!(breaker.stats().total_calls, 0);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn presets_match_documented_defaults() {
        assert_eq!(BreakerConfig::external_api(), BreakerConfig::new(10, 3, 60_000));
        assert_eq!(BreakerConfig::database(), BreakerConfig::new(5, 2, 30_000));
        assert_eq!(BreakerConfig::cache(), BreakerConfig::new(3, 1, 10_000));
        assert_eq!(BreakerConfig::webhook(), BreakerConfig::new(20, 5, 120_000));
    }

    #[test]
    fn registries_are_isolated_and_share_by_name() {
        let a = BreakerRegistry::new();
        let b = BreakerRegistry::new();

        let first = a.database("postgres");
        let again = a.get_or_create("postgres", BreakerConfig::cache());
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.config(), BreakerConfig::database());

        first.open();
        assert!(b.get("postgres").is_none());
        assert_eq!(b.database("postgres").state(), BreakerState::Closed);

        a.reset_all();
        assert_eq!(a.snapshot()[0].state, BreakerState::Closed);
    }
}
