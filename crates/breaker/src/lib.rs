//! A small circuit breaker shared by every external dependency call (bus, SFU).
//!
//! Three states: `Closed` (calls pass through), `Open` (calls short-circuit
//! immediately), `HalfOpen` (a single probe is allowed through to decide
//! whether to close again). One breaker instance per dependency, shared
//! across all calls to that dependency — never per-call.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that force the breaker open.
    pub consecutive_failure_threshold: u32,
    /// Failure ratio over `window` that forces the breaker open.
    pub failure_ratio_threshold: f64,
    /// Sliding window used for the ratio calculation.
    pub window: Duration,
    /// How long the breaker stays open before allowing a probe.
    pub cooloff: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failure_threshold: 5,
            failure_ratio_threshold: 0.6,
            window: Duration::from_secs(60),
            cooloff: Duration::from_secs(15),
        }
    }
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probe_in_flight: bool,
    outcomes: VecDeque<(Instant, bool)>,
    trips: u64,
}

/// Thread-safe breaker; cheap to clone (wraps an `Arc` internally via the caller).
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

/// Returned by [`CircuitBreaker::call`] when the breaker refuses the call outright.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probe_in_flight: false,
                outcomes: VecDeque::new(),
                trips: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), BreakerState::Open)
    }

    pub fn trip_count(&self) -> u64 {
        self.inner.lock().trips
    }

    /// Call `should_i_proceed=true` before issuing the real call, then report
    /// the outcome with [`record_success`]/[`record_failure`]. Most callers
    /// should prefer [`CircuitBreaker::call`] instead.
    fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        self.maybe_transition_to_half_open(&mut inner);
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    false
                } else {
                    inner.half_open_probe_in_flight = true;
                    true
                }
            }
        }
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.cooloff {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_probe_in_flight = false;
                }
            }
        }
    }

    fn prune_window(&self, inner: &mut Inner, now: Instant) {
        while let Some((ts, _)) = inner.outcomes.front() {
            if now.duration_since(*ts) > self.config.window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.consecutive_failures = 0;
        inner.outcomes.push_back((now, true));
        self.prune_window(&mut inner, now);

        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.half_open_probe_in_flight = false;
                inner.opened_at = None;
                tracing::info!(breaker = %self.name, "circuit breaker closed after successful probe");
            }
            BreakerState::Open => {
                // A stray success recorded after the breaker reopened concurrently; ignore.
            }
            BreakerState::Closed => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.consecutive_failures += 1;
        inner.outcomes.push_back((now, false));
        self.prune_window(&mut inner, now);

        if inner.state == BreakerState::HalfOpen {
            inner.half_open_probe_in_flight = false;
        }

        if inner.state != BreakerState::Open {
            let total = inner.outcomes.len() as f64;
            let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count() as f64;
            let ratio = if total > 0.0 { failures / total } else { 0.0 };

            if inner.consecutive_failures >= self.config.consecutive_failure_threshold
                || ratio > self.config.failure_ratio_threshold
            {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.trips += 1;
                tracing::warn!(
                    breaker = %self.name,
                    consecutive = inner.consecutive_failures,
                    ratio,
                    "circuit breaker opened"
                );
            }
        }
    }

    /// Run `f` through the breaker. Short-circuits with `BreakerError::Open`
    /// without invoking `f` at all when the breaker is open or a half-open
    /// probe is already in flight.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open);
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }
}
