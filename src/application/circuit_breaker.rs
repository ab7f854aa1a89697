//! Error-budget circuit breaker
//!
//! Tracks outcomes in a sliding window. When the failure rate crosses the
//! threshold the breaker opens: every worker pauses for the configured
//! duration, then the breaker goes half-open and admits a reduced number of
//! workers until the success rate recovers. Trips beyond the recovery
//! budget abort the run.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::infrastructure::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    outcomes: VecDeque<(Instant, bool)>, // (when, success)
    open_until: Option<Instant>,
    half_open_in_flight: usize,
    half_open_successes: u32,
    trips: u32,
}

/// Shared across all workers; cheap to probe.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    config: BreakerConfig,
}

/// Returned when the breaker has tripped more often than the recovery
/// budget allows; the orchestrator aborts with exit code 4.
#[derive(Debug, thiserror::Error)]
#[error("circuit breaker tripped {trips} times, beyond the recovery budget of {budget}")]
pub struct BeyondRecoveryBudget {
    pub trips: u32,
    pub budget: u32,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                outcomes: VecDeque::new(),
                open_until: None,
                half_open_in_flight: 0,
                half_open_successes: 0,
                trips: 0,
            }),
            config,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn trips(&self) -> u32 {
        self.inner.lock().unwrap().trips
    }

    /// Record an entry outcome and update the state machine.
    pub fn record(&self, success: bool) {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.failure_window_seconds);
        let mut inner = self.inner.lock().unwrap();

        inner.outcomes.push_back((now, success));
        while let Some((when, _)) = inner.outcomes.front() {
            if now.duration_since(*when) > window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }

        match inner.state {
            BreakerState::Closed => {
                let total = inner.outcomes.len();
                if total >= self.config.min_samples {
                    let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count();
                    let rate = failures as f64 / total as f64;
                    if rate >= self.config.failure_rate_threshold {
                        inner.state = BreakerState::Open;
                        inner.open_until =
                            Some(now + Duration::from_secs(self.config.pause_seconds));
                        inner.trips += 1;
                        inner.outcomes.clear();
                        warn!(
                            "🔌 Circuit breaker OPEN (failure rate {:.0}%, trip {}), pausing {}s",
                            rate * 100.0,
                            inner.trips,
                            self.config.pause_seconds
                        );
                    }
                }
            }
            BreakerState::HalfOpen => {
                if success {
                    inner.half_open_successes += 1;
                    // A handful of consecutive successes closes the breaker
                    if inner.half_open_successes >= self.config.half_open_permits as u32 * 2 {
                        inner.state = BreakerState::Closed;
                        inner.half_open_successes = 0;
                        inner.outcomes.clear();
                        info!("🔌 Circuit breaker CLOSED, full concurrency restored");
                    }
                } else {
                    inner.state = BreakerState::Open;
                    inner.open_until = Some(now + Duration::from_secs(self.config.pause_seconds));
                    inner.trips += 1;
                    inner.half_open_successes = 0;
                    warn!("🔌 Circuit breaker re-OPEN after half-open failure (trip {})", inner.trips);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Gate a worker before it leases. Blocks while the breaker is open,
    /// enforces reduced concurrency while half-open. Errors when the trip
    /// budget is exhausted.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<BreakerPermit<'_>, BeyondRecoveryBudget> {
        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap();

                if inner.trips > self.config.max_trips {
                    return Err(BeyondRecoveryBudget {
                        trips: inner.trips,
                        budget: self.config.max_trips,
                    });
                }

                match inner.state {
                    BreakerState::Closed => return Ok(BreakerPermit { breaker: self, limited: false }),
                    BreakerState::Open => {
                        let now = Instant::now();
                        match inner.open_until {
                            Some(until) if until > now => Some(until - now),
                            _ => {
                                inner.state = BreakerState::HalfOpen;
                                inner.half_open_successes = 0;
                                info!("🔌 Circuit breaker HALF-OPEN, probing with reduced concurrency");
                                None
                            }
                        }
                    }
                    BreakerState::HalfOpen => {
                        if inner.half_open_in_flight < self.config.half_open_permits {
                            inner.half_open_in_flight += 1;
                            return Ok(BreakerPermit { breaker: self, limited: true });
                        }
                        Some(Duration::from_millis(250))
                    }
                }
            };

            if let Some(wait) = wait {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => {
                        return Ok(BreakerPermit { breaker: self, limited: false });
                    }
                }
            }
        }
    }

    fn release_half_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
    }
}

/// Held while a worker processes one entry; frees a half-open slot on drop.
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    limited: bool,
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.limited {
            self.breaker.release_half_open();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_window_seconds: 60,
            min_samples: 4,
            failure_rate_threshold: 0.75,
            pause_seconds: 0,
            half_open_permits: 1,
            max_trips: 2,
        }
    }

    #[test]
    fn stays_closed_under_threshold() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..10 {
            breaker.record(true);
            breaker.record(false);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn opens_on_failure_rate() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..4 {
            breaker.record(false);
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.trips(), 1);
    }

    #[tokio::test]
    async fn half_open_recovery_and_reopen() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..4 {
            breaker.record(false);
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        // pause_seconds = 0: next acquire flips to half-open
        let cancel = CancellationToken::new();
        let permit = breaker.acquire(&cancel).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        drop(permit);

        breaker.record(true);
        breaker.record(true);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn trip_budget_aborts() {
        let breaker = CircuitBreaker::new(config());
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            for _ in 0..4 {
                breaker.record(false);
            }
            // flip open → half-open so the next failures can re-trip
            let _ = breaker.acquire(&cancel).await;
            breaker.record(false);
        }

        assert!(breaker.acquire(&cancel).await.is_err());
    }
}
