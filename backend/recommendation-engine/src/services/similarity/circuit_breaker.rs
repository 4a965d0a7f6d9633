/// Consecutive-failure breaker for the similarity classifier
///
/// State transitions:
/// - Closed → Open: after `failure_threshold` consecutive failures
/// - Open → HalfOpen: once `cooldown` has elapsed, a single probe is let through
/// - HalfOpen → Closed: on success
/// - HalfOpen → Open: on failure
///
/// Calls go through a `BreakerPermit`. A permit dropped without an outcome
/// (its future was cancelled) hands the probe slot back.
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pub struct ClassifierBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Admission to one classifier call. Settle it with `succeed` or `fail`.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a ClassifierBreaker,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_probe();
        }
    }
}

impl ClassifierBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// A permit if a classifier call may be attempted now
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        self.allow().then_some(BreakerPermit {
            breaker: self,
            settled: false,
        })
    }

    fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen if inner.probe_in_flight => false,
            BreakerState::HalfOpen => {
                inner.probe_in_flight = true;
                true
            }
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled {
                    info!("Similarity classifier breaker: Open → HalfOpen");
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                }
                cooled
            }
        }
    }

    fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen && inner.probe_in_flight {
            debug!("Similarity classifier probe abandoned, slot released");
            inner.probe_in_flight = false;
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!("Similarity classifier breaker: → Closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.probe_in_flight = false;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if should_open && inner.state != BreakerState::Open {
            warn!(
                consecutive_failures = inner.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Similarity classifier breaker opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}
