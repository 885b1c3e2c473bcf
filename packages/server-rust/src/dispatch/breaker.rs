//! Per-command circuit breaker.
//!
//! State machine: Closed -> Open -> HalfOpen -> (Closed | Open).
//!
//! Outcomes land in a ring of time buckets covering the trailing window.
//! All reads and transitions happen under one `parking_lot::Mutex`, so
//! concurrent outcome reports cannot tear counters or double-transition.
//! The Open -> HalfOpen move is lazy: it happens on the first admission
//! attempt after the cool-down has elapsed.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use super::error::DispatchError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning for one [`CircuitBreaker`].
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Failure ratio (failures / (successes + failures)) above which the
    /// breaker opens.
    pub failure_ratio_threshold: f64,
    /// Minimum counted outcomes in the window before the ratio is evaluated.
    pub min_requests: u32,
    /// Length of the trailing statistics window.
    pub window: Duration,
    /// Number of buckets the window is split into.
    pub buckets: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub cool_down: Duration,
    /// Concurrent trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: 0.5,
            min_requests: 20,
            window: Duration::from_secs(10),
            buckets: 10,
            cool_down: Duration::from_secs(5),
            half_open_max_calls: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Public state types
// ---------------------------------------------------------------------------

/// Lifecycle state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// How a call admitted by the breaker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Transport, timeout, exhaustion, or upstream failure.
    Failure,
    /// Business error (malformed input, not found). The backend answered,
    /// so this is tallied but never counts toward the failure ratio.
    Rejected,
}

impl Outcome {
    /// Classifies a dispatch result.
    #[must_use]
    pub fn of<T>(result: &Result<T, DispatchError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) if e.is_business() => Outcome::Rejected,
            Err(_) => Outcome::Failure,
        }
    }
}

/// Point-in-time view of a breaker, for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub command: &'static str,
    pub state: CircuitState,
    pub successes: u32,
    pub failures: u32,
    pub rejected: u32,
    pub failure_ratio: f64,
    /// Milliseconds until an open breaker admits a trial call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_remaining_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Rolling window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    epoch: u64,
    successes: u32,
    failures: u32,
    rejected: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    successes: u32,
    failures: u32,
    rejected: u32,
}

impl Totals {
    fn counted(self) -> u32 {
        self.successes + self.failures
    }

    fn failure_ratio(self) -> f64 {
        match self.counted() {
            0 => 0.0,
            n => f64::from(self.failures) / f64::from(n),
        }
    }
}

/// Ring of buckets keyed by `elapsed / bucket_width`. A slot whose epoch
/// falls outside the window is stale and ignored or recycled.
#[derive(Debug)]
struct RollingWindow {
    origin: Instant,
    bucket_width: Duration,
    slots: Vec<Bucket>,
}

impl RollingWindow {
    fn new(window: Duration, buckets: u32, origin: Instant) -> Self {
        let buckets = buckets.max(1);
        let bucket_width = (window / buckets).max(Duration::from_millis(1));
        Self {
            origin,
            bucket_width,
            // Epoch 0 is live at start, so slots begin at an impossible epoch.
            slots: vec![
                Bucket {
                    epoch: u64::MAX,
                    ..Bucket::default()
                };
                buckets as usize
            ],
        }
    }

    fn epoch_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin);
        #[allow(clippy::cast_possible_truncation)]
        let epoch = (elapsed.as_nanos() / self.bucket_width.as_nanos()) as u64;
        epoch
    }

    fn is_live(&self, slot_epoch: u64, current: u64) -> bool {
        slot_epoch != u64::MAX && current.saturating_sub(slot_epoch) < self.slots.len() as u64
    }

    fn record(&mut self, outcome: Outcome, now: Instant) {
        let epoch = self.epoch_at(now);
        #[allow(clippy::cast_possible_truncation)]
        let index = (epoch % self.slots.len() as u64) as usize;
        let slot = &mut self.slots[index];
        if slot.epoch != epoch {
            *slot = Bucket {
                epoch,
                ..Bucket::default()
            };
        }
        match outcome {
            Outcome::Success => slot.successes += 1,
            Outcome::Failure => slot.failures += 1,
            Outcome::Rejected => slot.rejected += 1,
        }
    }

    fn totals(&self, now: Instant) -> Totals {
        let current = self.epoch_at(now);
        self.slots
            .iter()
            .filter(|slot| self.is_live(slot.epoch, current))
            .fold(Totals::default(), |acc, slot| Totals {
                successes: acc.successes + slot.successes,
                failures: acc.failures + slot.failures,
                rejected: acc.rejected + slot.rejected,
            })
    }

    fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.epoch = u64::MAX;
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: RollingWindow,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
}

/// Rolling-window circuit breaker for one command.
#[derive(Debug)]
pub struct CircuitBreaker {
    command: &'static str,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(command: &'static str, config: BreakerConfig) -> Self {
        let window = RollingWindow::new(config.window, config.buckets, Instant::now());
        Self {
            command,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                trials_in_flight: 0,
            }),
        }
    }

    #[must_use]
    pub fn command(&self) -> &'static str {
        self.command
    }

    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, applying a due Open -> HalfOpen move first.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.promote_if_cooled(&mut inner, Instant::now());
        inner.state
    }

    /// Asks to run one call.
    ///
    /// # Errors
    ///
    /// `CircuitOpen` while open, or while half-open with every trial slot
    /// taken. No statistics are touched on rejection.
    pub fn try_acquire(&self) -> Result<Permit<'_>, DispatchError> {
        let mut inner = self.inner.lock();
        self.promote_if_cooled(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::HalfOpen
                if inner.trials_in_flight < self.config.half_open_max_calls.max(1) =>
            {
                inner.trials_in_flight += 1;
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen | CircuitState::Open => Err(DispatchError::CircuitOpen {
                command: self.command,
            }),
        }
    }

    /// Current counters and state.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.promote_if_cooled(&mut inner, now);
        let totals = inner.window.totals(now);

        let open_remaining_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                let due = opened_at + self.config.cool_down;
                #[allow(clippy::cast_possible_truncation)]
                let ms = due.saturating_duration_since(now).as_millis() as u64;
                Some(ms)
            }
            _ => None,
        };

        BreakerSnapshot {
            command: self.command,
            state: inner.state,
            successes: totals.successes,
            failures: totals.failures,
            rejected: totals.rejected,
            failure_ratio: totals.failure_ratio(),
            open_remaining_ms,
        }
    }

    fn record(&self, outcome: Outcome, trial: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            if inner.state == CircuitState::HalfOpen {
                match outcome {
                    Outcome::Success | Outcome::Rejected => {
                        inner.window.reset();
                        inner.window.record(outcome, now);
                        self.transition(&mut inner, CircuitState::Closed, now);
                    }
                    Outcome::Failure => self.transition(&mut inner, CircuitState::Open, now),
                }
                return;
            }
        }

        inner.window.record(outcome, now);
        if inner.state == CircuitState::Closed && outcome == Outcome::Failure {
            let totals = inner.window.totals(now);
            if totals.counted() >= self.config.min_requests
                && totals.failure_ratio() > self.config.failure_ratio_threshold
            {
                tracing::warn!(
                    command = self.command,
                    failures = totals.failures,
                    successes = totals.successes,
                    ratio = totals.failure_ratio(),
                    "failure ratio over threshold, opening circuit"
                );
                self.transition(&mut inner, CircuitState::Open, now);
            }
        }
    }

    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
    }

    fn promote_if_cooled(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = match inner.opened_at {
            Some(opened_at) => now.saturating_duration_since(opened_at) >= self.config.cool_down,
            None => true,
        };
        if cooled {
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState, now: Instant) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        match to {
            CircuitState::Open => inner.opened_at = Some(now),
            CircuitState::HalfOpen => inner.trials_in_flight = 0,
            CircuitState::Closed => inner.opened_at = None,
        }
        tracing::info!(
            command = self.command,
            from = from.as_str(),
            to = to.as_str(),
            "circuit state changed"
        );
        metrics::counter!(
            "linkgate_breaker_transitions_total",
            "command" => self.command,
            "to" => to.as_str()
        )
        .increment(1);
    }
}

// ---------------------------------------------------------------------------
// Permit
// ---------------------------------------------------------------------------

/// Admission ticket for one call. Consume it with [`Permit::record`].
///
/// A permit dropped unrecorded after its deadline (see
/// [`Permit::with_deadline`]) counts as a failure: the call ran out of time
/// without reporting. Dropped before the deadline (cancelled caller), or
/// given back with [`Permit::release`], it frees its trial slot and leaves
/// the statistics alone.
#[must_use = "an unrecorded permit reports nothing to the breaker"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
    deadline: Option<Instant>,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            recorded: false,
            deadline: None,
        }
    }

    /// Binds the permit to the call's deadline.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether this call is a half-open trial.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, outcome: Outcome) {
        self.recorded = true;
        self.breaker.record(outcome, self.trial);
    }

    /// Gives the permit back without reporting an outcome.
    pub fn release(mut self) {
        self.deadline = None;
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::debug!(command = self.breaker.command, "call abandoned past its deadline");
            self.breaker.record(Outcome::Failure, self.trial);
        } else if self.trial {
            self.breaker.release_trial();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
