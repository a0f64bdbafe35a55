//! Circuit breaker implementation using state machines
//!
//! The legal transitions live in a `state_machine!` table; `CircuitBreaker`
//! decides when to fire them. State and window metrics sit together behind
//! one `RwLock` so admission decisions always see a consistent pair, while
//! the wrapped operation itself runs with the lock released.

use crate::{
    State,
    callbacks::Callbacks,
    clock::{Clock, MonotonicClock},
    errors::{CircuitError, ConfigError},
    metrics::Metrics,
    trip::{TripPolicy, TripStrategy},
};
use parking_lot::RwLock;
use state_machines::state_machine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Length of a closed-state observation window.
    /// `Duration::ZERO` keeps a single window for as long as the circuit stays closed.
    pub window_interval: Duration,

    /// Trial calls admitted per half-open episode, and the consecutive
    /// successes needed to close again
    pub half_open_max_calls: u64,

    /// Cool-down before an open circuit lets a trial call through
    pub sleep_timeout: Duration,

    /// Rule that opens a closed circuit
    pub trip_policy: TripPolicy,

    /// Jitter factor for sleep_timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_interval: Duration::from_secs(60),
            half_open_max_calls: 2,
            sleep_timeout: Duration::from_secs(30),
            trip_policy: TripPolicy::default(),
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::ZeroHalfOpenMaxCalls);
        }
        if self.sleep_timeout.is_zero() {
            return Err(ConfigError::ZeroSleepTimeout);
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.jitter_factor));
        }
        self.trip_policy.validate()
    }
}

/// Shared data handed to the state machine guards
#[derive(Debug, Clone)]
pub struct CircuitContext {
    pub name: String,
    pub clock: Arc<dyn Clock>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            clock: Arc::new(MonotonicClock),
        }
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: Option<Instant>,
    /// Cool-down for this episode (sleep_timeout after jitter)
    pub cooldown: Duration,
}

state_machine! {
    name: Breaker,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen,
    ],
    events {
        trip {
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [cooldown_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            transition: { from: [HalfOpen, Open], to: Closed }
        }
    }
}

impl Breaker<Open> {
    fn cooldown_elapsed(&self, ctx: &CircuitContext) -> bool {
        let Some(data) = self.state_data_open() else {
            return true;
        };
        match data.opened_at {
            // A cool-down past the end of representable time never elapses
            Some(at) => at
                .checked_add(data.cooldown)
                .is_some_and(|deadline| ctx.clock.now() >= deadline),
            None => true,
        }
    }
}

fn state_of(machine: &DynamicBreaker) -> State {
    match machine.current_state() {
        "Open" => State::Open,
        "HalfOpen" => State::HalfOpen,
        _ => State::Closed,
    }
}

/// Expiry of the window that starts when `entering` is entered at `now`.
/// Intervals too large to add to `now` mean no expiry.
fn window_expiry(config: &Config, entering: State, now: Instant) -> Option<Instant> {
    match entering {
        State::Closed if config.window_interval.is_zero() => None,
        State::Closed => now.checked_add(config.window_interval),
        // Bookkeeping only, admission uses the Open state data
        State::Open => now.checked_add(config.sleep_timeout),
        State::HalfOpen => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    from: State,
    to: State,
}

/// An admitted call: the window it was counted in, and the transition
/// admission caused (if any)
#[derive(Debug, Clone, Copy)]
struct Admission {
    batch: u64,
    transition: Option<Transition>,
}

struct Inner {
    machine: DynamicBreaker,
    metrics: Metrics,
}

impl Inner {
    fn state(&self) -> State {
        state_of(&self.machine)
    }
}

/// Circuit breaker public API
///
/// Share it between threads with `Arc<CircuitBreaker>`; every method takes `&self`.
pub struct CircuitBreaker {
    context: CircuitContext,
    config: Config,
    trip: Arc<dyn TripStrategy>,
    callbacks: Callbacks,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    /// Create a circuit breaker on the real clock (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self, ConfigError> {
        let context = CircuitContext {
            name: name.into(),
            clock: Arc::new(MonotonicClock),
        };
        let trip = config.trip_policy.into_strategy();
        Self::from_parts(context, config, trip, Callbacks::new())
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    pub(crate) fn from_parts(
        context: CircuitContext,
        config: Config,
        trip: Arc<dyn TripStrategy>,
        callbacks: Callbacks,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let now = context.clock.now();
        let mut metrics = Metrics::new();
        metrics.start_new_batch();
        metrics.window_expiry = window_expiry(&config, State::Closed, now);

        let machine = DynamicBreaker::new(context.clone());

        Ok(Self {
            context,
            config,
            trip,
            callbacks,
            inner: RwLock::new(Inner { machine, metrics }),
        })
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// The operation runs outside the breaker's lock. If it (or a transition
    /// callback fired on admission) panics, the call is recorded as a failure
    /// before the panic continues to unwind.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let admission = self.before_call()?;
        let guard = CallGuard {
            breaker: self,
            batch: admission.batch,
            settled: false,
        };
        self.notify(admission.transition);

        let result = f();
        guard.settle(result.is_ok());

        result.map_err(CircuitError::Execution)
    }

    /// Current state
    pub fn state(&self) -> State {
        self.inner.read().state()
    }

    /// Snapshot of the current window's counters
    pub fn metrics(&self) -> Metrics {
        self.inner.read().metrics
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpen
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    /// Open the circuit now, regardless of metrics
    pub fn force_open(&self) {
        let transition = {
            let mut inner = self.inner.write();
            if inner.state() == State::Open {
                return;
            }
            warn!(circuit = %self.context.name, "circuit opened manually");
            let now = self.context.clock.now();
            self.transition(&mut inner, BreakerEvent::Trip, now)
        };
        self.notify(transition);
    }

    /// Close the circuit now, without waiting for the cool-down or a trial call
    pub fn force_close(&self) {
        let transition = {
            let mut inner = self.inner.write();
            if inner.state() == State::Closed {
                return;
            }
            warn!(circuit = %self.context.name, "circuit closed manually");
            let now = self.context.clock.now();
            self.transition(&mut inner, BreakerEvent::Close, now)
        };
        self.notify(transition);
    }

    /// Admission check. Counts the attempt in the same critical section so a
    /// half-open episode can never admit more than its budget.
    fn before_call<E>(&self) -> Result<Admission, CircuitError<E>> {
        let mut inner = self.inner.write();
        let now = self.context.clock.now();
        let mut transition = None;

        match inner.state() {
            State::Open => {
                transition = self.transition(&mut inner, BreakerEvent::AttemptReset, now);
                if transition.is_none() {
                    let retry_after = inner
                        .machine
                        .open_data()
                        .and_then(|data| {
                            data.opened_at.map(|at| match at.checked_add(data.cooldown) {
                                Some(deadline) => deadline.saturating_duration_since(now),
                                None => Duration::MAX,
                            })
                        })
                        .unwrap_or_default();
                    debug!(circuit = %self.context.name, ?retry_after, "call rejected, circuit open");
                    return Err(CircuitError::Open {
                        circuit: self.context.name.clone(),
                        retry_after,
                    });
                }
            }
            State::HalfOpen => {
                if inner.metrics.count_all >= self.config.half_open_max_calls {
                    debug!(
                        circuit = %self.context.name,
                        limit = self.config.half_open_max_calls,
                        "call rejected, trial budget exhausted"
                    );
                    return Err(CircuitError::TooManyTrialCalls {
                        circuit: self.context.name.clone(),
                        limit: self.config.half_open_max_calls,
                    });
                }
            }
            State::Closed => {
                if let Some(expiry) = inner.metrics.window_expiry
                    && now >= expiry
                {
                    self.next_window(&mut inner, now);
                    debug!(
                        circuit = %self.context.name,
                        batch = inner.metrics.window_batch,
                        "closed window rolled over"
                    );
                }
            }
        }

        inner.metrics.record_attempt();
        trace!(
            circuit = %self.context.name,
            state = %inner.state(),
            batch = inner.metrics.window_batch,
            count_all = inner.metrics.count_all,
            "call admitted"
        );
        Ok(Admission {
            batch: inner.metrics.window_batch,
            transition,
        })
    }

    /// Outcome accounting and the transitions it drives. Outcomes of calls
    /// admitted in an earlier window are dropped.
    fn after_call(&self, batch: u64, success: bool) -> Option<Transition> {
        let mut inner = self.inner.write();
        if inner.metrics.window_batch != batch {
            debug!(
                circuit = %self.context.name,
                admitted_batch = batch,
                batch = inner.metrics.window_batch,
                success,
                "outcome from a previous window ignored"
            );
            return None;
        }

        let now = self.context.clock.now();
        let state = inner.state();

        if success {
            inner.metrics.record_success();
        } else {
            inner.metrics.record_failure();
        }

        let m = inner.metrics;
        trace!(
            circuit = %self.context.name,
            success,
            batch = m.window_batch,
            count_all = m.count_all,
            count_success = m.count_success,
            count_fail = m.count_fail,
            consecutive_success = m.consecutive_success,
            consecutive_fail = m.consecutive_fail,
            "call finished"
        );

        match state {
            State::HalfOpen if success => {
                if m.consecutive_success >= self.config.half_open_max_calls {
                    return self.transition(&mut inner, BreakerEvent::Close, now);
                }
            }
            // Any failed trial call re-opens
            State::HalfOpen => return self.transition(&mut inner, BreakerEvent::Trip, now),
            State::Closed if !success && self.trip.should_trip(&m) => {
                return self.transition(&mut inner, BreakerEvent::Trip, now);
            }
            _ => {}
        }
        None
    }

    /// Fire `event`; on a real state change start a fresh window and stamp
    /// the open time when entering Open
    fn transition(
        &self,
        inner: &mut Inner,
        event: BreakerEvent,
        now: Instant,
    ) -> Option<Transition> {
        let from = inner.state();
        inner.machine.handle(event).ok()?;
        let to = inner.state();
        if from == to {
            return None;
        }

        if to == State::Open {
            let cooldown = self.cooldown();
            if let Some(data) = inner.machine.open_data_mut() {
                data.opened_at = Some(now);
                data.cooldown = cooldown;
            }
        }
        self.next_window(inner, now);

        match to {
            State::Open => warn!(
                circuit = %self.context.name,
                %from,
                %to,
                batch = inner.metrics.window_batch,
                "circuit state changed"
            ),
            _ => info!(
                circuit = %self.context.name,
                %from,
                %to,
                batch = inner.metrics.window_batch,
                "circuit state changed"
            ),
        }

        Some(Transition { from, to })
    }

    /// Start a new window for the current state
    fn next_window(&self, inner: &mut Inner, now: Instant) {
        let state = inner.state();
        inner.metrics.start_new_batch();
        inner.metrics.reset_counters();
        inner.metrics.window_expiry = window_expiry(&self.config, state, now);
    }

    /// Cool-down for a new open episode
    fn cooldown(&self) -> Duration {
        if self.config.jitter_factor > 0.0 {
            let timeout_ms =
                u64::try_from(self.config.sleep_timeout.as_millis()).unwrap_or(u64::MAX);
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: timeout_ms,
                multiplier: 1.0,
                max_delay_ms: timeout_ms,
            };
            Duration::from_millis(policy.calculate_delay(1, self.config.jitter_factor))
        } else {
            self.config.sleep_timeout
        }
    }

    /// Runs callbacks; must be called with the lock released
    fn notify(&self, transition: Option<Transition>) {
        if let Some(Transition { from, to }) = transition {
            self.callbacks.notify(&self.context.name, from, to);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &inner.state())
            .field("metrics", &inner.metrics)
            .field("config", &self.config)
            .field("trip", &self.trip)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

/// Records the outcome of an admitted call, including when the operation panics
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    batch: u64,
    settled: bool,
}

impl CallGuard<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        let transition = self.breaker.after_call(self.batch, success);
        self.breaker.notify(transition);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let transition = self.breaker.after_call(self.batch, false);
            self.breaker.notify(transition);
        }
    }
}
