//! Builder API for ergonomic circuit breaker configuration

use crate::{
    State,
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitContext, Config},
    clock::{Clock, MonotonicClock},
    errors::ConfigError,
    trip::{TripPolicy, TripStrategy},
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    strategy: Option<Arc<dyn TripStrategy>>,
    clock: Option<Arc<dyn Clock>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            strategy: None,
            clock: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Length of the closed-state window (`Duration::ZERO` = never rotate)
    pub fn window_interval(mut self, interval: Duration) -> Self {
        self.config.window_interval = interval;
        self
    }

    /// Trial calls per half-open episode, also the successes needed to close
    pub fn half_open_max_calls(mut self, calls: u64) -> Self {
        self.config.half_open_max_calls = calls;
        self
    }

    /// Cool-down before an open circuit admits a trial call
    pub fn sleep_timeout(mut self, timeout: Duration) -> Self {
        self.config.sleep_timeout = timeout;
        self
    }

    pub fn trip_policy(mut self, policy: TripPolicy) -> Self {
        self.config.trip_policy = policy;
        self
    }

    /// Open after `threshold` failures in a row
    pub fn consecutive_failures(self, threshold: u64) -> Self {
        self.trip_policy(TripPolicy::ConsecutiveFailures { threshold })
    }

    /// Open after `threshold` failures within one window
    pub fn failure_count(self, threshold: u64) -> Self {
        self.trip_policy(TripPolicy::FailureCount { threshold })
    }

    /// Open when failures / calls >= `rate`, once `minimum_calls` were made
    pub fn failure_rate(self, rate: f64, minimum_calls: u64) -> Self {
        self.trip_policy(TripPolicy::FailureRate {
            rate,
            minimum_calls,
        })
    }

    /// Use a custom strategy instead of the configured policy
    ///
    /// # Examples
    ///
    /// ```rust
    /// use service_breaker::{CircuitBreaker, Metrics, PredicateStrategy};
    /// use std::sync::Arc;
    ///
    /// let circuit = CircuitBreaker::builder("api")
    ///     .trip_strategy(Arc::new(PredicateStrategy::new(|m: &Metrics| {
    ///         m.count_fail >= 2 && m.count_success == 0
    ///     })))
    ///     .build()
    ///     .unwrap();
    /// assert!(circuit.is_closed());
    /// ```
    pub fn trip_strategy(mut self, strategy: Arc<dyn TripStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Set the time source (defaults to [`MonotonicClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set callback for every state change: `(name, from, to)`
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.callbacks.on_state_change = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Validate the configuration and build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker, ConfigError> {
        let context = CircuitContext {
            name: self.name,
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock)),
        };
        let strategy = self
            .strategy
            .unwrap_or_else(|| self.config.trip_policy.into_strategy());

        CircuitBreaker::from_parts(context, self.config, strategy, self.callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CircuitError, Metrics, PredicateStrategy, clock::ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build().expect("valid config");

        assert_eq!(circuit.state_name(), "Closed");
        assert!(circuit.is_closed());
        assert_eq!(circuit.config(), &Config::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .window_interval(Duration::from_secs(120))
            .half_open_max_calls(4)
            .sleep_timeout(Duration::from_secs(60))
            .failure_rate(0.25, 20)
            .build()
            .expect("valid config");

        let config = circuit.config();
        assert_eq!(config.window_interval, Duration::from_secs(120));
        assert_eq!(config.half_open_max_calls, 4);
        assert_eq!(config.sleep_timeout, Duration::from_secs(60));
        assert_eq!(
            config.trip_policy,
            TripPolicy::FailureRate {
                rate: 0.25,
                minimum_calls: 20
            }
        );
    }

    #[test]
    fn test_builder_rejects_invalid_policy() {
        let result = CircuitBuilder::new("test").consecutive_failures(0).build();
        assert!(matches!(result, Err(ConfigError::ZeroThreshold { .. })));

        let result = CircuitBuilder::new("test").failure_rate(0.0, 5).build();
        assert!(matches!(result, Err(ConfigError::InvalidFailureRate(_))));
    }

    #[test]
    fn test_builder_with_callbacks() {
        let opened = Arc::new(AtomicUsize::new(0));
        let half_opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualClock::new());

        let (o, h, c) = (opened.clone(), half_opened.clone(), closed.clone());
        let circuit = CircuitBuilder::new("test")
            .failure_count(2)
            .half_open_max_calls(1)
            .sleep_timeout(Duration::from_secs(1))
            .clock(clock.clone())
            .on_open(move |_name| {
                o.fetch_add(1, Ordering::SeqCst);
            })
            .on_half_open(move |_name| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .on_close(move |_name| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .expect("valid config");

        let _ = circuit.call(|| Err::<(), _>("error 1"));
        let _ = circuit.call(|| Err::<(), _>("error 2"));
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(1));
        let _ = circuit.call(|| Ok::<_, &str>("recovered"));

        assert_eq!(half_opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_custom_strategy_overrides_policy() {
        let circuit = CircuitBuilder::new("test")
            .failure_count(100)
            .trip_strategy(Arc::new(PredicateStrategy::new(|m: &Metrics| {
                m.count_fail >= 1
            })))
            .build()
            .expect("valid config");

        let result = circuit.call(|| Err::<(), _>("first failure"));
        assert!(matches!(result, Err(CircuitError::Execution("first failure"))));
        assert!(circuit.is_open());
    }
}
