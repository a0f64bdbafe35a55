//! Trip strategies - decide when a closed circuit should open
//!
//! A strategy is a pure predicate over the current window's [`Metrics`].
//! The breaker evaluates it only while `Closed`, once per failed call.
//! [`TripPolicy`] is the configuration-side choice; it is resolved once,
//! at construction, into an `Arc<dyn TripStrategy>`.

use crate::{errors::ConfigError, metrics::Metrics};
use std::sync::Arc;

/// Predicate deciding whether accumulated failures should open the circuit
///
/// # Examples
///
/// ```rust
/// use service_breaker::{Metrics, TripStrategy};
///
/// #[derive(Debug)]
/// struct AnyFailure;
///
/// impl TripStrategy for AnyFailure {
///     fn should_trip(&self, metrics: &Metrics) -> bool {
///         metrics.count_fail > 0
///     }
/// }
/// ```
pub trait TripStrategy: Send + Sync + std::fmt::Debug {
    fn should_trip(&self, metrics: &Metrics) -> bool;
}

/// Trips after `threshold` failures in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveFailures {
    pub threshold: u64,
}

impl TripStrategy for ConsecutiveFailures {
    fn should_trip(&self, metrics: &Metrics) -> bool {
        metrics.consecutive_fail >= self.threshold
    }
}

/// Trips after `threshold` failures anywhere in the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCount {
    pub threshold: u64,
}

impl TripStrategy for FailureCount {
    fn should_trip(&self, metrics: &Metrics) -> bool {
        metrics.count_fail >= self.threshold
    }
}

/// Trips when the window's failure rate reaches `rate`, once at least
/// `minimum_calls` calls have been attempted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureRate {
    pub rate: f64,
    pub minimum_calls: u64,
}

impl TripStrategy for FailureRate {
    fn should_trip(&self, metrics: &Metrics) -> bool {
        metrics.count_all >= self.minimum_calls && metrics.failure_rate() >= self.rate
    }
}

/// Closure-backed strategy for one-off rules
pub struct PredicateStrategy<F>
where
    F: Fn(&Metrics) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateStrategy<F>
where
    F: Fn(&Metrics) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> TripStrategy for PredicateStrategy<F>
where
    F: Fn(&Metrics) -> bool + Send + Sync,
{
    fn should_trip(&self, metrics: &Metrics) -> bool {
        (self.predicate)(metrics)
    }
}

impl<F> std::fmt::Debug for PredicateStrategy<F>
where
    F: Fn(&Metrics) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateStrategy")
            .field("predicate", &"<closure>")
            .finish()
    }
}

/// Built-in trip policy selected through configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripPolicy {
    ConsecutiveFailures { threshold: u64 },
    FailureCount { threshold: u64 },
    FailureRate { rate: f64, minimum_calls: u64 },
}

impl Default for TripPolicy {
    fn default() -> Self {
        TripPolicy::FailureCount { threshold: 5 }
    }
}

impl TripPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            TripPolicy::ConsecutiveFailures { threshold: 0 } => Err(ConfigError::ZeroThreshold {
                policy: "consecutive failure threshold",
            }),
            TripPolicy::FailureCount { threshold: 0 } => Err(ConfigError::ZeroThreshold {
                policy: "failure count threshold",
            }),
            TripPolicy::FailureRate { rate, .. } if !(rate > 0.0 && rate <= 1.0) => {
                Err(ConfigError::InvalidFailureRate(rate))
            }
            TripPolicy::FailureRate {
                minimum_calls: 0, ..
            } => Err(ConfigError::ZeroThreshold {
                policy: "minimum calls",
            }),
            _ => Ok(()),
        }
    }

    /// Bind the policy into the strategy object the breaker evaluates
    pub fn into_strategy(self) -> Arc<dyn TripStrategy> {
        match self {
            TripPolicy::ConsecutiveFailures { threshold } => {
                Arc::new(ConsecutiveFailures { threshold })
            }
            TripPolicy::FailureCount { threshold } => Arc::new(FailureCount { threshold }),
            TripPolicy::FailureRate {
                rate,
                minimum_calls,
            } => Arc::new(FailureRate {
                rate,
                minimum_calls,
            }),
        }
    }
}
