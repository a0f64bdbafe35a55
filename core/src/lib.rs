//! service-breaker - in-process circuit breaker
//!
//! This crate guards calls to a failing dependency:
//! - State machine for the breaker lifecycle (Closed → Open → HalfOpen → Closed)
//! - Rolling closed-state windows with per-window call metrics
//! - Pluggable trip strategies (consecutive failures, failure count, failure rate)
//! - Bounded half-open trial calls, safe under concurrent callers
//! - Monotonic time tracking to prevent NTP clock skew issues
//!
//! # Example
//!
//! ```rust
//! use service_breaker::{CircuitBreaker, CircuitError};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::builder("my_service")
//!     .failure_count(3)
//!     .window_interval(Duration::from_secs(60))
//!     .sleep_timeout(Duration::from_secs(30))
//!     .half_open_max_calls(2)
//!     .on_state_change(|name, from, to| println!("{name}: {from} -> {to}"))
//!     .build()
//!     .expect("valid configuration");
//!
//! // Execute with circuit protection
//! let result = circuit.call(|| Ok::<_, String>("success"));
//! assert_eq!(result.ok(), Some("success"));
//!
//! for _ in 0..3 {
//!     let _ = circuit.call(|| Err::<(), _>("unavailable".to_string()));
//! }
//!
//! // Further calls are rejected without running the operation
//! assert!(matches!(
//!     circuit.call(|| Ok::<_, String>("skipped")),
//!     Err(CircuitError::Open { .. })
//! ));
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod clock;
pub mod errors;
pub mod metrics;
pub mod trip;

pub use builder::CircuitBuilder;
pub use circuit::{CircuitBreaker, Config};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::{CircuitError, ConfigError};
pub use metrics::Metrics;
pub use trip::{
    ConsecutiveFailures, FailureCount, FailureRate, PredicateStrategy, TripPolicy, TripStrategy,
};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Calls pass through, outcomes accumulate in the current window
    Closed,
    /// Calls are rejected until the cool-down elapses
    Open,
    /// A bounded number of trial calls test the dependency
    HalfOpen,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "Closed",
            State::Open => "Open",
            State::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
