//! Error types for circuit breaker operations

use std::time::Duration;
use thiserror::Error;

/// Errors returned from [`CircuitBreaker::call`](crate::CircuitBreaker::call)
///
/// `Open` and `TooManyTrialCalls` mean the operation was never invoked and
/// nothing was counted. `Execution` carries the operation's own error untouched.
#[derive(Debug, Error)]
pub enum CircuitError<E = Box<dyn std::error::Error + Send + Sync>> {
    /// Circuit is open and the cool-down has not elapsed
    #[error("Circuit '{circuit}' is open (trial call allowed in {retry_after:?})")]
    Open {
        circuit: String,
        retry_after: Duration,
    },
    /// Circuit is half-open and every trial slot is taken
    #[error("Circuit '{circuit}' is half-open, too many trial calls (limit: {limit})")]
    TooManyTrialCalls { circuit: String, limit: u64 },
    /// The wrapped operation failed
    #[error("{0}")]
    Execution(E),
}

impl<E> CircuitError<E> {
    /// True when the breaker turned the call away without running it
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CircuitError::Execution(_))
    }

    /// The operation's error, if the operation ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid breaker configuration, reported by `build()` / `CircuitBreaker::new`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("half_open_max_calls must be at least 1")]
    ZeroHalfOpenMaxCalls,
    #[error("sleep_timeout must be greater than zero")]
    ZeroSleepTimeout,
    #[error("{policy} must be at least 1")]
    ZeroThreshold { policy: &'static str },
    #[error("failure rate must be within (0, 1], got {0}")]
    InvalidFailureRate(f64),
    #[error("jitter factor must be within [0, 1], got {0}")]
    InvalidJitter(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let open: CircuitError<String> = CircuitError::Open {
            circuit: "payments".to_string(),
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(
            open.to_string(),
            "Circuit 'payments' is open (trial call allowed in 3s)"
        );

        let exec: CircuitError<String> = CircuitError::Execution("boom".to_string());
        assert_eq!(exec.to_string(), "boom");
    }

    #[test]
    fn test_rejection_helpers() {
        let limited: CircuitError<&str> = CircuitError::TooManyTrialCalls {
            circuit: "db".to_string(),
            limit: 3,
        };
        assert!(limited.is_rejection());
        assert_eq!(limited.into_inner(), None);

        let exec: CircuitError<&str> = CircuitError::Execution("timeout");
        assert!(!exec.is_rejection());
        assert_eq!(exec.into_inner(), Some("timeout"));
    }
}
