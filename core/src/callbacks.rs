//! Callback system for circuit breaker state transitions
//!
//! Callbacks run synchronously on the thread that caused the transition,
//! after the breaker's lock has been released. They may read the breaker
//! (`state()`, `metrics()`) but must not call back into `call()` on the
//! same breaker.

use crate::State;
use std::sync::Arc;

pub type StateChangeFn = Arc<dyn Fn(&str, State, State) + Send + Sync>;
pub type NamedFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_state_change: Option<StateChangeFn>,
    pub on_open: Option<NamedFn>,
    pub on_close: Option<NamedFn>,
    pub on_half_open: Option<NamedFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the generic hook, then the hook for the state entered
    pub fn notify(&self, circuit: &str, from: State, to: State) {
        if let Some(ref callback) = self.on_state_change {
            callback(circuit, from, to);
        }

        let named = match to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        if let Some(callback) = named {
            callback(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}
