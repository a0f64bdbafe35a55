//! Basic circuit breaker usage example
//!
//! Run with `RUST_LOG=service_breaker=trace` to see per-call accounting.

use service_breaker::{CircuitBreaker, ManualClock};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    // A manual clock lets the demo skip the cool-down instead of sleeping
    let clock = Arc::new(ManualClock::new());

    let circuit = CircuitBreaker::builder("payment_api")
        .failure_count(3)
        .window_interval(Duration::from_secs(10))
        .sleep_timeout(Duration::from_secs(5))
        .half_open_max_calls(2)
        .clock(clock.clone())
        .on_state_change(|name, from, to| println!("Circuit '{name}': {from} -> {to}"))
        .build()
        .expect("valid configuration");

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(format!("Payment {}", i))) {
            Ok(result) => println!("ok: {}", result),
            Err(e) => println!("error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match circuit.call(move || Err::<String, _>(format!("Payment failed {}", i))) {
            Ok(_) => println!("ok"),
            Err(e) => println!("error: {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state_name());

    println!("--- Attempting call while open ---");
    match circuit.call(|| Ok::<_, String>("Should be rejected")) {
        Ok(_) => println!("ok"),
        Err(e) => println!("rejected: {}", e),
    }
    println!();

    println!("--- Cool-down elapsed, trial calls ---");
    clock.advance(Duration::from_secs(5));
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(format!("Trial {}", i))) {
            Ok(result) => println!("ok: {} (state: {})", result, circuit.state_name()),
            Err(e) => println!("error: {}", e),
        }
    }
    println!();

    let metrics = circuit.metrics();
    println!(
        "Final state: {}, window batch {}, calls in window {}",
        circuit.state_name(),
        metrics.window_batch,
        metrics.count_all
    );
}
