//! Timer utilities
//!
//! Operation timing for the network profiler. Uses the tokio clock so that
//! paused-time tests measure simulated latency exactly.

use std::time::Duration;
use tokio::time::Instant;

/// Simple timer for measuring elapsed time
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Stop timer and return elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::debug!("{}: {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Mean of `samples`, or zero when there are none
pub fn average(samples: &[Duration]) -> Duration {
    match u32::try_from(samples.len()) {
        Ok(0) | Err(_) => Duration::ZERO,
        Ok(count) => samples.iter().sum::<Duration>() / count,
    }
}

/// One profiler line: total and network time of an operation, and the
/// network share of the total
pub fn time_results_description(operation: &str, total: Duration, network: Duration) -> String {
    let total_ms = total.as_secs_f64() * 1000.0;
    let network_ms = network.as_secs_f64() * 1000.0;
    let share = if total.is_zero() {
        0.0
    } else {
        network_ms / total_ms * 100.0
    };
    format!(
        "{operation} Operation Total: {total_ms:.0}ms, Network Total: {network_ms:.0}ms, {share:.2}%"
    )
}
