//! Test result models for sequencer runs
//!
//! Defines unit results, per-iteration summaries and the run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single test unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail,
    /// The unit was never started or never reported in this iteration
    NotRun,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::NotRun => "○",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::NotRun => write!(f, "NOT RUN"),
        }
    }
}

/// Result of one unit within one iteration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    /// Position in registration order (0-based)
    pub index: usize,
    pub description: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl UnitResult {
    pub fn pass(index: usize, description: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            index,
            description: description.into(),
            status: TestStatus::Pass,
            duration_ms,
            message: None,
        }
    }

    pub fn fail(
        index: usize,
        description: impl Into<String>,
        duration_ms: u64,
        message: Option<String>,
    ) -> Self {
        Self {
            index,
            description: description.into(),
            status: TestStatus::Fail,
            duration_ms,
            message,
        }
    }

    pub fn not_run(index: usize, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            status: TestStatus::NotRun,
            duration_ms: 0,
            message: None,
        }
    }
}

impl fmt::Display for UnitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.description,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of one iteration through the registered units
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    /// 1-based iteration number
    pub iteration: u32,
    /// False when the run ended (stop or failure policy) before every unit reported
    pub completed: bool,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_run: usize,
    pub total_duration_ms: u64,
    pub results: Vec<UnitResult>,
}

impl IterationSummary {
    pub fn new(iteration: u32, completed: bool, results: Vec<UnitResult>) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();

        Self {
            iteration,
            completed,
            total: results.len(),
            passed: count(TestStatus::Pass),
            failed: count(TestStatus::Fail),
            not_run: count(TestStatus::NotRun),
            total_duration_ms: results.iter().map(|r| r.duration_ms).sum(),
            results,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.passed == self.total
    }
}

impl fmt::Display for IterationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Iteration {}", self.iteration)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Not run: {}",
            self.total, self.passed, self.failed, self.not_run
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}

/// Report of a whole sequencer run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub flow: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_iterations: u32,
    pub completed_iterations: u32,
    /// Cumulative over every iteration of the run
    pub failure_count: usize,
    pub unit_starts: usize,
    pub stopped: bool,
    pub continue_after_failure: bool,
    pub iterations: Vec<IterationSummary>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0 && !self.stopped
    }

    pub fn with_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for iteration in &self.iterations {
            writeln!(f, "{iteration}")?;
        }
        write!(
            f,
            "Iterations: {}/{} | Failures: {} | {}",
            self.completed_iterations,
            self.total_iterations,
            self.failure_count,
            if self.is_success() { "SUCCESS" } else { "FAILURE" }
        )
    }
}
