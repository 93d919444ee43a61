//! Test sequencer
//!
//! Runs registered [`TestCase`]s strictly one after another, repeats the
//! whole list for a number of iterations, counts failures across the run and
//! reports progress and completion through callbacks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::case::{Outcome, SequencerEvent, TestCase, TestHandle, UnitId};
use crate::models::{IterationSummary, RunReport};

/// Called once when the sequencer reaches a terminal state
pub type CompleteFn = Box<dyn FnMut(&TestSequencer) + Send>;

/// Called after every completed iteration with
/// `(sequencer, units just run, total iterations, completed iterations)`.
/// The return value is advisory and does not gate the run.
pub type ProgressFn = Box<dyn FnMut(&TestSequencer, &[TestCase], u32, u32) -> bool + Send>;

/// Sequencer errors
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("Sequencer has already been started")]
    AlreadyStarted,

    #[error("Sequencer task failed: {0}")]
    Task(String),

    #[error("No tokio runtime to run the sequencer on")]
    NoRuntime,
}

struct InFlight {
    id: UnitId,
    reported: Arc<AtomicBool>,
    deadline: Option<tokio::time::Instant>,
}

/// Cloneable control handle for a sequencer owned elsewhere
#[derive(Clone, Debug)]
pub struct SequencerHandle {
    events: UnboundedSender<SequencerEvent>,
    completed: Arc<AtomicBool>,
}

impl SequencerHandle {
    /// Request a cooperative stop. Returns false when the completion callback
    /// has already fired or the sequencer has been dropped; the request is
    /// then a no-op.
    pub fn stop(&self) -> bool {
        if self.is_completed() {
            debug!("Stop requested after completion, ignored");
            return false;
        }
        self.events.send(SequencerEvent::Stop).is_ok()
    }

    /// Whether the completion callback has fired
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Ordered collection of test units with iteration and failure accounting
pub struct TestSequencer {
    continue_after_failure: bool,
    unit_timeout: Option<Duration>,

    total_iterations: u32,
    completed_iterations: u32,
    iteration: u32,

    next_index: usize,
    cases: Vec<TestCase>,
    err_count: usize,
    unit_starts: usize,

    started: bool,
    finished: bool,
    stopped: bool,
    completion_fired: bool,
    completed: Arc<AtomicBool>,

    in_flight: Option<InFlight>,
    history: Vec<IterationSummary>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,

    on_complete: Option<CompleteFn>,
    on_progress: Option<ProgressFn>,

    events_tx: UnboundedSender<SequencerEvent>,
    events_rx: UnboundedReceiver<SequencerEvent>,
}

impl TestSequencer {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            continue_after_failure: true,
            unit_timeout: None,
            total_iterations: 1,
            completed_iterations: 0,
            iteration: 0,
            next_index: 0,
            cases: Vec::new(),
            err_count: 0,
            unit_starts: 0,
            started: false,
            finished: false,
            stopped: false,
            completion_fired: false,
            completed: Arc::new(AtomicBool::new(false)),
            in_flight: None,
            history: Vec::new(),
            started_at: None,
            completed_at: None,
            on_complete: None,
            on_progress: None,
            events_tx,
            events_rx,
        }
    }

    // Registration and settings

    /// Append a unit. Registration order is execution order.
    pub fn add_test(
        &mut self,
        description: impl Into<String>,
        body: impl Fn(TestHandle) + Send + Sync + 'static,
    ) -> &mut Self {
        self.add_test_case(TestCase::new(description, body))
    }

    /// Append a unit whose body is a future resolving to `anyhow::Result<()>`
    pub fn add_async_test<F, Fut>(&mut self, description: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(TestHandle) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_test_case(TestCase::from_async(description, f))
    }

    pub fn add_test_case(&mut self, test_case: TestCase) -> &mut Self {
        self.cases.push(test_case);
        self
    }

    /// Whether later units of an iteration still run after a failure (default true)
    pub fn set_continue_after_failure(&mut self, continue_after_failure: bool) -> &mut Self {
        self.continue_after_failure = continue_after_failure;
        self
    }

    /// Fail a unit that has not reported within `timeout`. Off by default.
    pub fn set_unit_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn on_complete(&mut self, f: impl FnMut(&TestSequencer) + Send + 'static) -> &mut Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_progress(
        &mut self,
        f: impl FnMut(&TestSequencer, &[TestCase], u32, u32) -> bool + Send + 'static,
    ) -> &mut Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn handle(&self) -> SequencerHandle {
        SequencerHandle {
            events: self.events_tx.clone(),
            completed: Arc::clone(&self.completed),
        }
    }

    // State

    pub fn continue_after_failure(&self) -> bool {
        self.continue_after_failure
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Failures across the whole run; never reset between iterations
    pub fn err_count(&self) -> usize {
        self.err_count
    }

    pub fn total_iterations(&self) -> u32 {
        self.total_iterations
    }

    pub fn completed_iterations(&self) -> u32 {
        self.completed_iterations
    }

    pub fn unit_starts(&self) -> usize {
        self.unit_starts
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Whether the completion callback has been delivered
    pub fn is_completed(&self) -> bool {
        self.completion_fired
    }

    pub fn in_flight(&self) -> Option<UnitId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    // Control

    /// Start the run with the given iteration count.
    ///
    /// An empty unit list or zero iterations finishes immediately and fires
    /// the completion callback.
    pub fn start(&mut self, iterations: u32) -> Result<(), SequencerError> {
        if self.started {
            return Err(SequencerError::AlreadyStarted);
        }

        self.started = true;
        self.total_iterations = iterations;
        self.started_at = Some(Utc::now());

        info!(
            "Starting test sequence: {} units x {} iterations",
            self.cases.len(),
            iterations
        );

        if self.cases.is_empty() || iterations == 0 {
            self.finish();
            return Ok(());
        }

        self.iteration = 1;
        self.start_case(0);
        Ok(())
    }

    /// Cooperative stop: no further units are scheduled. The report of the
    /// unit in flight is still awaited and triggers the completion callback.
    pub fn stop(&mut self) {
        if self.completion_fired {
            debug!("Stop requested after completion, ignored");
            return;
        }
        info!("Stopping test sequence");
        self.stopped = true;
        self.finished = true;
    }

    /// Start and drive the run to its terminal state
    pub async fn run(&mut self, iterations: u32) -> Result<(), SequencerError> {
        self.start(iterations)?;
        self.drive().await;
        Ok(())
    }

    /// Process unit reports and stop requests until the completion callback
    /// has fired. Returns early if nothing is in flight.
    pub async fn drive(&mut self) {
        while !self.completion_fired {
            let Some(deadline) = self.in_flight.as_ref().map(|f| f.deadline) else {
                break;
            };

            let event = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                        Ok(event) => event,
                        Err(_) => {
                            self.expire_in_flight();
                            continue;
                        }
                    }
                }
                None => self.events_rx.recv().await,
            };

            match event {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    /// Process every queued event without waiting. Returns whether any was handled.
    pub fn process_pending(&mut self) -> bool {
        let mut handled = false;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled = true;
        }
        handled
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> RunReport {
        let mut iterations = self.history.clone();
        if !self.completion_fired && self.iteration > self.completed_iterations {
            iterations.push(self.current_iteration_summary(false));
        }

        RunReport {
            flow: None,
            started_at: self.started_at,
            completed_at: self.completed_at,
            total_iterations: self.total_iterations,
            completed_iterations: self.completed_iterations,
            failure_count: self.err_count,
            unit_starts: self.unit_starts,
            stopped: self.stopped,
            continue_after_failure: self.continue_after_failure,
            iterations,
        }
    }

    // Routing

    fn handle_event(&mut self, event: SequencerEvent) {
        match event {
            SequencerEvent::Stop => self.stop(),
            SequencerEvent::Finished {
                id,
                outcome,
                diagnostic,
            } => self.finished_test_case(id, outcome, diagnostic),
        }
    }

    fn finished_test_case(&mut self, id: UnitId, outcome: Outcome, diagnostic: Option<String>) {
        if self.completion_fired {
            debug!("Report from {} after completion, ignored", id);
            return;
        }
        if self.in_flight.as_ref().map(|f| f.id) != Some(id) {
            warn!("Report from {} does not match the unit in flight, ignored", id);
            return;
        }
        self.in_flight = None;

        let case = &mut self.cases[id.index];
        case.complete(outcome, diagnostic);
        match outcome {
            Outcome::Passed => debug!("{} passed", case),
            Outcome::Failed => {
                self.err_count += 1;
                warn!(
                    "{} failed: {}",
                    case,
                    case.diagnostic().unwrap_or("no diagnostic")
                );
            }
        }

        if self.stopped {
            self.finish();
            return;
        }

        if outcome == Outcome::Failed && !self.continue_after_failure {
            self.finish();
            return;
        }

        self.next_index += 1;
        if self.next_index < self.cases.len() {
            self.start_case(self.next_index);
            return;
        }

        self.completed_iterations += 1;
        let summary = self.current_iteration_summary(true);
        info!(
            "Iteration {}/{} completed: {}/{} passed, {} failures so far",
            self.completed_iterations,
            self.total_iterations,
            summary.passed,
            summary.total,
            self.err_count
        );
        self.history.push(summary);

        if let Some(mut progress) = self.on_progress.take() {
            let keep_going = progress(
                self,
                &self.cases,
                self.total_iterations,
                self.completed_iterations,
            );
            if !keep_going {
                debug!("Progress callback returned false; continuing");
            }
            self.on_progress = Some(progress);
        }

        if self.completed_iterations >= self.total_iterations {
            self.finish();
        } else {
            self.reset_test_cases();
            self.iteration += 1;
            self.start_case(0);
        }
    }

    fn start_case(&mut self, index: usize) {
        self.next_index = index;

        let id = UnitId {
            iteration: self.iteration,
            index,
        };
        let reported = Arc::new(AtomicBool::new(false));
        let handle = TestHandle::new(
            id,
            self.cases[index].description_arc(),
            Arc::clone(&reported),
            self.events_tx.clone(),
        );

        self.in_flight = Some(InFlight {
            id,
            reported,
            deadline: self
                .unit_timeout
                .map(|timeout| tokio::time::Instant::now() + timeout),
        });

        debug!("Starting {} {}", self.cases[index], id);
        if self.cases[index].start(handle) {
            self.unit_starts += 1;
        }
    }

    fn expire_in_flight(&mut self) {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return;
        };

        // A report raced the deadline and is already queued
        if in_flight.reported.swap(true, Ordering::SeqCst) {
            in_flight.deadline = None;
            return;
        }

        let id = in_flight.id;
        let timeout_ms = self.unit_timeout.map(|t| t.as_millis()).unwrap_or(0);
        warn!("{} {} timed out", self.cases[id.index], id);
        self.finished_test_case(
            id,
            Outcome::Failed,
            Some(format!("timed out after {timeout_ms}ms")),
        );
    }

    fn reset_test_cases(&mut self) {
        self.cases = self.cases.iter().map(TestCase::reset).collect();
        self.next_index = 0;
    }

    fn current_iteration_summary(&self, completed: bool) -> IterationSummary {
        let results = self
            .cases
            .iter()
            .enumerate()
            .map(|(index, case)| case.to_result(index))
            .collect();
        IterationSummary::new(self.iteration, completed, results)
    }

    fn finish(&mut self) {
        self.finished = true;
        if self.completion_fired {
            return;
        }
        self.completion_fired = true;
        self.completed.store(true, Ordering::SeqCst);
        self.completed_at = Some(Utc::now());

        if self.iteration > self.completed_iterations {
            let summary = self.current_iteration_summary(false);
            self.history.push(summary);
        }

        info!(
            "Test sequence finished: {}/{} iterations, {} failures{}",
            self.completed_iterations,
            self.total_iterations,
            self.err_count,
            if self.stopped { " (stopped)" } else { "" }
        );

        if let Some(mut complete) = self.on_complete.take() {
            complete(self);
            self.on_complete = Some(complete);
        }
    }
}

impl Default for TestSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TestSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSequencer")
            .field("cases", &self.cases)
            .field("next_index", &self.next_index)
            .field("err_count", &self.err_count)
            .field("total_iterations", &self.total_iterations)
            .field("completed_iterations", &self.completed_iterations)
            .field("started", &self.started)
            .field("finished", &self.finished)
            .field("stopped", &self.stopped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Unit that logs its start and then passes or fails according to `fails_on`
    fn scripted(seq: &mut TestSequencer, name: &'static str, log: &Log, fails_on: &[u32]) {
        let log = log.clone();
        let fails_on: HashSet<u32> = fails_on.iter().copied().collect();
        seq.add_test(name, move |t| {
            log.lock().unwrap().push(format!("{name}.start"));
            if fails_on.contains(&t.id().iteration) {
                log.lock().unwrap().push(format!("{name}.fail"));
                t.fail();
            } else {
                log.lock().unwrap().push(format!("{name}.pass"));
                t.pass();
            }
        });
    }

    fn completion_counter(seq: &mut TestSequencer) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        seq.on_complete(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[tokio::test]
    async fn test_all_passing_runs_every_unit_every_iteration() {
        let log = Log::default();
        let mut seq = TestSequencer::new();
        for name in ["a", "b", "c"] {
            scripted(&mut seq, name, &log, &[]);
        }
        let completions = completion_counter(&mut seq);

        seq.run(4).await.unwrap();

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(seq.unit_starts(), 12);
        assert_eq!(seq.err_count(), 0);
        assert_eq!(seq.completed_iterations(), 4);
        assert!(seq.is_finished());
        assert!(!seq.is_stopped());
    }

    #[tokio::test]
    async fn test_continue_after_failure_scenario() {
        let log = Log::default();
        let mut seq = TestSequencer::new();
        scripted(&mut seq, "A", &log, &[]);
        scripted(&mut seq, "B", &log, &[1, 2]);
        scripted(&mut seq, "C", &log, &[]);

        let progress = Arc::new(Mutex::new(Vec::new()));
        let p = progress.clone();
        seq.on_progress(move |s, cases, total, completed| {
            assert!(cases.iter().all(TestCase::is_finished));
            p.lock().unwrap().push((completed, total, s.err_count()));
            true
        });
        let completions = completion_counter(&mut seq);

        seq.run(2).await.unwrap();

        let one_iteration = ["A.start", "A.pass", "B.start", "B.fail", "C.start", "C.pass"];
        let expected: Vec<String> = one_iteration
            .iter()
            .chain(one_iteration.iter())
            .map(|s| s.to_string())
            .collect();
        assert_eq!(*log.lock().unwrap(), expected);
        assert_eq!(*progress.lock().unwrap(), vec![(1, 2, 1), (2, 2, 2)]);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(seq.err_count(), 2);
    }

    #[tokio::test]
    async fn test_stop_on_first_failure() {
        let log = Log::default();
        let mut seq = TestSequencer::new();
        seq.set_continue_after_failure(false);
        scripted(&mut seq, "A", &log, &[1]);
        scripted(&mut seq, "B", &log, &[]);
        let completions = completion_counter(&mut seq);

        seq.run(5).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A.start", "A.fail"]);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(seq.completed_iterations(), 0);
        assert_eq!(seq.err_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_on_later_iteration_keeps_earlier_ones() {
        let log = Log::default();
        let mut seq = TestSequencer::new();
        seq.set_continue_after_failure(false);
        scripted(&mut seq, "A", &log, &[]);
        scripted(&mut seq, "B", &log, &[3]);
        scripted(&mut seq, "C", &log, &[]);

        seq.run(5).await.unwrap();

        assert_eq!(seq.completed_iterations(), 2);
        assert_eq!(seq.unit_starts(), 8);
        let log = log.lock().unwrap();
        assert_eq!(log.last().map(String::as_str), Some("B.fail"));
    }

    #[tokio::test]
    async fn test_empty_sequence_completes_immediately() {
        let mut seq = TestSequencer::new();
        let completions = completion_counter(&mut seq);

        seq.run(3).await.unwrap();

        assert!(seq.is_finished());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(seq.completed_iterations(), 0);
    }

    #[tokio::test]
    async fn test_zero_iterations_completes_without_starting_units() {
        let log = Log::default();
        let mut seq = TestSequencer::new();
        scripted(&mut seq, "A", &log, &[]);
        let completions = completion_counter(&mut seq);

        seq.run(0).await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_from_blocking_code() {
        let log = Log::default();
        let mut seq = TestSequencer::new();
        scripted(&mut seq, "A", &log, &[2]);
        scripted(&mut seq, "B", &log, &[]);

        tokio_test::block_on(seq.run(3)).unwrap();

        assert_eq!(seq.err_count(), 1);
        assert_eq!(seq.unit_starts(), 6);
        assert!(seq.is_completed());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut seq = TestSequencer::new();
        seq.start(1).unwrap();
        assert!(matches!(seq.start(1), Err(SequencerError::AlreadyStarted)));
    }

    #[test]
    fn test_units_are_reset_between_iterations() {
        let parked: Arc<Mutex<Vec<TestHandle>>> = Arc::default();
        let mut seq = TestSequencer::new();
        for name in ["first", "second"] {
            let slot = parked.clone();
            seq.add_test(name, move |t| slot.lock().unwrap().push(t));
        }

        seq.start(2).unwrap();
        parked.lock().unwrap().pop().unwrap().pass();
        seq.process_pending();
        assert!(seq.test_cases()[0].is_passed());

        parked.lock().unwrap().pop().unwrap().fail();
        seq.process_pending();
        assert_eq!(seq.completed_iterations(), 1);

        // Iteration 2 has started its first unit with a fresh set
        assert_eq!(
            seq.in_flight(),
            Some(UnitId {
                iteration: 2,
                index: 0
            })
        );
        for case in seq.test_cases() {
            assert!(!case.is_finished());
            assert!(!case.is_passed());
            assert!(!case.is_failed());
        }
        assert_eq!(seq.err_count(), 1);
    }

    #[test]
    fn test_stop_waits_for_in_flight_unit() {
        let parked: Arc<Mutex<Option<TestHandle>>> = Arc::default();
        let log = Log::default();
        let mut seq = TestSequencer::new();
        let slot = parked.clone();
        seq.add_test("slow", move |t| {
            *slot.lock().unwrap() = Some(t);
        });
        scripted(&mut seq, "next", &log, &[]);
        let completions = completion_counter(&mut seq);

        seq.start(3).unwrap();
        seq.handle().stop();
        seq.process_pending();
        assert!(seq.is_stopped());
        assert!(seq.is_finished());
        assert_eq!(completions.load(Ordering::SeqCst), 0);

        parked.lock().unwrap().take().unwrap().pass();
        seq.process_pending();

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(seq.unit_starts(), 1);
        assert!(!seq.report().is_success());
    }

    #[test]
    fn test_stop_waits_for_in_flight_unit_that_fails() {
        let parked: Arc<Mutex<Option<TestHandle>>> = Arc::default();
        let log = Log::default();
        let mut seq = TestSequencer::new();
        let slot = parked.clone();
        seq.add_test("slow", move |t| {
            *slot.lock().unwrap() = Some(t);
        });
        scripted(&mut seq, "next", &log, &[]);
        let completions = completion_counter(&mut seq);

        seq.start(3).unwrap();
        seq.handle().stop();
        seq.process_pending();
        assert_eq!(completions.load(Ordering::SeqCst), 0);

        parked.lock().unwrap().take().unwrap().fail();
        seq.process_pending();

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(seq.err_count(), 1);
        assert_eq!(seq.unit_starts(), 1);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(seq.completed_iterations(), 0);
    }

    #[test]
    fn test_handle_stop_after_completion_is_refused() {
        let mut seq = TestSequencer::new();
        seq.add_test("a", |t| t.pass());
        let completions = completion_counter(&mut seq);
        let handle = seq.handle();

        seq.start(1).unwrap();
        while seq.process_pending() {}
        assert!(handle.is_completed());

        assert!(!handle.stop());
        assert!(!seq.process_pending());
        assert!(!seq.is_stopped());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(seq.report().is_success());
    }

    #[test]
    fn test_duplicate_report_is_ignored() {
        let log = Log::default();
        let mut seq = TestSequencer::new();
        seq.add_test("twice", |t| {
            t.pass();
            t.fail();
        });
        scripted(&mut seq, "after", &log, &[]);

        seq.start(1).unwrap();
        while seq.process_pending() {}

        assert_eq!(seq.err_count(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["after.start", "after.pass"]);
        assert!(seq.is_completed());
    }

    #[test]
    fn test_progress_return_value_does_not_gate() {
        let mut seq = TestSequencer::new();
        seq.add_test("a", |t| t.pass());
        seq.on_progress(|_, _, _, _| false);

        seq.start(3).unwrap();
        while seq.process_pending() {}

        assert_eq!(seq.completed_iterations(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unit_timeout_fails_stalled_unit() {
        let parked: Arc<Mutex<Option<TestHandle>>> = Arc::default();
        let log = Log::default();
        let mut seq = TestSequencer::new();
        seq.set_unit_timeout(Some(Duration::from_secs(5)));
        let slot = parked.clone();
        seq.add_test("hangs", move |t| {
            *slot.lock().unwrap() = Some(t);
        });
        scripted(&mut seq, "after", &log, &[]);

        seq.run(1).await.unwrap();

        assert_eq!(seq.err_count(), 1);
        assert!(seq.is_completed());
        assert_eq!(*log.lock().unwrap(), vec!["after.start", "after.pass"]);

        let report = seq.report();
        let first = &report.iterations[0].results[0];
        assert_eq!(first.message.as_deref(), Some("timed out after 5000ms"));

        // A late report from the timed-out unit is dropped
        let late = parked.lock().unwrap().take().unwrap();
        assert!(late.is_reported());
        late.pass();
        assert!(!seq.process_pending());
    }

    #[tokio::test]
    async fn test_async_units_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut seq = TestSequencer::new();
        for i in 0..3 {
            let order = order.clone();
            seq.add_async_test(format!("unit {i}"), move |_| {
                let order = order.clone();
                async move {
                    tokio::task::yield_now().await;
                    order.lock().unwrap().push(i);
                    if i == 1 {
                        anyhow::bail!("unit {i} broke");
                    }
                    Ok(())
                }
            });
        }

        seq.run(1).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(seq.err_count(), 1);
        let report = seq.report();
        assert_eq!(report.iterations.len(), 1);
        assert_eq!(
            report.iterations[0].results[1].message.as_deref(),
            Some("unit 1 broke")
        );
    }

    #[test]
    fn test_report_includes_partial_iteration() {
        let mut seq = TestSequencer::new();
        seq.set_continue_after_failure(false);
        seq.add_test("ok", |t| t.pass());
        seq.add_test("bad", |t| t.fail_with("nope"));
        seq.add_test("never", |t| t.pass());

        seq.start(2).unwrap();
        while seq.process_pending() {}

        let report = seq.report();
        assert_eq!(report.iterations.len(), 1);
        let partial = &report.iterations[0];
        assert!(!partial.completed);
        assert_eq!((partial.passed, partial.failed, partial.not_run), (1, 1, 1));
        assert!(report.completed_at.is_some());
    }

    proptest! {
        #[test]
        fn prop_continue_policy_counts_every_failure(
            matrix in (1usize..5, 1usize..4).prop_flat_map(|(units, iterations)| {
                proptest::collection::vec(
                    proptest::collection::vec(any::<bool>(), units),
                    iterations,
                )
            })
        ) {
            let iterations = matrix.len() as u32;
            let units = matrix[0].len();
            let matrix = Arc::new(matrix);

            let mut seq = TestSequencer::new();
            for index in 0..units {
                let matrix = matrix.clone();
                seq.add_test(format!("u{index}"), move |t| {
                    let row = (t.id().iteration - 1) as usize;
                    if matrix[row][index] { t.pass() } else { t.fail() }
                });
            }

            seq.start(iterations).unwrap();
            while seq.process_pending() {}

            let expected_failures = matrix.iter().flatten().filter(|ok| !**ok).count();
            prop_assert!(seq.is_completed());
            prop_assert_eq!(seq.err_count(), expected_failures);
            prop_assert_eq!(seq.unit_starts(), units * iterations as usize);
            prop_assert_eq!(seq.completed_iterations(), iterations);
        }
    }
}
