//! Test units
//!
//! A [`TestCase`] is one named operation of a test sequence. Its body is
//! invoked with a [`TestHandle`] and must eventually call [`TestHandle::pass`]
//! or [`TestHandle::fail`], possibly from another task.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::models::UnitResult;

/// Body of a test unit
pub type TestBody = Arc<dyn Fn(TestHandle) + Send + Sync>;

/// Identity of one attempt of a unit: its position and the iteration it runs in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitId {
    /// 1-based iteration number
    pub iteration: u32,
    /// Position in registration order
    pub index: usize,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}/{}", self.iteration, self.index)
    }
}

/// Terminal outcome of a unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
}

/// Messages consumed by the sequencer event loop
#[derive(Debug)]
pub(crate) enum SequencerEvent {
    Finished {
        id: UnitId,
        outcome: Outcome,
        diagnostic: Option<String>,
    },
    Stop,
}

/// Handle given to a running unit body.
///
/// The handle does not own the sequencer. If the sequencer has been dropped
/// the report is discarded.
#[derive(Clone)]
pub struct TestHandle {
    id: UnitId,
    description: Arc<str>,
    reported: Arc<AtomicBool>,
    events: UnboundedSender<SequencerEvent>,
}

impl TestHandle {
    pub(crate) fn new(
        id: UnitId,
        description: Arc<str>,
        reported: Arc<AtomicBool>,
        events: UnboundedSender<SequencerEvent>,
    ) -> Self {
        Self {
            id,
            description,
            reported,
            events,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether this attempt has already reported (or was timed out)
    pub fn is_reported(&self) -> bool {
        self.reported.load(Ordering::SeqCst)
    }

    /// Mark the unit as passed
    pub fn pass(&self) {
        self.report(Outcome::Passed, None);
    }

    /// Mark the unit as failed
    pub fn fail(&self) {
        self.report(Outcome::Failed, None);
    }

    /// Mark the unit as failed with a diagnostic message
    pub fn fail_with(&self, diagnostic: impl Into<String>) {
        self.report(Outcome::Failed, Some(diagnostic.into()));
    }

    fn report(&self, outcome: Outcome, diagnostic: Option<String>) {
        if self.reported.swap(true, Ordering::SeqCst) {
            warn!(
                "Ignoring duplicate {:?} report from {} {}",
                outcome, self.description, self.id
            );
            return;
        }

        let event = SequencerEvent::Finished {
            id: self.id,
            outcome,
            diagnostic,
        };
        if self.events.send(event).is_err() {
            debug!("Sequencer for {} is gone, report dropped", self.description);
        }
    }
}

impl fmt::Debug for TestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestHandle")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("reported", &self.is_reported())
            .finish()
    }
}

/// A single named asynchronous pass/fail operation
pub struct TestCase {
    description: Arc<str>,
    body: TestBody,
    passed: bool,
    failed: bool,
    finished: bool,
    diagnostic: Option<String>,
    started_at: Option<Instant>,
    duration: Option<Duration>,
}

impl TestCase {
    /// Create a unit from a callback body
    pub fn new(
        description: impl Into<String>,
        body: impl Fn(TestHandle) + Send + Sync + 'static,
    ) -> Self {
        Self::from_body(description, Arc::new(body))
    }

    pub fn from_body(description: impl Into<String>, body: TestBody) -> Self {
        Self {
            description: Arc::from(description.into()),
            body,
            passed: false,
            failed: false,
            finished: false,
            diagnostic: None,
            started_at: None,
            duration: None,
        }
    }

    /// Create a unit whose body is a future.
    ///
    /// The future is spawned on the current tokio runtime. `Ok` passes the
    /// unit and `Err` fails it with the rendered error chain, unless the
    /// future already reported through the handle.
    pub fn from_async<F, Fut>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(TestHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body = move |handle: TestHandle| {
            let runtime = match tokio::runtime::Handle::try_current() {
                Ok(runtime) => runtime,
                Err(e) => {
                    handle.fail_with(format!("no tokio runtime available: {e}"));
                    return;
                }
            };

            let fut = f(handle.clone());
            runtime.spawn(async move {
                let result = fut.await;
                if handle.is_reported() {
                    return;
                }
                match result {
                    Ok(()) => handle.pass(),
                    Err(e) => handle.fail_with(format!("{e:#}")),
                }
            });
        };

        Self::new(description, body)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn description_arc(&self) -> Arc<str> {
        Arc::clone(&self.description)
    }

    pub fn is_passed(&self) -> bool {
        self.passed
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Time between start and report, once finished
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Fresh unit with the same description and body
    pub fn reset(&self) -> Self {
        Self::from_body(self.description.to_string(), Arc::clone(&self.body))
    }

    /// Invoke the body unless the unit already finished. Returns whether it ran.
    pub(crate) fn start(&mut self, handle: TestHandle) -> bool {
        if self.finished {
            return false;
        }
        self.started_at = Some(Instant::now());
        (self.body)(handle);
        true
    }

    /// Record the outcome. Returns false if the unit had already finished.
    pub(crate) fn complete(&mut self, outcome: Outcome, diagnostic: Option<String>) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        match outcome {
            Outcome::Passed => self.passed = true,
            Outcome::Failed => self.failed = true,
        }
        self.diagnostic = diagnostic;
        self.duration = self.started_at.map(|start| start.elapsed());
        true
    }

    pub fn to_result(&self, index: usize) -> UnitResult {
        let duration_ms = self.duration.map(|d| d.as_millis() as u64).unwrap_or(0);
        if self.passed {
            UnitResult::pass(index, self.description(), duration_ms)
        } else if self.failed {
            UnitResult::fail(index, self.description(), duration_ms, self.diagnostic.clone())
        } else {
            UnitResult::not_run(index, self.description())
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("description", &self.description)
            .field("passed", &self.passed)
            .field("failed", &self.failed)
            .field("finished", &self.finished)
            .finish()
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
