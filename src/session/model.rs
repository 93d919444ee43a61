//! Test session model

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::{TestContext, TestPanel, TestState};
use crate::executor::{RunningSequencer, SequencerError, SequencerHandle, TestSequencer};
use crate::models::RunReport;
use crate::tests::TestFlow;

/// Binds the currently installed sequencer to a host panel
pub struct TestSession {
    context: TestContext,
    current: Option<RunningSequencer>,
    generation: Arc<AtomicU64>,
    continue_after_failure: Option<bool>,
    unit_timeout: Option<Duration>,
}

impl TestSession {
    pub fn new(panel: &Arc<dyn TestPanel>) -> Self {
        Self::with_context(TestContext::new(Some(Arc::downgrade(panel))))
    }

    /// Session without a panel
    pub fn detached() -> Self {
        Self::with_context(TestContext::detached())
    }

    fn with_context(context: TestContext) -> Self {
        Self {
            context,
            current: None,
            generation: Arc::new(AtomicU64::new(0)),
            continue_after_failure: None,
            unit_timeout: None,
        }
    }

    /// Override the continuation policy of every sequencer this session starts
    pub fn with_continue_after_failure(mut self, continue_after_failure: bool) -> Self {
        self.continue_after_failure = Some(continue_after_failure);
        self
    }

    /// Apply a per-unit timeout to every sequencer this session starts
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn context(&self) -> &TestContext {
        &self.context
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .map(|running| !running.is_finished())
            .unwrap_or(false)
    }

    /// Build `flow`'s sequencer and start it on the current tokio runtime.
    /// Fewer than one iteration runs once.
    pub fn start(
        &mut self,
        flow: Arc<dyn TestFlow>,
        iterations: u32,
    ) -> Result<(), SequencerError> {
        let runtime = Handle::try_current().map_err(|_| SequencerError::NoRuntime)?;
        let panel = self.context.panel();
        self.context.reset_errors();
        if let Some(panel) = &panel {
            panel.set_iteration_progress(0, 0);
        }

        let iterations = iterations.max(1);
        let sequencer = flow.build(&self.context);
        info!(
            "Starting {} with {} units for {} iterations",
            flow.name(),
            sequencer.len(),
            iterations
        );

        if let Some(panel) = &panel {
            panel.set_iteration_progress(1, iterations);
        }
        self.install_with(&runtime, sequencer, iterations, Some(flow));
        if let Some(panel) = &panel {
            panel.set_status(TestState::Working);
        }
        Ok(())
    }

    /// Install and start a prepared sequencer, stopping the previous one first.
    /// Fails with [`SequencerError::NoRuntime`] outside a tokio runtime.
    pub fn install(
        &mut self,
        sequencer: TestSequencer,
        iterations: u32,
    ) -> Result<(), SequencerError> {
        let runtime = Handle::try_current().map_err(|_| SequencerError::NoRuntime)?;
        self.install_with(&runtime, sequencer, iterations, None);
        Ok(())
    }

    fn install_with(
        &mut self,
        runtime: &Handle,
        mut sequencer: TestSequencer,
        iterations: u32,
        flow: Option<Arc<dyn TestFlow>>,
    ) {
        if let Some(previous) = self.current.take() {
            debug!("Stopping previously installed sequencer");
            previous.stop();
        }

        if let Some(continue_after_failure) = self.continue_after_failure {
            sequencer.set_continue_after_failure(continue_after_failure);
        }
        if self.unit_timeout.is_some() {
            sequencer.set_unit_timeout(self.unit_timeout);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let current = Arc::clone(&self.generation);
        let context = self.context.clone();
        sequencer.on_complete(move |seq| {
            if current.load(Ordering::SeqCst) != generation {
                debug!("Completion from a replaced sequencer, ignored");
                return;
            }
            if let Some(panel) = context.panel() {
                panel.set_status(if seq.err_count() == 0 {
                    TestState::Success
                } else {
                    TestState::Failure
                });
                panel.reset_start_button();
            }
            if let Some(flow) = &flow {
                let report = seq.report().with_flow(flow.name());
                flow.finished(&context, &report);
            }
        });

        let current = Arc::clone(&self.generation);
        let context = self.context.clone();
        sequencer.on_progress(move |_, _, total, completed| {
            if current.load(Ordering::SeqCst) != generation {
                return true;
            }
            if let Some(panel) = context.panel() {
                let shown = if completed == total {
                    total
                } else {
                    completed + 1
                };
                panel.set_iteration_progress(shown, total);
            }
            true
        });

        self.current = Some(RunningSequencer::spawn_on(runtime, sequencer, iterations));
    }

    /// Control handle of the installed sequencer
    pub fn handle(&self) -> Option<SequencerHandle> {
        self.current.as_ref().map(RunningSequencer::handle)
    }

    /// Request a stop of the installed sequencer. A run that has already
    /// ended keeps its final status and the call returns false.
    pub fn stop(&mut self) -> bool {
        let stopped = self
            .current
            .as_ref()
            .map(RunningSequencer::stop)
            .unwrap_or(false);
        if stopped {
            if let Some(panel) = self.context.panel() {
                panel.set_status(TestState::Empty);
            }
        }
        stopped
    }

    /// Wait for the installed sequencer to finish and return its report
    pub async fn wait(&mut self) -> Result<Option<RunReport>, SequencerError> {
        match self.current.take() {
            Some(running) => Ok(Some(running.report().await?)),
            None => Ok(None),
        }
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if let Some(running) = self.current.take() {
            running.stop();
        }
    }
}
