//! Sequencer runner
//!
//! Places a [`TestSequencer`] on its own tokio task so that every unit report
//! is routed on one execution context, and hands back a control handle.

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

use super::sequencer::{SequencerError, SequencerHandle, TestSequencer};
use crate::models::RunReport;

/// A sequencer running on a background task
#[derive(Debug)]
pub struct RunningSequencer {
    handle: SequencerHandle,
    task: JoinHandle<Result<TestSequencer, SequencerError>>,
}

impl RunningSequencer {
    /// Start `sequencer` for `iterations` on a new task of the current runtime.
    /// Fails with [`SequencerError::NoRuntime`] outside a tokio runtime.
    pub fn spawn(sequencer: TestSequencer, iterations: u32) -> Result<Self, SequencerError> {
        let runtime = Handle::try_current().map_err(|_| SequencerError::NoRuntime)?;
        Ok(Self::spawn_on(&runtime, sequencer, iterations))
    }

    /// Start `sequencer` for `iterations` on `runtime`
    pub fn spawn_on(runtime: &Handle, mut sequencer: TestSequencer, iterations: u32) -> Self {
        let handle = sequencer.handle();
        info!(
            "Spawning test sequence of {} units for {} iterations",
            sequencer.len(),
            iterations
        );

        let task = runtime.spawn(async move {
            sequencer.run(iterations).await?;
            Ok(sequencer)
        });

        Self { handle, task }
    }

    pub fn handle(&self) -> SequencerHandle {
        self.handle.clone()
    }

    /// Request a cooperative stop. Returns false once the run has ended.
    pub fn stop(&self) -> bool {
        !self.is_finished() && self.handle.stop()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end and take the sequencer back
    pub async fn wait(self) -> Result<TestSequencer, SequencerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SequencerError::Task(e.to_string())),
        }
    }

    /// Wait for the run to end and return its report
    pub async fn report(self) -> Result<RunReport, SequencerError> {
        Ok(self.wait().await?.report())
    }
}
