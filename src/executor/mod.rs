//! Test execution engine
//!
//! Sequential, iterating execution of asynchronous test units.

mod case;
mod runner;
mod sequencer;

pub use case::{Outcome, TestBody, TestCase, TestHandle, UnitId};
pub use runner::RunningSequencer;
pub use sequencer::{CompleteFn, ProgressFn, SequencerError, SequencerHandle, TestSequencer};
