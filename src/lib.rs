//! Sequential test harness for connected devices
//!
//! Registers test units in order, runs them one at a time over a number of
//! iterations, counts failures across the run, and reports progress and
//! completion to a host panel.
//!
//! ## Example
//!
//! ```no_run
//! use test_sequencer::executor::TestSequencer;
//!
//! # async fn demo() -> Result<(), test_sequencer::executor::SequencerError> {
//! let mut sequencer = TestSequencer::new();
//! sequencer
//!     .add_test("first", |t| t.pass())
//!     .add_async_test("second", |_| async { Ok(()) })
//!     .on_complete(|s| println!("{} failures", s.err_count()));
//!
//! sequencer.run(3).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod device;
pub mod executor;
pub mod models;
pub mod output;
pub mod session;
pub mod tests;
pub mod utils;

pub use executor::{RunningSequencer, SequencerError, TestCase, TestHandle, TestSequencer};
pub use models::RunReport;
pub use session::{TestContext, TestPanel, TestSession};
