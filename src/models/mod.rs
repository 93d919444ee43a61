//! Data models for sequencer runs
//!
//! Result and summary types produced by the test sequencer.

mod test_result;

pub use test_result::{IterationSummary, RunReport, TestStatus, UnitResult};
