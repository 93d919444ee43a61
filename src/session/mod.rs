//! Test sessions
//!
//! A session binds one running sequencer to a host panel. It turns sequencer
//! progress and completion into panel state and gives unit bodies helpers
//! that log before passing or failing.

mod context;
mod model;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use context::TestContext;
pub use model::TestSession;

/// Overall state shown by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestState {
    Empty,
    Failure,
    Success,
    Working,
}

impl TestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestState::Empty => "",
            TestState::Failure => "Failure",
            TestState::Success => "Success",
            TestState::Working => "Working",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a console line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleLevel {
    Pass,
    Fail,
    Error,
    Warning,
    Info,
}

impl ConsoleLevel {
    pub fn tag(&self) -> &'static str {
        match self {
            ConsoleLevel::Pass => "P",
            ConsoleLevel::Fail => "F",
            ConsoleLevel::Error => "E",
            ConsoleLevel::Warning => "W",
            ConsoleLevel::Info => "I",
        }
    }
}

/// Host collaborator that displays session state.
///
/// Sessions hold only a weak reference; a dropped panel silently stops
/// receiving updates.
pub trait TestPanel: Send + Sync {
    fn set_error_count(&self, count: usize);

    /// Show `shown/total` iterations
    fn set_iteration_progress(&self, shown: u32, total: u32);

    fn set_status(&self, state: TestState);

    fn add_log(&self, level: ConsoleLevel, line: &str);

    fn reset_start_button(&self) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Panel that records every update
    #[derive(Default)]
    pub(crate) struct RecordingPanel {
        pub errors: Mutex<Vec<usize>>,
        pub progress: Mutex<Vec<(u32, u32)>>,
        pub statuses: Mutex<Vec<TestState>>,
        pub logs: Mutex<Vec<(ConsoleLevel, String)>>,
    }

    impl RecordingPanel {
        pub fn lines(&self, level: ConsoleLevel) -> Vec<String> {
            self.logs
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, line)| line.clone())
                .collect()
        }
    }

    impl TestPanel for RecordingPanel {
        fn set_error_count(&self, count: usize) {
            self.errors.lock().unwrap().push(count);
        }

        fn set_iteration_progress(&self, shown: u32, total: u32) {
            self.progress.lock().unwrap().push((shown, total));
        }

        fn set_status(&self, state: TestState) {
            self.statuses.lock().unwrap().push(state);
        }

        fn add_log(&self, level: ConsoleLevel, line: &str) {
            self.logs.lock().unwrap().push((level, line.to_string()));
        }
    }
}
