//! Context handed to test flows

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

use super::{ConsoleLevel, TestPanel};
use crate::executor::TestHandle;

/// Logging and pass/fail helpers shared by the unit bodies of one session
#[derive(Clone)]
pub struct TestContext {
    panel: Option<Weak<dyn TestPanel>>,
    displayed_errors: Arc<AtomicUsize>,
}

impl TestContext {
    pub fn new(panel: Option<Weak<dyn TestPanel>>) -> Self {
        Self {
            panel,
            displayed_errors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Context without a panel; output goes to tracing only
    pub fn detached() -> Self {
        Self::new(None)
    }

    pub fn panel(&self) -> Option<Arc<dyn TestPanel>> {
        self.panel.as_ref().and_then(Weak::upgrade)
    }

    /// Write a console line to the panel and to the log
    pub fn log(&self, level: ConsoleLevel, line: impl AsRef<str>) {
        let line = line.as_ref();
        match level {
            ConsoleLevel::Fail | ConsoleLevel::Error => error!("[{}] {}", level.tag(), line),
            ConsoleLevel::Warning => warn!("[{}] {}", level.tag(), line),
            ConsoleLevel::Pass | ConsoleLevel::Info => info!("[{}] {}", level.tag(), line),
        }
        if let Some(panel) = self.panel() {
            panel.add_log(level, line);
        }
    }

    /// Log and pass the unit
    pub fn pass(&self, handle: &TestHandle) {
        self.log(ConsoleLevel::Pass, handle.description());
        handle.pass();
    }

    /// Bump the displayed error count, log, and fail the unit
    pub fn fail(&self, handle: &TestHandle, error: Option<&dyn fmt::Display>) {
        let count = self.displayed_errors.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(panel) = self.panel() {
            panel.set_error_count(count);
        }

        let message = error.map(|e| e.to_string());
        self.log(
            ConsoleLevel::Fail,
            format!(
                "{} err: {}",
                handle.description(),
                message.as_deref().unwrap_or("nil")
            ),
        );

        match message {
            Some(message) => handle.fail_with(message),
            None => handle.fail(),
        }
    }

    pub fn displayed_errors(&self) -> usize {
        self.displayed_errors.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_errors(&self) {
        self.displayed_errors.store(0, Ordering::SeqCst);
        if let Some(panel) = self.panel() {
            panel.set_error_count(0);
        }
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("has_panel", &self.panel().is_some())
            .field("displayed_errors", &self.displayed_errors())
            .finish()
    }
}
