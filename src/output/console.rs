//! Terminal test panel
//!
//! Prints session updates as they happen.

use std::io::Write;
use std::sync::Mutex;

use crate::session::{ConsoleLevel, TestPanel, TestState};

#[derive(Debug, Default)]
struct PanelState {
    error_count: usize,
    progress: (u32, u32),
    status: Option<TestState>,
}

/// [`TestPanel`] that writes to stdout
#[derive(Debug)]
pub struct ConsolePanel {
    colorize: bool,
    quiet: bool,
    state: Mutex<PanelState>,
}

impl ConsolePanel {
    pub fn new() -> Self {
        Self {
            colorize: true,
            quiet: false,
            state: Mutex::new(PanelState::default()),
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Only print progress and status changes
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn error_count(&self) -> usize {
        self.state.lock().map(|s| s.error_count).unwrap_or(0)
    }

    pub fn progress(&self) -> (u32, u32) {
        self.state.lock().map(|s| s.progress).unwrap_or((0, 0))
    }

    pub fn status(&self) -> Option<TestState> {
        self.state.lock().ok().and_then(|s| s.status)
    }

    /// Console line for `level`, colored when enabled
    pub fn render(&self, level: ConsoleLevel, line: &str) -> String {
        let tag = format!("[{}]", level.tag());
        if !self.colorize {
            return format!("{tag} {line}");
        }
        let color = match level {
            ConsoleLevel::Pass => "32",
            ConsoleLevel::Fail | ConsoleLevel::Error => "31",
            ConsoleLevel::Warning => "33",
            ConsoleLevel::Info => "0",
        };
        format!("\x1b[{color}m{tag}\x1b[0m {line}")
    }

    fn print(&self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
    }
}

impl Default for ConsolePanel {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPanel for ConsolePanel {
    fn set_error_count(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.error_count = count;
        }
    }

    fn set_iteration_progress(&self, shown: u32, total: u32) {
        let changed = match self.state.lock() {
            Ok(mut state) => {
                let changed = state.progress != (shown, total);
                state.progress = (shown, total);
                changed
            }
            Err(_) => false,
        };
        if changed && total > 0 {
            self.print(&format!("── Iteration {shown}/{total}"));
        }
    }

    fn set_status(&self, status: TestState) {
        if let Ok(mut state) = self.state.lock() {
            state.status = Some(status);
        }
        if status != TestState::Empty {
            self.print(&format!("Status: {status}"));
        }
    }

    fn add_log(&self, level: ConsoleLevel, line: &str) {
        if self.quiet && !matches!(level, ConsoleLevel::Fail | ConsoleLevel::Error) {
            return;
        }
        self.print(&self.render(level, line));
    }
}
