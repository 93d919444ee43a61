//! Output formatting module
//!
//! Report formats and the terminal test panel.

mod console;
mod formatter;

pub use console::ConsolePanel;
pub use formatter::{write_report_to_file, OutputFormat, ResultFormatter};
