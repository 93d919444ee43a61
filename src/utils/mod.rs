//! Utility modules

pub mod logger;
pub mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::{average, time_results_description, Timer};
