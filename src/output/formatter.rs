//! Output formatters for run reports
//!
//! Provides table, JSON, CSV and one-line summary formats.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::models::{IterationSummary, RunReport, TestStatus, UnitResult};

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub const NAMES: &'static [&'static str] = &["table", "json", "json-pretty", "csv", "summary"];
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "csv" => Ok(OutputFormat::Csv),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!(
                "unknown format '{}', expected one of: {}",
                other,
                Self::NAMES.join(", ")
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::JsonPretty => "json-pretty",
            OutputFormat::Csv => "csv",
            OutputFormat::Summary => "summary",
        };
        f.write_str(name)
    }
}

/// One CSV row per unit per iteration
#[derive(Serialize)]
struct CsvRow<'a> {
    iteration: u32,
    index: usize,
    description: &'a str,
    status: TestStatus,
    duration_ms: u64,
    message: &'a str,
}

/// Report formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format a whole run
    pub fn format_report(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.format_report_table(report)),
            OutputFormat::Json => {
                serde_json::to_string(report).context("Failed to serialize report")
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(report).context("Failed to serialize report")
            }
            OutputFormat::Csv => self.format_report_csv(report),
            OutputFormat::Summary => Ok(self.format_report_brief(report)),
        }
    }

    fn status_label(&self, status: TestStatus) -> String {
        let label = format!("{} {}", status.symbol(), status);
        if !self.colorize {
            return label;
        }
        match status {
            TestStatus::Pass => format!("\x1b[32m{label}\x1b[0m"),
            TestStatus::Fail => format!("\x1b[31m{label}\x1b[0m"),
            TestStatus::NotRun => format!("\x1b[33m{label}\x1b[0m"),
        }
    }

    fn format_unit_row(&self, result: &UnitResult) -> String {
        let mut row = format!(
            "{:2}. {:36} {} [{:>6}ms]",
            result.index + 1,
            result.description,
            self.status_label(result.status),
            result.duration_ms
        );
        if let Some(message) = &result.message {
            row.push_str(&format!(" {message}"));
        }
        row
    }

    /// Format one iteration as a table block
    pub fn format_iteration(&self, summary: &IterationSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Iteration {:4}{:47}║\n",
            summary.iteration,
            if summary.completed { "" } else { " (incomplete)" }
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for result in &summary.results {
            output.push_str(&format!("║  {}\n", self.format_unit_row(result)));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Total: {:2} | Pass: {:2} | Fail: {:2} | Not run: {:2}\n",
            summary.total, summary.passed, summary.failed, summary.not_run
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:6}ms\n",
            summary.pass_rate(),
            summary.total_duration_ms
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_report_table(&self, report: &RunReport) -> String {
        let mut output = String::new();
        for iteration in &report.iterations {
            output.push_str(&self.format_iteration(iteration));
        }
        output.push('\n');
        output.push_str(&self.format_report_brief(report));
        output.push('\n');
        output
    }

    fn format_report_csv(&self, report: &RunReport) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for iteration in &report.iterations {
            for result in &iteration.results {
                writer
                    .serialize(CsvRow {
                        iteration: iteration.iteration,
                        index: result.index,
                        description: &result.description,
                        status: result.status,
                        duration_ms: result.duration_ms,
                        message: result.message.as_deref().unwrap_or(""),
                    })
                    .context("Failed to write CSV row")?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush CSV output: {}", e.error()))?;
        String::from_utf8(bytes).context("CSV output is not UTF-8")
    }

    fn format_report_brief(&self, report: &RunReport) -> String {
        let verdict = if report.is_success() {
            "SUCCESS"
        } else {
            "FAILURE"
        };
        let verdict = match (self.colorize, report.is_success()) {
            (true, true) => format!("\x1b[32m{verdict}\x1b[0m"),
            (true, false) => format!("\x1b[31m{verdict}\x1b[0m"),
            (false, _) => verdict.to_string(),
        };

        let mut line = format!(
            "{}: {}/{} iterations, {} failures, {} units started",
            report.flow.as_deref().unwrap_or("sequence"),
            report.completed_iterations,
            report.total_iterations,
            report.failure_count,
            report.unit_starts
        );
        if report.stopped {
            line.push_str(" (stopped)");
        }
        if let Some(ms) = report.duration_ms() {
            line.push_str(&format!(" in {ms}ms"));
        }
        line.push_str(&format!(" - {verdict}"));
        line
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a report to a file
pub fn write_report_to_file(
    path: impl AsRef<Path>,
    report: &RunReport,
    format: OutputFormat,
) -> Result<()> {
    let path = path.as_ref();
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_report(report)?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
