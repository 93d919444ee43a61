//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// Sequential device test runner
#[derive(Parser, Debug)]
#[command(name = "test-sequencer")]
#[command(version)]
#[command(about = "Run device test flows unit by unit over repeated iterations")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (defaults to the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test flow against the simulated device
    Run(RunArgs),

    /// List available test flows
    List(ListArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Flow to run (lan, profiler)
    #[arg(short, long)]
    pub flow: Option<String>,

    /// Number of iterations; values below 1 run once
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// End the run at the first failing unit
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Probability in [0, 1] that a simulated request fails
    #[arg(long)]
    pub fail_rate: Option<f64>,

    /// Fixed simulated latency per request in milliseconds
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Disable LAN mode on the simulated device
    #[arg(long)]
    pub no_lan: bool,

    /// Fail a unit that has not reported after this many seconds
    #[arg(long)]
    pub unit_timeout: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short = 'F', long)]
    pub format: Option<String>,

    /// Save the report to file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Hide the per-unit console log
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show the units of each flow
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a configuration file with default values
    Init {
        /// Output path
        #[arg(short, long, default_value = "./test-sequencer.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Show TEST_SEQUENCER_* environment overrides instead
        #[arg(short, long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },
}
