//! test-sequencer - sequential device test runner
//!
//! Runs a device test flow unit by unit for a number of iterations against a
//! simulated device, shows progress on the terminal and prints a report.
//!
//! ## Usage
//!
//! ```bash
//! # Run the LAN mode test five times
//! test-sequencer run --flow lan --iterations 5
//!
//! # Profile cloud and LAN round trips with 80ms simulated latency
//! test-sequencer run --flow profiler -n 20 --latency-ms 80
//!
//! # Stop at the first failure, report as JSON
//! test-sequencer run --fail-rate 0.1 --stop-on-failure --format json
//!
//! # List flows and their units
//! test-sequencer list --detailed
//!
//! # Write a default configuration file
//! test-sequencer config init
//! ```

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use test_sequencer::cli::{self, Args};
use test_sequencer::config::{AppConfig, EnvConfig};
use test_sequencer::device::{DeviceService, SimulatedDevice};
use test_sequencer::output::{write_report_to_file, ConsolePanel, OutputFormat, ResultFormatter};
use test_sequencer::session::{TestContext, TestPanel, TestSession};
use test_sequencer::tests::{describe_flow, flow_from_config, FLOW_NAMES};
use test_sequencer::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let level = if args.verbose > 0 {
        LogLevel::from_verbosity(args.verbose)
    } else {
        env.log_level
            .as_deref()
            .and_then(|level| level.parse().ok())
            .unwrap_or_default()
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            let config = load_config(args.config.as_deref(), &env)?;
            run_flow(run_args, config).await?;
        }
        cli::Command::List(list_args) => {
            let config = load_config(args.config.as_deref(), &env)?;
            list_flows(list_args, &config)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, args.config.as_deref(), &env)?;
        }
    }

    Ok(())
}

/// Defaults, then file, then environment
fn load_config(path: Option<&str>, env: &EnvConfig) -> Result<AppConfig> {
    let mut config = match path.or(env.config_file.as_deref()) {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    config.apply_env(env);
    config.validate()?;
    Ok(config)
}

async fn run_flow(args: cli::RunArgs, mut config: AppConfig) -> Result<()> {
    if let Some(rate) = args.fail_rate {
        config.device.failure_rate = rate;
    }
    if let Some(latency) = args.latency_ms {
        config.device.min_latency_ms = latency;
        config.device.max_latency_ms = latency;
    }
    if args.no_lan {
        config.device.lan_mode = false;
    }
    if args.stop_on_failure {
        config.continue_after_failure = false;
    }
    if let Some(timeout) = args.unit_timeout {
        config.unit_timeout_secs = Some(timeout);
    }
    config.validate()?;

    let flow_name = args.flow.unwrap_or_else(|| config.default_flow.clone());
    let iterations = args.iterations.unwrap_or(config.default_iterations);
    let format: OutputFormat = args
        .format
        .as_deref()
        .unwrap_or(&config.format)
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    let device: Arc<dyn DeviceService> = Arc::new(SimulatedDevice::from_config(&config.device));
    let flow = flow_from_config(&flow_name, device, &config)?;

    info!(
        "Running {} flow for {} iterations (continue after failure: {})",
        flow.name(),
        iterations,
        config.continue_after_failure
    );

    let panel: Arc<dyn TestPanel> = Arc::new(ConsolePanel::new().quiet(args.quiet));
    let mut session = TestSession::new(&panel)
        .with_continue_after_failure(config.continue_after_failure)
        .with_unit_timeout(config.unit_timeout_secs.map(Duration::from_secs));
    session.start(flow, iterations)?;

    let interrupt = session.handle().map(|handle| {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the unit in flight");
                handle.stop();
            }
        })
    });

    let report = session.wait().await?;
    if let Some(interrupt) = interrupt {
        interrupt.abort();
    }
    let report = report.ok_or_else(|| anyhow!("No test run was started"))?;

    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_report(&report)?);

    if let Some(output) = &args.output {
        let file_format = if output.ends_with(".csv") {
            OutputFormat::Csv
        } else {
            OutputFormat::JsonPretty
        };
        write_report_to_file(output, &report, file_format)?;
        println!("✓ Report saved to {output}");
    }

    if report.failure_count > 0 {
        bail!(
            "{} failures over {} iterations",
            report.failure_count,
            report.completed_iterations
        );
    }
    Ok(())
}

fn list_flows(args: cli::ListArgs, config: &AppConfig) -> Result<()> {
    println!("\nTest Flows\n");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let device: Arc<dyn DeviceService> = Arc::new(SimulatedDevice::from_config(&config.device));
    for name in FLOW_NAMES {
        println!("  {:10} {}", name, describe_flow(name));

        if args.detailed {
            let flow = flow_from_config(name, device.clone(), config)?;
            let sequencer = flow.build(&TestContext::detached());
            for (index, case) in sequencer.test_cases().iter().enumerate() {
                println!("      {:2}. {}", index + 1, case.description());
            }
            println!();
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    Ok(())
}

fn manage_config(args: cli::ConfigArgs, path: Option<&str>, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                bail!("Configuration file already exists: {output}. Use --force to overwrite.");
            }

            AppConfig::default().save(path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env: show_env, format } => {
            if show_env {
                env.print_summary();
                if !env.has_any() {
                    println!("\nNo TEST_SEQUENCER_* variables set.");
                }
            } else {
                let config = load_config(path, env)?;
                let output = if format == "json" {
                    serde_json::to_string_pretty(&config)?
                } else {
                    serde_yaml::to_string(&config)?
                };
                println!("{output}");
            }
        }
    }

    Ok(())
}
