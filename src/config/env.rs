//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "TEST_SEQUENCER";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// Flow from TEST_SEQUENCER_FLOW
    pub flow: Option<String>,
    /// Iterations from TEST_SEQUENCER_ITERATIONS
    pub iterations: Option<u32>,
    /// Continuation policy from TEST_SEQUENCER_CONTINUE
    pub continue_after_failure: Option<bool>,
    /// Per-unit timeout from TEST_SEQUENCER_UNIT_TIMEOUT
    pub unit_timeout_secs: Option<u64>,
    /// Simulated failure rate from TEST_SEQUENCER_FAIL_RATE
    pub failure_rate: Option<f64>,
    /// Report format from TEST_SEQUENCER_FORMAT
    pub format: Option<String>,
    /// Config file from TEST_SEQUENCER_CONFIG
    pub config_file: Option<String>,
    /// Log level from TEST_SEQUENCER_LOG
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            flow: get_env("FLOW"),
            iterations: get_env_parse("ITERATIONS"),
            continue_after_failure: get_env("CONTINUE").map(|v| parse_bool(&v)),
            unit_timeout_secs: get_env_parse("UNIT_TIMEOUT"),
            failure_rate: get_env_parse("FAIL_RATE"),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
            log_level: get_env("LOG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        *self != Self::default()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {ENV_PREFIX}_FLOW:          {:?}", self.flow);
        println!("  {ENV_PREFIX}_ITERATIONS:    {:?}", self.iterations);
        println!("  {ENV_PREFIX}_CONTINUE:      {:?}", self.continue_after_failure);
        println!("  {ENV_PREFIX}_UNIT_TIMEOUT:  {:?}", self.unit_timeout_secs);
        println!("  {ENV_PREFIX}_FAIL_RATE:     {:?}", self.failure_rate);
        println!("  {ENV_PREFIX}_FORMAT:        {:?}", self.format);
        println!("  {ENV_PREFIX}_CONFIG:        {:?}", self.config_file);
        println!("  {ENV_PREFIX}_LOG:           {:?}", self.log_level);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}
