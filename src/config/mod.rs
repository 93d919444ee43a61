//! Configuration module
//!
//! Handles loading and managing configuration. Precedence, lowest first:
//! built-in defaults, configuration file, `TEST_SEQUENCER_*` environment
//! variables, command-line flags.

mod env;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use env::EnvConfig;

/// Configuration file locations relative to the working directory (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./test-sequencer.yaml",
    "./test-sequencer.yml",
    "./.test-sequencer.yaml",
    "./test-sequencer.json",
];

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Flow run when none is given on the command line
    pub default_flow: String,

    /// Default number of iterations
    pub default_iterations: u32,

    /// Keep running later units of an iteration after a failure
    pub continue_after_failure: bool,

    /// Fail a unit that has not reported after this many seconds
    pub unit_timeout_secs: Option<u64>,

    /// Default report format
    pub format: String,

    /// Simulated device settings
    pub device: DeviceConfig,

    /// LAN mode test settings
    pub lan_test: LanTestConfig,

    /// Network profiler settings
    pub profiler: ProfilerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_flow: "lan".to_string(),
            default_iterations: 1,
            continue_after_failure: true,
            unit_timeout_secs: None,
            format: "table".to_string(),
            device: DeviceConfig::default(),
            lan_test: LanTestConfig::default(),
            profiler: ProfilerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        let user_config =
            dirs::config_dir().map(|dir| dir.join("test-sequencer").join("config.yaml"));

        CONFIG_LOCATIONS
            .iter()
            .map(|location| PathBuf::from(*location))
            .chain(user_config)
            .find(|path| path.exists())
    }

    /// Load configuration from the first standard location, or defaults
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(flow) = &env.flow {
            self.default_flow = flow.clone();
        }
        if let Some(iterations) = env.iterations {
            self.default_iterations = iterations;
        }
        if let Some(continue_after_failure) = env.continue_after_failure {
            self.continue_after_failure = continue_after_failure;
        }
        if let Some(timeout) = env.unit_timeout_secs {
            self.unit_timeout_secs = Some(timeout);
        }
        if let Some(rate) = env.failure_rate {
            self.device.failure_rate = rate;
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.device.failure_rate) {
            bail!(
                "device.failure_rate must be between 0 and 1, got {}",
                self.device.failure_rate
            );
        }
        if self.device.min_latency_ms > self.device.max_latency_ms {
            bail!(
                "device.min_latency_ms ({}) exceeds device.max_latency_ms ({})",
                self.device.min_latency_ms,
                self.device.max_latency_ms
            );
        }
        if self.profiler.led_property.is_empty() {
            bail!("profiler.led_property must not be empty");
        }
        Ok(())
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// Simulated device configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub lan_mode: bool,
    pub ack_enabled: bool,
    /// Probability in [0, 1] that a request fails
    pub failure_rate: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "simulated-ledevb".to_string(),
            lan_mode: true,
            ack_enabled: true,
            failure_rate: 0.0,
            min_latency_ms: 20,
            max_latency_ms: 120,
        }
    }
}

/// Properties used by the LAN mode test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanTestConfig {
    /// Properties requested by the fetch tests; empty fetches all
    pub fetch_properties: Vec<String>,
    pub boolean_property: Option<String>,
    pub string_property: Option<String>,
    /// Property read back to confirm a string datapoint; defaults to the written one
    pub string_confirm_property: Option<String>,
    pub ack_property: Option<String>,
    /// Delay before reading a property back
    pub confirm_delay_ms: u64,
}

impl Default for LanTestConfig {
    fn default() -> Self {
        Self {
            fetch_properties: vec!["Blue_LED".to_string(), "Green_LED".to_string()],
            boolean_property: Some("Green_LED".to_string()),
            string_property: Some("cmd".to_string()),
            string_confirm_property: Some("log".to_string()),
            ack_property: Some("ack_switch".to_string()),
            confirm_delay_ms: 1000,
        }
    }
}

/// Network profiler configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    pub led_property: String,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            led_property: "Blue_LED".to_string(),
        }
    }
}
