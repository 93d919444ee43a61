//! Device test flows
//!
//! A flow builds a [`TestSequencer`] whose units exercise a device through
//! the injected [`DeviceService`].
//!
//! ## Flows
//!
//! ### `lan` - LAN mode test
//! - Fetch properties via LAN and via cloud
//! - Create boolean and string datapoints via LAN and read them back
//! - Datapoint acknowledgement via LAN
//!
//! ### `profiler` - Network profiler
//! - Toggle an LED via cloud and, with LAN mode active, via LAN
//! - Report operation and network time per transport


pub use lan_mode::LanModeTestFlow;
pub use profiler::NetworkProfilerFlow;

use anyhow::{bail, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::device::DeviceService;
use crate::executor::TestSequencer;
use crate::models::RunReport;
use crate::session::{ConsoleLevel, TestContext};

/// Names accepted by [`flow_from_config`]
pub const FLOW_NAMES: &[&str] = &["lan", "profiler"];

/// A named set of test units against one device
pub trait TestFlow: Send + Sync {
    fn name(&self) -> &str;

    /// Register this flow's units, in execution order, on a new sequencer
    fn build(&self, ctx: &TestContext) -> TestSequencer;

    /// Called once after the run reaches a terminal state
    fn finished(&self, _ctx: &TestContext, _report: &RunReport) {}
}

/// Construct the flow called `name` for `device`
pub fn flow_from_config(
    name: &str,
    device: Arc<dyn DeviceService>,
    config: &AppConfig,
) -> Result<Arc<dyn TestFlow>> {
    match name.to_lowercase().as_str() {
        "lan" | "lan-mode" => Ok(Arc::new(LanModeTestFlow::new(
            device,
            config.lan_test.clone(),
        ))),
        "profiler" | "network-profiler" => Ok(Arc::new(NetworkProfilerFlow::new(
            device,
            config.profiler.clone(),
        ))),
        other => bail!(
            "Unknown flow '{}', expected one of: {}",
            other,
            FLOW_NAMES.join(", ")
        ),
    }
}

/// Short description of each flow, for listings
pub fn describe_flow(name: &str) -> &'static str {
    match name {
        "lan" => "LAN mode test: property fetches, datapoint creation and ack via LAN",
        "profiler" => "Network profiler: LED datapoints timed per transport",
        _ => "",
    }
}

/// Register a unit whose body is an async operation. The unit is logged and
/// passed on `Ok`, failed with the error chain on `Err`.
pub(crate) fn add_unit<F, Fut>(
    sequencer: &mut TestSequencer,
    ctx: &TestContext,
    description: &str,
    body: F,
) where
    F: Fn(TestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let ctx = ctx.clone();
    let start_line = format!("Start {description}");
    sequencer.add_async_test(description, move |handle| {
        let ctx = ctx.clone();
        ctx.log(ConsoleLevel::Info, &start_line);
        let operation = body(ctx.clone());
        async move {
            match operation.await {
                Ok(()) => ctx.pass(&handle),
                Err(e) => {
                    let message = format!("{e:#}");
                    ctx.fail(&handle, Some(&message));
                }
            }
            Ok(())
        }
    });
}

/// Truthiness of a property value as the device reports it
pub(crate) fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => false,
    }
}

/// Opposite of an integer-like boolean value; anything else becomes 1
pub(crate) fn toggled(value: &Value) -> Value {
    match value.as_i64() {
        Some(current) => Value::from(1 - current),
        None => Value::from(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use serde_json::json;

    #[test]
    fn test_flow_from_config() {
        let device: Arc<dyn DeviceService> = Arc::new(SimulatedDevice::new("sim"));
        let config = AppConfig::default();

        let lan = flow_from_config("lan", device.clone(), &config).unwrap();
        assert_eq!(lan.name(), "lan");
        let profiler = flow_from_config("Profiler", device.clone(), &config).unwrap();
        assert_eq!(profiler.name(), "profiler");

        let err = flow_from_config("ota", device, &config).err().unwrap();
        assert!(err.to_string().contains("lan, profiler"));
    }

    #[test]
    fn test_value_helpers() {
        assert!(as_bool(&json!(1)));
        assert!(!as_bool(&json!(0)));
        assert!(as_bool(&json!(true)));
        assert!(!as_bool(&json!(null)));

        assert_eq!(toggled(&json!(0)), json!(1));
        assert_eq!(toggled(&json!(1)), json!(0));
        assert_eq!(toggled(&json!("x")), json!(1));
    }
}
