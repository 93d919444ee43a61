//! Device collaborator
//!
//! The sequencer never talks to a device itself. Test flows receive a
//! [`DeviceService`] explicitly and call it from their unit bodies.

mod simulated;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use simulated::SimulatedDevice;

/// Device errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("LAN mode is not active on {0}")]
    LanUnavailable(String),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),
}

/// Path a request takes to the device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Cloud,
    Lan,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Cloud => "Cloud",
            Transport::Lan => "LAN",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named device property and its current value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

/// Result of creating a datapoint
#[derive(Clone, Debug, PartialEq)]
pub struct Datapoint {
    pub value: Value,
    /// 0 means the device did not acknowledge
    pub ack_status: u32,
    /// Time spent on the wire, as reported by the transport
    pub network_time: Duration,
}

/// Operations the test flows need from a device
pub trait DeviceService: Send + Sync {
    fn name(&self) -> &str;

    fn lan_mode_active(&self) -> bool;

    fn fetch_properties(
        &self,
        names: Vec<String>,
        via: Transport,
    ) -> BoxFuture<'_, Result<Vec<Property>, DeviceError>>;

    fn create_datapoint(
        &self,
        property: String,
        value: Value,
        via: Transport,
    ) -> BoxFuture<'_, Result<Datapoint, DeviceError>>;
}
