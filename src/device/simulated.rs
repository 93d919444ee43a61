//! In-memory simulated device
//!
//! Used by the CLI and by tests in place of a real device connection.

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::{Datapoint, DeviceError, DeviceService, Property, Transport};
use crate::config::DeviceConfig;

/// Simulated device with random latency and failures
#[derive(Debug)]
pub struct SimulatedDevice {
    name: String,
    lan_mode: bool,
    ack_enabled: bool,
    failure_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
    properties: Mutex<BTreeMap<String, Value>>,
    /// Writes to the key are mirrored into the value property
    echoes: HashMap<String, String>,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>) -> Self {
        let properties = BTreeMap::from([
            ("Blue_LED".to_string(), json!(0)),
            ("Green_LED".to_string(), json!(0)),
            ("cmd".to_string(), json!("")),
            ("log".to_string(), json!("")),
            ("ack_switch".to_string(), json!(0)),
        ]);

        Self {
            name: name.into(),
            lan_mode: true,
            ack_enabled: true,
            failure_rate: 0.0,
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            properties: Mutex::new(properties),
            echoes: HashMap::from([("cmd".to_string(), "log".to_string())]),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.name.clone())
            .with_lan_mode(config.lan_mode)
            .with_ack(config.ack_enabled)
            .with_failure_rate(config.failure_rate)
            .with_latency(
                Duration::from_millis(config.min_latency_ms),
                Duration::from_millis(config.max_latency_ms),
            )
    }

    pub fn with_lan_mode(mut self, enabled: bool) -> Self {
        self.lan_mode = enabled;
        self
    }

    pub fn with_ack(mut self, enabled: bool) -> Self {
        self.ack_enabled = enabled;
        self
    }

    /// Probability in `[0, 1]` that a request fails
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    pub fn with_property(self, name: impl Into<String>, value: Value) -> Self {
        if let Ok(mut properties) = self.properties.lock() {
            properties.insert(name.into(), value);
        }
        self
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.properties
            .lock()
            .ok()
            .and_then(|properties| properties.get(name).cloned())
    }

    /// Wait for one simulated round trip; returns the network time
    async fn round_trip(&self, via: Transport) -> Result<Duration, DeviceError> {
        if via == Transport::Lan && !self.lan_mode {
            return Err(DeviceError::LanUnavailable(self.name.clone()));
        }

        let (latency, fail) = {
            let mut rng = rand::rng();
            let min = self.min_latency.as_millis() as u64;
            let max = self.max_latency.as_millis() as u64;
            let latency = Duration::from_millis(rng.random_range(min..=max));
            (latency, rng.random_bool(self.failure_rate))
        };

        tokio::time::sleep(latency).await;

        if fail {
            return Err(DeviceError::RequestFailed(format!(
                "simulated {via} failure on {}",
                self.name
            )));
        }
        Ok(latency)
    }
}

impl DeviceService for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn lan_mode_active(&self) -> bool {
        self.lan_mode
    }

    fn fetch_properties(
        &self,
        names: Vec<String>,
        via: Transport,
    ) -> BoxFuture<'_, Result<Vec<Property>, DeviceError>> {
        async move {
            self.round_trip(via).await?;

            let properties = self
                .properties
                .lock()
                .map_err(|e| DeviceError::RequestFailed(e.to_string()))?;

            let fetched = if names.is_empty() {
                properties
                    .iter()
                    .map(|(name, value)| Property {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect()
            } else {
                names
                    .iter()
                    .filter_map(|name| {
                        properties.get(name).map(|value| Property {
                            name: name.clone(),
                            value: value.clone(),
                        })
                    })
                    .collect()
            };

            debug!("Fetched properties {:?} via {}", names, via);
            Ok(fetched)
        }
        .boxed()
    }

    fn create_datapoint(
        &self,
        property: String,
        value: Value,
        via: Transport,
    ) -> BoxFuture<'_, Result<Datapoint, DeviceError>> {
        async move {
            let network_time = self.round_trip(via).await?;

            let mut properties = self
                .properties
                .lock()
                .map_err(|e| DeviceError::RequestFailed(e.to_string()))?;

            if !properties.contains_key(&property) {
                return Err(DeviceError::PropertyNotFound(property));
            }
            properties.insert(property.clone(), value.clone());
            if let Some(echo) = self.echoes.get(&property) {
                properties.insert(echo.clone(), value.clone());
            }

            debug!("Created datapoint {} = {} via {}", property, value, via);
            Ok(Datapoint {
                value,
                ack_status: u32::from(self.ack_enabled),
                network_time,
            })
        }
        .boxed()
    }
}
