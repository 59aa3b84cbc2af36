//! Sample telemetry payload published by `iot-device send` when no payload
//! is given.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;

pub const DEFAULT_SENSOR_ID: &str = "home";
pub const DEFAULT_TEMPERATURE: f64 = 21.0;
pub const DEFAULT_HUMIDITY: f64 = 30.0;

/// One environmental sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    pub sensor_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub date: DateTime<Utc>,
}

impl TelemetryReading {
    /// Reading stamped with the current time
    pub fn new(sensor_id: impl Into<String>, temperature: f64, humidity: f64) -> Self {
        Self::at(sensor_id, temperature, humidity, Utc::now())
    }

    pub fn at(
        sensor_id: impl Into<String>,
        temperature: f64,
        humidity: f64,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            temperature,
            humidity,
            date,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Default for TelemetryReading {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR_ID, DEFAULT_TEMPERATURE, DEFAULT_HUMIDITY)
    }
}
