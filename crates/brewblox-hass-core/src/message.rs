//! Inbound state messages
//!
//! Brewblox services broadcast their state as JSON objects tagged by `type`:
//!
//! ```json
//! {"key": "spark-one", "type": "Spark.state", "data": {"blocks": [...]}}
//! {"key": "tilt", "type": "Tilt.state", "name": "Purple", "data": {...}}
//! ```
//!
//! Messages are validated here, at the boundary. Structurally missing keys
//! (kind, device key, Spark blocks, Tilt name/data) are reported as
//! [`Error::MalformedMessage`]. Unknown kinds decode to
//! [`InboundMessage::Unrecognized`] and are never an error.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// One decoded state message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// State of all blocks on a Spark controller
    #[serde(rename = "Spark.state")]
    SparkState(SparkState),

    /// Reading of a single Tilt hydrometer
    #[serde(rename = "Tilt.state")]
    TiltState(TiltState),

    /// Any other kind; ignored
    #[serde(other)]
    Unrecognized,
}

impl InboundMessage {
    /// Decode a raw JSON payload
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| Error::malformed(e.to_string()))
    }

    /// Decode an already parsed JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::malformed(e.to_string()))
    }

    /// Device key of the sender, if the kind is recognized
    pub fn device_key(&self) -> Option<&str> {
        match self {
            InboundMessage::SparkState(spark) => Some(&spark.key),
            InboundMessage::TiltState(tilt) => Some(&tilt.key),
            InboundMessage::Unrecognized => None,
        }
    }
}

/// `Spark.state` message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SparkState {
    /// Service name of the Spark
    pub key: String,
    /// Block listing
    pub data: SparkData,
}

/// Payload of a `Spark.state` message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SparkData {
    /// All blocks, in controller order
    pub blocks: Vec<BlockRecord>,
}

/// A single Spark block
///
/// `data` is kept as raw JSON: unhandled block types carry arbitrary shapes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockRecord {
    /// User-facing block id
    pub id: String,
    /// Block type name (e.g. `TempSensorOneWire`)
    #[serde(rename = "type")]
    pub block_type: String,
    /// Block fields
    #[serde(default)]
    pub data: Value,
}

impl BlockRecord {
    /// Read a quantity field (`{"value": number|null, "unit": string}`)
    ///
    /// A missing or non-numeric value is a null reading, not an error.
    pub fn quantity(&self, field: &str) -> Quantity {
        let Some(raw) = self.data.get(field) else {
            return Quantity::default();
        };

        Quantity {
            value: raw.get("value").and_then(Value::as_f64),
            unit: raw.get("unit").and_then(Value::as_str).map(str::to_string),
        }
    }
}

/// Numeric value with unit, as serialized by the Spark
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quantity {
    /// Value, `None` when the controller has no reading
    pub value: Option<f64>,
    /// Raw unit code (`degC`, `degF`, ...)
    pub unit: Option<String>,
}

/// `Tilt.state` message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TiltState {
    /// Service name of the Tilt bridge
    pub key: String,
    /// Tilt name (typically its color)
    pub name: String,
    /// Reading
    pub data: TiltReading,
}

/// Flat Tilt reading
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TiltReading {
    /// Temperature in Celsius
    #[serde(rename = "temperature[degC]", default)]
    pub temperature_c: Option<f64>,
    /// Specific gravity
    #[serde(rename = "specificGravity", default)]
    pub specific_gravity: Option<f64>,
    /// Gravity in degrees Plato
    #[serde(rename = "plato[degP]", default)]
    pub plato: Option<f64>,
}
