//! Translation of state messages into Home Assistant payloads
//!
//! The [`Translator`] is pure: it maps one [`InboundMessage`] to a set of
//! discovery records and at most one state update, without looking at what
//! was published before. Deduplication is owned by the relay.
//!
//! ## Topics
//!
//! ```text
//! {prefix}/{sensor|binary_sensor}/{object_id}/config   discovery, retained
//! {prefix}/brewblox/{device_or_entity}/state           state, not retained
//! ```
//!
//! ## Known limitation
//!
//! Sanitization may map two distinct raw ids of the same device to the same
//! entity identity (`Sensor 1` and `Sensor-1` both become `Sensor1`). The
//! entities then silently merge: the first announcement wins and both blocks
//! write the same state field.

mod spark;
mod tilt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::config::{HandledTypes, RelayConfig};
use crate::message::InboundMessage;

/// Prefix of generated Spark block ids that are never announced
pub const PLACEHOLDER_PREFIX: &str = "New|";

/// Home Assistant unit labels for Brewblox unit codes
const UNITS: &[(&str, &str)] = &[("degC", "°C"), ("degF", "°F"), ("degP", "°P")];

/// Stable identity of one announced entity
///
/// Spark: `{device_key}__{sanitized_block_id}`.
/// Tilt: `{device_key}_{sanitized_name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIdentity(String);

impl EntityIdentity {
    /// Identity of a Spark block (`sanitized_id` must already be sanitized)
    pub fn spark(device_key: &str, sanitized_id: &str) -> Self {
        Self(format!("{device_key}__{sanitized_id}"))
    }

    /// Identity of a Tilt (`sanitized_name` must already be sanitized)
    pub fn tilt(device_key: &str, sanitized_name: &str) -> Self {
        Self(format!("{device_key}_{sanitized_name}"))
    }

    /// Borrow the identity as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Home Assistant entity platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaComponent {
    /// Numeric sensor
    Sensor,
    /// ON/OFF sensor
    BinarySensor,
}

impl HaComponent {
    /// Topic segment for this component
    pub fn as_str(&self) -> &'static str {
        match self {
            HaComponent::Sensor => "sensor",
            HaComponent::BinarySensor => "binary_sensor",
        }
    }
}

/// MQTT discovery configuration payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    pub name: String,
    pub state_topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    pub value_template: String,
}

/// One discovery announcement candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    /// Entity this record announces (shared by all records of a Tilt)
    pub entity: EntityIdentity,
    /// Platform of the entity
    pub component: HaComponent,
    /// Retained discovery topic
    pub topic: String,
    /// Configuration payload
    pub config: DiscoveryConfig,
}

/// Live state for one device (Spark) or one entity (Tilt)
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    /// State topic
    pub topic: String,
    /// Sanitized field name to value
    pub payload: Map<String, Value>,
}

/// Result of translating one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    /// Discovery candidates, in production order
    pub discovery: Vec<DiscoveryRecord>,
    /// State update, absent when nothing was handled
    pub state: Option<StateUpdate>,
}

impl Translation {
    /// Whether the translation produces no output at all
    pub fn is_empty(&self) -> bool {
        self.discovery.is_empty() && self.state.is_none()
    }
}

/// Stateless message translator
#[derive(Debug, Clone)]
pub struct Translator {
    handled_types: HandledTypes,
    discovery_prefix: String,
}

impl Translator {
    /// Create a translator from relay configuration
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            handled_types: config.handled_types.clone(),
            discovery_prefix: config.discovery_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Translate one message
    pub fn translate(&self, message: &InboundMessage) -> Translation {
        match message {
            InboundMessage::SparkState(state) => spark::translate(self, state),
            InboundMessage::TiltState(state) => tilt::translate(self, state),
            InboundMessage::Unrecognized => Translation::default(),
        }
    }

    pub(crate) fn handled_types(&self) -> &HandledTypes {
        &self.handled_types
    }

    pub(crate) fn state_topic(&self, key: &str) -> String {
        format!("{}/brewblox/{key}/state", self.discovery_prefix)
    }

    pub(crate) fn discovery_topic(&self, component: HaComponent, object_id: &str) -> String {
        format!(
            "{}/{}/{object_id}/config",
            self.discovery_prefix,
            component.as_str()
        )
    }
}

/// Sanitize a Spark block id by stripping every character outside `[A-Za-z0-9_]`
pub fn sanitize_spark_id(raw: &str) -> String {
    raw.chars().filter(|c| is_identifier_char(*c)).collect()
}

/// Sanitize a Tilt name by replacing every character outside `[A-Za-z0-9_]` with `_`
pub fn sanitize_tilt_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if is_identifier_char(c) { c } else { '_' })
        .collect()
}

/// Whether a Spark block id is a generated placeholder
pub fn is_placeholder_id(raw: &str) -> bool {
    raw.starts_with(PLACEHOLDER_PREFIX)
}

/// Map a Brewblox unit code to its display label; unknown codes pass through
pub fn map_unit(code: &str) -> &str {
    UNITS
        .iter()
        .find(|(from, _)| *from == code)
        .map(|(_, to)| *to)
        .unwrap_or(code)
}

/// Round a reading to two decimals, keeping null readings null
///
/// Exact halves round to even: `0.125` becomes `0.12`.
pub fn round_reading(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::from((v * 100.0).round_ties_even() / 100.0),
        None => Value::Null,
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn value_template(field: &str) -> String {
    format!("{{{{ value_json.{field} }}}}")
}
