//! Configuration types for the relay
//!
//! This module defines all configuration structures used throughout the crate.
//! The core never reads environment variables or files: callers build a
//! [`RelayConfig`] (or deserialize one) and hand it to the relay.

use serde::{Deserialize, Serialize};

/// Spark block types reported as temperature sensors
pub const DEFAULT_SENSOR_TYPES: &[&str] = &[
    "TempSensorOneWire",
    "TempSensorCombi",
    "TempSensorMock",
    "TempSensorExternal",
];

/// Spark block types reported as temperature setpoints
pub const DEFAULT_SETPOINT_TYPES: &[&str] = &["SetpointSensorPair"];

/// Spark block types reported as running/idle binary sensors
pub const DEFAULT_PROFILE_TYPES: &[&str] = &["SetpointProfile"];

/// Main relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Prefix of the inbound state topics (subscribed as `{state_topic}/#`)
    #[serde(default = "default_state_topic")]
    pub state_topic: String,

    /// Prefix of the outbound Home Assistant topics
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Spark block types handled by the translator
    #[serde(default)]
    pub handled_types: HandledTypes,

    /// Capacity of the relay event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl RelayConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            state_topic: default_state_topic(),
            discovery_prefix: default_discovery_prefix(),
            handled_types: HandledTypes::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Set the inbound state topic prefix
    pub fn with_state_topic(mut self, state_topic: impl Into<String>) -> Self {
        self.state_topic = state_topic.into();
        self
    }

    /// Replace the handled block types
    pub fn with_handled_types(mut self, handled_types: HandledTypes) -> Self {
        self.handled_types = handled_types;
        self
    }

    /// Topic filter matching every inbound state message
    pub fn subscription_filter(&self) -> String {
        format!("{}/#", self.state_topic.trim_end_matches('/'))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_topic_prefix("state_topic", &self.state_topic)?;
        validate_topic_prefix("discovery_prefix", &self.discovery_prefix)?;

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }

        self.handled_types.validate()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_topic_prefix(field: &str, value: &str) -> Result<(), crate::Error> {
    if value.trim_matches('/').is_empty() {
        return Err(crate::Error::config(format!("{field} cannot be empty")));
    }
    if value.contains(['#', '+']) {
        return Err(crate::Error::config(format!(
            "{field} cannot contain MQTT wildcards: {value}"
        )));
    }
    Ok(())
}

/// Classification of a Spark block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Temperature sensor, reports `data.value`
    Sensor,
    /// Setpoint, reports `data.setting`
    Setpoint,
    /// Setpoint profile, reports whether `data.setting` is set
    Profile,
    /// Not handled
    Other,
}

/// Spark block types considered by the translator
///
/// New device block types can be added here without code changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandledTypes {
    /// Temperature sensor types
    #[serde(default)]
    pub sensor: Vec<String>,

    /// Setpoint types
    #[serde(default)]
    pub setpoint: Vec<String>,

    /// Profile types
    #[serde(default)]
    pub profile: Vec<String>,
}

impl HandledTypes {
    /// Create an empty set (nothing is handled)
    pub fn empty() -> Self {
        Self {
            sensor: Vec::new(),
            setpoint: Vec::new(),
            profile: Vec::new(),
        }
    }

    /// Classify a raw block type
    pub fn classify(&self, block_type: &str) -> BlockKind {
        let contains = |types: &[String]| types.iter().any(|t| t == block_type);

        if contains(&self.sensor) {
            BlockKind::Sensor
        } else if contains(&self.setpoint) {
            BlockKind::Setpoint
        } else if contains(&self.profile) {
            BlockKind::Profile
        } else {
            BlockKind::Other
        }
    }

    /// Validate the handled types
    ///
    /// A type may belong to a single class only.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let all = self.sensor.iter().chain(&self.setpoint).chain(&self.profile);
        let mut seen = std::collections::HashSet::new();

        for block_type in all {
            if block_type.is_empty() {
                return Err(crate::Error::config("handled block type cannot be empty"));
            }
            if !seen.insert(block_type.as_str()) {
                return Err(crate::Error::config(format!(
                    "block type '{block_type}' is listed in more than one class"
                )));
            }
        }

        Ok(())
    }
}

impl Default for HandledTypes {
    fn default() -> Self {
        let owned = |types: &[&str]| types.iter().map(|t| t.to_string()).collect();
        Self {
            sensor: owned(DEFAULT_SENSOR_TYPES),
            setpoint: owned(DEFAULT_SETPOINT_TYPES),
            profile: owned(DEFAULT_PROFILE_TYPES),
        }
    }
}

fn default_state_topic() -> String {
    "brewcast/state".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}
