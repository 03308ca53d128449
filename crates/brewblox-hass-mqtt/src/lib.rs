//! MQTT transport for brewblox-hass
//!
//! Implements the core `Publisher` and `MessageSource` capabilities on top of
//! rumqttc. One [`MqttClient`] per broker: the local Brewblox eventbus is used
//! as a message source, the Home Assistant broker as a publisher.
//!
//! ```rust,no_run
//! use brewblox_hass_mqtt::{BrokerConfig, MqttClient};
//!
//! # async fn run() -> brewblox_hass_core::Result<()> {
//! let hass = MqttClient::connect(&BrokerConfig::new("hass-publisher", "eventbus", 1883))?;
//! let publisher = hass.publisher();
//! # let _ = publisher;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod publisher;

pub use client::MqttClient;
pub use config::{BrokerConfig, MqttProtocol};
pub use publisher::MqttPublisher;
