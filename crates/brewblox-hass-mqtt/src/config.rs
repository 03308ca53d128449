//! Broker connection settings

use brewblox_hass_core::{Error, Result};
use rumqttc::{MqttOptions, Transport};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Transport protocol of a broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MqttProtocol {
    /// Plain TCP
    #[default]
    Mqtt,
    /// TLS with the platform's root certificates
    Mqtts,
}

impl FromStr for MqttProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mqtt" => Ok(MqttProtocol::Mqtt),
            "mqtts" => Ok(MqttProtocol::Mqtts),
            other => Err(Error::config(format!(
                "MQTT protocol '{other}' is not supported. Supported protocols: mqtt, mqtts"
            ))),
        }
    }
}

impl fmt::Display for MqttProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MqttProtocol::Mqtt => f.write_str("mqtt"),
            MqttProtocol::Mqtts => f.write_str("mqtts"),
        }
    }
}

/// Connection settings for one broker
///
/// # Security
///
/// The Debug implementation does NOT expose the password.
#[derive(Clone)]
pub struct BrokerConfig {
    /// Client id announced to the broker
    pub client_id: String,
    /// Broker hostname
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Transport protocol
    pub protocol: MqttProtocol,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    /// ⚠️ NEVER log this value
    pub password: Option<String>,
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
    /// Delay before polling again after a connection error
    pub reconnect_delay: Duration,
    /// Capacity of the request and inbound queues
    pub channel_capacity: usize,
}

impl BrokerConfig {
    /// Create settings for a broker with defaults for everything else
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            protocol: MqttProtocol::Mqtt,
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            channel_capacity: 100,
        }
    }

    /// Set the transport protocol
    pub fn with_protocol(mut self, protocol: MqttProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set credentials
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    /// Human-readable broker address, for logs
    pub fn address(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("MQTT host cannot be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("MQTT port must be between 1 and 65535"));
        }
        if self.client_id.is_empty() {
            return Err(Error::config("MQTT client id cannot be empty"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::config("MQTT password set without a username"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::config("MQTT channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Build rumqttc options
    pub fn to_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }

        if self.protocol == MqttProtocol::Mqtts {
            options.set_transport(Transport::tls_with_default_config());
        }

        options
    }
}

// Custom Debug implementation that hides the password
impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("client_id", &self.client_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}
