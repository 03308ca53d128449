// # brewblox-hassd - Home Assistant Relay Daemon
//
// Thin integration layer: all discovery and relay logic lives in
// brewblox-hass-core. This binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Connecting both brokers
// 4. Running the relay until SIGTERM or SIGINT
//
// ## Configuration
//
// ### Service
// - `BREWBLOX_HASS_NAME`: Client id prefix (default: hass)
// - `BREWBLOX_HASS_DEBUG`: `true` forces debug logging
// - `BREWBLOX_HASS_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ### Brewblox eventbus
// - `BREWBLOX_HASS_MQTT_PROTOCOL`: mqtt or mqtts (default: mqtt)
// - `BREWBLOX_HASS_MQTT_HOST`: Hostname (default: eventbus)
// - `BREWBLOX_HASS_MQTT_PORT`: Port (default: 1883)
// - `BREWBLOX_HASS_STATE_TOPIC`: State topic root (default: brewcast/state)
//
// ### Home Assistant broker
// - `BREWBLOX_HASS_HASS_MQTT_PROTOCOL`: mqtt or mqtts (default: mqtt)
// - `BREWBLOX_HASS_HASS_MQTT_HOST`: Hostname (default: eventbus)
// - `BREWBLOX_HASS_HASS_MQTT_PORT`: Port (default: 1883)
// - `HASS_MQTT_USERNAME`: Username (optional)
// - `HASS_MQTT_PASSWORD`: Password (optional)
//
// ### Handled block types
// - `BREWBLOX_HASS_SENSOR_TYPES`: Comma-separated sensor types
// - `BREWBLOX_HASS_SETPOINT_TYPES`: Comma-separated setpoint types
// - `BREWBLOX_HASS_PROFILE_TYPES`: Comma-separated profile types
//
// ## Example
//
// ```bash
// export BREWBLOX_HASS_HASS_MQTT_HOST=homeassistant.local
// export HASS_MQTT_USERNAME=brewblox
// export HASS_MQTT_PASSWORD=secret
//
// brewblox-hassd
// ```

use anyhow::{Context, Result};
use brewblox_hass_core::{HandledTypes, Relay, RelayConfig, RelayEvent};
use brewblox_hass_mqtt::{BrokerConfig, MqttClient, MqttProtocol};
use std::env;
use std::fmt;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed for each broker connection to close
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HassExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<HassExitCode> for ExitCode {
    fn from(code: HassExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// One broker's address
#[derive(Debug, Clone, PartialEq)]
struct BrokerAddress {
    protocol: String,
    host: String,
    port: u16,
}

/// Application configuration
struct Config {
    name: String,
    debug: bool,
    log_level: String,
    mqtt: BrokerAddress,
    hass_mqtt: BrokerAddress,
    hass_username: Option<String>,
    hass_password: Option<String>,
    state_topic: String,
    sensor_types: Option<Vec<String>>,
    setpoint_types: Option<Vec<String>>,
    profile_types: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            name: var("BREWBLOX_HASS_NAME", "hass"),
            debug: parse_bool(&var("BREWBLOX_HASS_DEBUG", "false"))
                .context("BREWBLOX_HASS_DEBUG must be true or false")?,
            log_level: var("BREWBLOX_HASS_LOG_LEVEL", "info"),
            mqtt: BrokerAddress {
                protocol: var("BREWBLOX_HASS_MQTT_PROTOCOL", "mqtt"),
                host: var("BREWBLOX_HASS_MQTT_HOST", "eventbus"),
                port: parse_port("BREWBLOX_HASS_MQTT_PORT", &var("BREWBLOX_HASS_MQTT_PORT", "1883"))?,
            },
            hass_mqtt: BrokerAddress {
                protocol: var("BREWBLOX_HASS_HASS_MQTT_PROTOCOL", "mqtt"),
                host: var("BREWBLOX_HASS_HASS_MQTT_HOST", "eventbus"),
                port: parse_port(
                    "BREWBLOX_HASS_HASS_MQTT_PORT",
                    &var("BREWBLOX_HASS_HASS_MQTT_PORT", "1883"),
                )?,
            },
            hass_username: lookup("HASS_MQTT_USERNAME").filter(|s| !s.is_empty()),
            hass_password: lookup("HASS_MQTT_PASSWORD").filter(|s| !s.is_empty()),
            state_topic: var("BREWBLOX_HASS_STATE_TOPIC", "brewcast/state"),
            sensor_types: lookup("BREWBLOX_HASS_SENSOR_TYPES").map(|s| parse_list(&s)),
            setpoint_types: lookup("BREWBLOX_HASS_SETPOINT_TYPES").map(|s| parse_list(&s)),
            profile_types: lookup("BREWBLOX_HASS_PROFILE_TYPES").map(|s| parse_list(&s)),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("BREWBLOX_HASS_NAME cannot be empty");
        }

        for (key, address) in [
            ("BREWBLOX_HASS_MQTT", &self.mqtt),
            ("BREWBLOX_HASS_HASS_MQTT", &self.hass_mqtt),
        ] {
            address
                .protocol
                .parse::<MqttProtocol>()
                .with_context(|| format!("{key}_PROTOCOL is invalid"))?;

            if address.host.is_empty() {
                anyhow::bail!("{key}_HOST cannot be empty");
            }
        }

        if self.hass_password.is_some() && self.hass_username.is_none() {
            anyhow::bail!(
                "HASS_MQTT_PASSWORD is set but HASS_MQTT_USERNAME is not. \
                Set both or neither."
            );
        }

        self.relay_config().validate()?;

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "BREWBLOX_HASS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Effective log level, `debug` wins over `log_level`
    fn level(&self) -> Level {
        if self.debug {
            return Level::DEBUG;
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Relay settings with handled-type overrides applied
    fn relay_config(&self) -> RelayConfig {
        let mut handled = HandledTypes::default();
        if let Some(types) = &self.sensor_types {
            handled.sensor = types.clone();
        }
        if let Some(types) = &self.setpoint_types {
            handled.setpoint = types.clone();
        }
        if let Some(types) = &self.profile_types {
            handled.profile = types.clone();
        }

        RelayConfig::new()
            .with_state_topic(self.state_topic.clone())
            .with_handled_types(handled)
    }

    /// Settings for the Brewblox eventbus connection
    fn local_broker(&self) -> Result<BrokerConfig> {
        Ok(BrokerConfig::new(
            format!("{}-local-{}", self.name, std::process::id()),
            self.mqtt.host.clone(),
            self.mqtt.port,
        )
        .with_protocol(self.mqtt.protocol.parse()?))
    }

    /// Settings for the Home Assistant broker connection
    fn hass_broker(&self) -> Result<BrokerConfig> {
        Ok(BrokerConfig::new(
            format!("{}-hass-{}", self.name, std::process::id()),
            self.hass_mqtt.host.clone(),
            self.hass_mqtt.port,
        )
        .with_protocol(self.hass_mqtt.protocol.parse()?)
        .with_credentials(self.hass_username.clone(), self.hass_password.clone()))
    }
}

// Custom Debug implementation that hides the password
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("debug", &self.debug)
            .field("log_level", &self.log_level)
            .field("mqtt", &self.mqtt)
            .field("hass_mqtt", &self.hass_mqtt)
            .field("hass_username", &self.hass_username)
            .field("hass_password", &self.hass_password.as_ref().map(|_| "<REDACTED>"))
            .field("state_topic", &self.state_topic)
            .field("sensor_types", &self.sensor_types)
            .field("setpoint_types", &self.setpoint_types)
            .field("profile_types", &self.profile_types)
            .finish()
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("'{}' is not a boolean", other),
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    let port: u16 = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a number between 1 and 65535. Got: {value}"))?;

    if port == 0 {
        anyhow::bail!("{} must be between 1 and 65535. Got: 0", key);
    }

    Ok(port)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return HassExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return HassExitCode::ConfigError.into();
    }

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HassExitCode::ConfigError.into();
    }

    info!("Starting brewblox-hassd");
    debug!("Configuration loaded: {:?}", config);

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HassExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            HassExitCode::RuntimeError
        } else {
            HassExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let relay_config = config.relay_config();
    let hass_broker = config.hass_broker()?;
    let local_broker = config.local_broker()?;

    // Publisher first, so announcements have somewhere to go
    info!("Home Assistant broker: {}", hass_broker.address());
    let hass = MqttClient::connect(&hass_broker)?;

    info!("Brewblox eventbus: {}", local_broker.address());
    let local = MqttClient::connect(&local_broker)?;

    let (relay, events) = Relay::new(Box::new(hass.publisher()), relay_config)?;
    let events_task = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let signal_task = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown handler error: {:#}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let result = relay.run_with_shutdown(&local, Some(shutdown_rx)).await;

    signal_task.abort();
    info!("Shutting down daemon");

    local.disconnect(DISCONNECT_TIMEOUT).await;
    hass.disconnect(DISCONNECT_TIMEOUT).await;

    // Dropping the relay closes the event channel
    drop(relay);
    let _ = events_task.await;

    result.map_err(Into::into)
}

/// Log relay events until the relay is dropped
async fn log_events(mut events: mpsc::Receiver<RelayEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::Started { filter } => debug!("Relay listening on {}", filter),
            RelayEvent::EntityAnnounced { entity, topic } => {
                debug!("Announced {} on {}", entity, topic)
            }
            RelayEvent::StatePublished { topic } => debug!("State published to {}", topic),
            RelayEvent::MessageDropped { topic, reason } => {
                debug!("Dropped message from {}: {}", topic, reason)
            }
            RelayEvent::PublishFailed { topic, error } => {
                debug!("Publish to {} failed: {}", topic, error)
            }
            RelayEvent::Stopped { reason } => debug!("Relay stopped: {}", reason),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
