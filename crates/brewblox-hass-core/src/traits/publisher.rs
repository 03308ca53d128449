// # Publisher Trait
//
// Defines the outbound capability used by the relay.
//
// ## Implementations
//
// - MQTT (rumqttc): `brewblox-hass-mqtt` crate
// - Test doubles recording every call
//
// ## Usage
//
// ```rust,ignore
// use brewblox_hass_core::Publisher;
//
// fn announce(publisher: &dyn Publisher) -> Result<(), brewblox_hass_core::PublishError> {
//     publisher.publish("homeassistant/sensor/x/config", br#"{"name":"x"}"#, true)
// }
// ```

use crate::error::PublishError;

/// Outbound publish capability
///
/// The relay has no knowledge of the transport behind this trait. Calls are
/// fire-and-forget from the relay's perspective: an `Ok` means the transport
/// accepted the message, not that a subscriber received it.
///
/// # Thread Safety
///
/// The relay may be invoked from several tasks at once, so implementations
/// must be `Send + Sync`.
///
/// # Forbidden
///
/// - Retrying inside `publish` (the relay attempts each publish once)
/// - Blocking on broker acknowledgements
pub trait Publisher: Send + Sync {
    /// Publish one payload
    ///
    /// # Parameters
    ///
    /// - `topic`: Outbound topic
    /// - `payload`: Encoded JSON payload
    /// - `retain`: Whether the broker should retain the message
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), PublishError>;

    /// Publisher name (for logging/debugging)
    fn name(&self) -> &'static str {
        "publisher"
    }
}
