//! Publisher backed by a rumqttc client

use brewblox_hass_core::traits::Publisher;
use brewblox_hass_core::PublishError;
use rumqttc::{AsyncClient, ClientError, QoS};

/// Publishes to one broker without waiting
///
/// Requests are queued on the client's request channel. A full queue or a
/// stopped event loop rejects the publish immediately.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    address: String,
}

impl MqttPublisher {
    pub(crate) fn new(client: AsyncClient, address: String) -> Self {
        Self { client, address }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), PublishError> {
        tracing::trace!(
            "Publishing {} bytes to {} on {} (retain={})",
            payload.len(),
            topic,
            self.address,
            retain
        );

        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .map_err(|e| map_client_error(topic, e))
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

fn map_client_error(topic: &str, error: ClientError) -> PublishError {
    PublishError::rejected(topic, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;

    #[test]
    fn test_full_request_queue_rejects() {
        let options = BrokerConfig::new("hass-test", "127.0.0.1", 1883).to_options();
        // Event loop is kept alive but never polled.
        let (client, _eventloop) = AsyncClient::new(options, 1);
        let publisher = MqttPublisher::new(client, "mqtt://127.0.0.1:1883".to_string());

        assert!(publisher.publish("homeassistant/sensor/a/config", b"{}", true).is_ok());

        let err = publisher
            .publish("homeassistant/sensor/b/config", b"{}", true)
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::Rejected { ref topic, .. } if topic == "homeassistant/sensor/b/config"
        ));
    }

    #[test]
    fn test_stopped_event_loop_rejects() {
        let options = BrokerConfig::new("hass-test", "127.0.0.1", 1883).to_options();
        let (client, eventloop) = AsyncClient::new(options, 10);
        drop(eventloop);
        let publisher = MqttPublisher::new(client, "mqtt://127.0.0.1:1883".to_string());

        assert!(publisher.publish("brewblox/spark/state", b"{}", false).is_err());
    }
}
