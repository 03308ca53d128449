// # Message Source Trait
//
// Defines the inbound capability the relay runtime drains.
//
// ## Implementations
//
// - MQTT (rumqttc): `brewblox-hass-mqtt` crate
//
// ## Usage
//
// ```rust,ignore
// use brewblox_hass_core::MessageSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* MessageSource implementation */;
//
//     source.subscribe("brewcast/state/#").await?;
//
//     let mut stream = source.watch();
//     while let Some(message) = stream.next().await {
//         println!("{}: {} bytes", message.topic, message.payload.len());
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// Raw inbound message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPayload {
    /// Topic the message arrived on
    pub topic: String,
    /// Undecoded payload
    pub payload: Vec<u8>,
}

impl InboundPayload {
    /// Create a new inbound payload
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Trait for inbound message sources
///
/// Connection management, reconnection and backoff belong to the
/// implementation. The relay only subscribes once and drains the stream.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Register a topic filter
    ///
    /// Implementations must keep the subscription alive across reconnects.
    async fn subscribe(&self, filter: &str) -> Result<(), crate::Error>;

    /// Stream of inbound messages
    ///
    /// May be called once. The stream ends when the source shuts down.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = InboundPayload> + Send + 'static>>;
}
