// # Broker Client
//
// One rumqttc connection plus the task driving its event loop.
//
// ## Event Loop
//
// rumqttc only makes progress while `EventLoop::poll` is awaited. The driver
// task polls until the client disconnects:
// - `ConnAck` re-issues every registered subscription
// - Incoming publishes are forwarded to the watch stream
// - Connection errors are logged, then polling resumes after a delay
//
// Clean sessions are used, so subscriptions do not survive a reconnect on the
// broker side and must be re-sent from here.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use brewblox_hass_core::traits::{InboundPayload, MessageSource};
use brewblox_hass_core::{Error, Result};
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::BrokerConfig;
use crate::publisher::MqttPublisher;

/// Connection to one MQTT broker
///
/// Must be created inside a Tokio runtime: `connect` spawns the event loop
/// driver.
pub struct MqttClient {
    client: AsyncClient,
    address: String,
    subscriptions: Arc<Subscriptions>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundPayload>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Filters to (re-)subscribe, and whether the broker accepted our connection
#[derive(Default)]
struct Subscriptions {
    filters: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl Subscriptions {
    fn filters(&self) -> MutexGuard<'_, Vec<String>> {
        self.filters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MqttClient {
    /// Validate the settings and start connecting
    ///
    /// Returns as soon as the driver task is running. The connection itself
    /// is established in the background and retried until `disconnect`.
    pub fn connect(config: &BrokerConfig) -> Result<Self> {
        config.validate()?;

        let (client, eventloop) = AsyncClient::new(config.to_options(), config.channel_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity);
        let subscriptions = Arc::new(Subscriptions::default());
        let address = config.address();

        tracing::info!("Connecting to MQTT broker at {}", address);

        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            Arc::clone(&subscriptions),
            inbound_tx,
            address.clone(),
            config.reconnect_delay,
        ));

        Ok(Self {
            client,
            address,
            subscriptions,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            driver: Mutex::new(Some(driver)),
        })
    }

    /// Broker address, for logs
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Publisher sharing this connection
    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher::new(self.client.clone(), self.address.clone())
    }

    /// Send DISCONNECT and wait for the driver task to finish
    ///
    /// The wait is bounded by `timeout`. After it expires the driver is
    /// aborted.
    pub async fn disconnect(&self, timeout: Duration) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("Disconnect request to {} failed: {}", self.address, e);
        }

        let driver = self
            .driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(mut driver) = driver {
            if tokio::time::timeout(timeout, &mut driver).await.is_err() {
                tracing::warn!("MQTT driver for {} did not stop in time, aborting", self.address);
                driver.abort();
            }
        }

        tracing::info!("Disconnected from {}", self.address);
    }
}

#[async_trait]
impl MessageSource for MqttClient {
    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.subscriptions.filters().push(filter.to_string());

        if self.subscriptions.connected.load(Ordering::SeqCst) {
            self.client
                .subscribe(filter, QoS::AtMostOnce)
                .await
                .map_err(|e| Error::source(format!("Failed to subscribe to {filter}: {e}")))?;
        }

        tracing::debug!("Registered subscription {} on {}", filter, self.address);
        Ok(())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = InboundPayload> + Send + 'static>> {
        let rx = self
            .inbound_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match rx {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => {
                tracing::warn!("watch() called twice on {}, returning an empty stream", self.address);
                Box::pin(tokio_stream::empty())
            }
        }
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(driver) = self
            .driver
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            driver.abort();
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Arc<Subscriptions>,
    inbound_tx: mpsc::Sender<InboundPayload>,
    address: String,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to {}", address);
                subscriptions.connected.store(true, Ordering::SeqCst);

                let filters = subscriptions.filters().clone();
                for filter in filters {
                    if let Err(e) = client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                        tracing::error!("Failed to subscribe to {} on {}: {}", filter, address, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = InboundPayload::new(publish.topic, publish.payload.to_vec());
                if inbound_tx.send(payload).await.is_err() {
                    tracing::trace!("No watcher for messages from {}", address);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("Driver for {} stopping", address);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                subscriptions.connected.store(false, Ordering::SeqCst);
                tracing::warn!("Connection to {} lost: {}", address, e);
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}
