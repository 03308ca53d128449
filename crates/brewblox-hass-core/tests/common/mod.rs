//! Test doubles and common utilities for relay contract tests
//!
//! This module provides minimal test doubles that record what the relay
//! publishes and feed it controlled inbound messages.

#![allow(dead_code)]

use brewblox_hass_core::error::Result;
use brewblox_hass_core::traits::{InboundPayload, MessageSource, Publisher};
use brewblox_hass_core::{PublishError, Relay, RelayConfig, RelayEvent};
use serde_json::{Value, json};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// One recorded publish call
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Value,
    pub retain: bool,
}

/// A Publisher that records every call
///
/// Clones share the same recording, so a test can keep one clone and hand
/// another to the relay.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    /// Successful publishes, in call order
    published: Arc<Mutex<Vec<Published>>>,
    /// Call counter for publish(), including failed calls
    call_count: Arc<AtomicUsize>,
    /// Topic prefixes that currently fail
    failing: Arc<Mutex<Vec<String>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All successful publishes
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    /// Successful retained publishes (discovery)
    pub fn discovery(&self) -> Vec<Published> {
        self.published().into_iter().filter(|p| p.retain).collect()
    }

    /// Successful non-retained publishes (state)
    pub fn state(&self) -> Vec<Published> {
        self.published().into_iter().filter(|p| !p.retain).collect()
    }

    /// Number of publish() calls, including failed ones
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Make publishes to topics starting with `prefix` fail
    pub fn fail_on(&self, prefix: &str) {
        self.failing.lock().unwrap().push(prefix.to_string());
    }

    /// Make all publishes succeed again
    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Forget recorded publishes
    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> std::result::Result<(), PublishError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing.lock().unwrap();
        if failing.iter().any(|prefix| topic.starts_with(prefix.as_str())) {
            return Err(PublishError::rejected(topic, "test failure"));
        }
        drop(failing);

        let payload = serde_json::from_slice(payload).expect("relay publishes JSON");
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// A MessageSource fed by the test through a channel
pub struct ControlledSource {
    /// Receiver for the relay's watch stream
    rx: Mutex<Option<mpsc::UnboundedReceiver<InboundPayload>>>,
    /// Registered topic filters
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl ControlledSource {
    /// Create a new controlled source
    pub fn new() -> (Self, mpsc::UnboundedSender<InboundPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let source = Self {
            rx: Mutex::new(Some(rx)),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        };

        (source, tx)
    }

    /// Handle on the registered filters, usable after the source is moved
    pub fn subscriptions(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.subscriptions)
    }
}

#[async_trait::async_trait]
impl MessageSource for ControlledSource {
    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = InboundPayload> + Send + 'static>> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

/// Create a relay around a recording publisher
pub fn recording_relay() -> (Relay, RecordingPublisher, mpsc::Receiver<RelayEvent>) {
    let publisher = RecordingPublisher::new();
    let (relay, events) = Relay::new(Box::new(publisher.clone()), RelayConfig::default())
        .expect("relay construction succeeds");
    (relay, publisher, events)
}

/// Drain every event currently queued
pub fn drain_events(events: &mut mpsc::Receiver<RelayEvent>) -> Vec<RelayEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Spark quantity as serialized by the controller
pub fn quantity(unit: &str, value: Value) -> Value {
    json!({"__bloxtype": "Quantity", "unit": unit, "value": value})
}

/// Temperature sensor block
pub fn sensor_block(id: &str, value: Value) -> Value {
    json!({
        "id": id,
        "nid": 100,
        "type": "TempSensorMock",
        "data": {"value": quantity("degC", value), "connected": true}
    })
}

/// `Spark.state` message
pub fn spark_state(key: &str, blocks: Vec<Value>) -> Vec<u8> {
    json!({
        "key": key,
        "type": "Spark.state",
        "data": {"status": {"is_connected": true}, "blocks": blocks}
    })
    .to_string()
    .into_bytes()
}

/// `Tilt.state` message
pub fn tilt_state(key: &str, name: &str, temp_c: f64, sg: f64, plato: f64) -> Vec<u8> {
    json!({
        "key": key,
        "type": "Tilt.state",
        "timestamp": "2024-01-01T00:00:00Z",
        "color": name,
        "name": name,
        "data": {
            "temperature[degF]": temp_c * 9.0 / 5.0 + 32.0,
            "temperature[degC]": temp_c,
            "specificGravity": sg,
            "plato[degP]": plato,
            "rssi[dBm]": -80
        }
    })
    .to_string()
    .into_bytes()
}
