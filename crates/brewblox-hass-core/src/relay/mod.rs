//! Discovery-and-relay orchestrator
//!
//! The Relay is responsible for:
//! - Decoding inbound state messages
//! - Translating them into discovery records and state updates
//! - Announcing each entity once per process
//! - Forwarding every state update
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ MessageSource │─── InboundPayload ───┐
//! └───────────────┘                      │
//!                                        ▼
//!                               ┌──────────────┐
//!                               │    Relay     │
//!                               └──────────────┘
//!                                        │
//!         ┌──────────────────────────────┼──────────────────────────┐
//!         │                              │                          │
//!         ▼                              ▼                          ▼
//! ┌──────────────┐              ┌──────────────┐            ┌─────────────┐
//! │  Translator  │              │   KnownSet   │            │  Publisher  │
//! │   (pure)     │              │ (claim once) │            │ (discovery, │
//! └──────────────┘              └──────────────┘            │   state)    │
//!                                                           └─────────────┘
//! ```
//!
//! ## Message Flow
//!
//! 1. Decode the payload (malformed → dropped, logged at warn)
//! 2. Translate into discovery candidates and an optional state update
//! 3. For each candidate whose entity is claimed now, publish it retained
//! 4. Publish the state update, not retained
//!
//! Discovery publishes of a message always happen before its state publish.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, trace, warn};

use crate::config::RelayConfig;
use crate::error::{PublishError, Result};
use crate::message::InboundMessage;
use crate::state::KnownSet;
use crate::traits::{InboundPayload, MessageSource, Publisher};
use crate::translate::{DiscoveryRecord, EntityIdentity, StateUpdate, Translator};

/// Events emitted by the Relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Relay subscribed and started draining messages
    Started {
        filter: String,
    },

    /// Discovery config published for a new entity
    EntityAnnounced {
        entity: String,
        topic: String,
    },

    /// State update published
    StatePublished {
        topic: String,
    },

    /// Inbound message could not be decoded
    MessageDropped {
        topic: String,
        reason: String,
    },

    /// Outbound publish failed
    PublishFailed {
        topic: String,
        error: String,
    },

    /// Relay stopped
    Stopped {
        reason: String,
    },
}

/// Summary of handling one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Entities announced by this message
    pub announced: Vec<EntityIdentity>,
    /// Discovery records skipped because their entity was already known
    /// or their topic was already attempted in this message
    pub skipped: usize,
    /// Whether a state update was published
    pub state_published: bool,
    /// Publishes that failed
    pub failures: Vec<PublishError>,
}

impl RelayOutcome {
    /// Whether every attempted publish succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Core relay
///
/// ## Threading
///
/// `handle_message` takes `&self` and may be called from several tasks at
/// once. The known-set check-and-insert is atomic, so concurrent messages for
/// the same entity publish its discovery config once.
///
/// ## Failure isolation
///
/// No single message can stop the relay. Malformed payloads are dropped,
/// failed publishes are reported in the [`RelayOutcome`] and as events.
pub struct Relay {
    /// Outbound capability
    publisher: Box<dyn Publisher>,

    /// Stateless translator
    translator: Translator,

    /// Entities announced during this process lifetime
    known: KnownSet,

    /// Inbound topic filter
    filter: String,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<RelayEvent>,
}

impl Relay {
    /// Create a new relay with an empty known set
    ///
    /// # Returns
    ///
    /// A tuple of (relay, event_receiver) where event_receiver yields relay events
    pub fn new(
        publisher: Box<dyn Publisher>,
        config: RelayConfig,
    ) -> Result<(Self, mpsc::Receiver<RelayEvent>)> {
        Self::with_known_set(publisher, config, KnownSet::new())
    }

    /// Create a new relay sharing an existing known set
    pub fn with_known_set(
        publisher: Box<dyn Publisher>,
        config: RelayConfig,
        known: KnownSet,
    ) -> Result<(Self, mpsc::Receiver<RelayEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let relay = Self {
            publisher,
            translator: Translator::new(&config),
            known,
            filter: config.subscription_filter(),
            event_tx: tx,
        };

        Ok((relay, rx))
    }

    /// Topic filter the relay subscribes to
    pub fn subscription_filter(&self) -> &str {
        &self.filter
    }

    /// Entities announced so far
    pub fn known(&self) -> &KnownSet {
        &self.known
    }

    /// Decode and handle one raw payload
    ///
    /// # Returns
    ///
    /// - `Ok(RelayOutcome)`: The message was decoded (publishes may still have failed)
    /// - `Err(Error::MalformedMessage)`: The payload was not a valid state message
    pub fn handle_payload(&self, payload: &[u8]) -> Result<RelayOutcome> {
        let message = InboundMessage::from_slice(payload)?;
        Ok(self.handle_message(&message))
    }

    /// Handle one decoded message
    pub fn handle_message(&self, message: &InboundMessage) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();

        if matches!(message, InboundMessage::Unrecognized) {
            trace!("Ignoring unrecognized message kind");
            return outcome;
        }

        let translation = self.translator.translate(message);

        self.announce(&translation.discovery, &mut outcome);

        if let Some(state) = &translation.state {
            self.forward_state(state, &mut outcome);
        }

        outcome
    }

    /// Publish discovery records for entities not announced before
    ///
    /// Records sharing an entity (Tilt) are published under a single claim.
    /// A topic is attempted at most once per message: when two block ids
    /// sanitize to the same entity, the first record wins.
    fn announce(&self, records: &[DiscoveryRecord], outcome: &mut RelayOutcome) {
        let mut claimed: Vec<&EntityIdentity> = Vec::new();
        let mut failed: Vec<&EntityIdentity> = Vec::new();
        let mut attempted: Vec<&str> = Vec::new();

        for record in records {
            if attempted.contains(&record.topic.as_str()) {
                debug!("Duplicate discovery topic {} in message, skipping", record.topic);
                outcome.skipped += 1;
                continue;
            }

            let owned = claimed.contains(&&record.entity) || {
                let won = self.known.claim(&record.entity);
                if won {
                    claimed.push(&record.entity);
                }
                won
            };

            if !owned {
                debug!("Entity {} already announced, skipping {}", record.entity, record.topic);
                outcome.skipped += 1;
                continue;
            }
            attempted.push(&record.topic);

            info!(
                "Publishing new {}: {}",
                record.component.as_str(),
                record.config.name
            );

            match self.publish_json(&record.topic, &record.config, true) {
                Ok(()) => {
                    self.emit_event(RelayEvent::EntityAnnounced {
                        entity: record.entity.to_string(),
                        topic: record.topic.clone(),
                    });
                }
                Err(e) => {
                    error!("Failed to announce {}: {}", record.entity, e);
                    if !failed.contains(&&record.entity) {
                        // Keep the entity eligible for a later message
                        self.known.release(&record.entity);
                        failed.push(&record.entity);
                    }
                    self.record_failure(&record.topic, e, outcome);
                }
            }
        }

        outcome.announced = claimed
            .into_iter()
            .filter(|entity| !failed.contains(entity))
            .cloned()
            .collect();
    }

    /// Publish the merged state of one message
    fn forward_state(&self, state: &StateUpdate, outcome: &mut RelayOutcome) {
        match self.publish_json(&state.topic, &state.payload, false) {
            Ok(()) => {
                trace!("Published state to {}", state.topic);
                outcome.state_published = true;
                self.emit_event(RelayEvent::StatePublished {
                    topic: state.topic.clone(),
                });
            }
            Err(e) => {
                error!("Failed to publish state to {}: {}", state.topic, e);
                self.record_failure(&state.topic, e, outcome);
            }
        }
    }

    fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
        retain: bool,
    ) -> std::result::Result<(), PublishError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| PublishError::Serialization(e.to_string()))?;
        self.publisher.publish(topic, &payload, retain)
    }

    fn record_failure(&self, topic: &str, error: PublishError, outcome: &mut RelayOutcome) {
        self.emit_event(RelayEvent::PublishFailed {
            topic: topic.to_string(),
            error: error.to_string(),
        });
        outcome.failures.push(error);
    }

    /// Handle one payload from the message source, never failing
    fn handle_inbound(&self, inbound: InboundPayload) {
        match self.handle_payload(&inbound.payload) {
            Ok(outcome) => {
                if !outcome.is_success() {
                    warn!(
                        "{} publish(es) failed for message on {}",
                        outcome.failures.len(),
                        inbound.topic
                    );
                }
            }
            Err(e) => {
                warn!("Dropping message on {}: {}", inbound.topic, e);
                self.emit_event(RelayEvent::MessageDropped {
                    topic: inbound.topic,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Run the relay
    ///
    /// Subscribes the source to the state topic filter and handles every
    /// message until ctrl-c is received or the source closes.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The subscription could not be registered
    pub async fn run(&self, source: &dyn MessageSource) -> Result<()> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        self.run_until(source, ctrl_c).await
    }

    /// Run the relay until the shutdown signal fires or the source closes
    ///
    /// # Parameters
    ///
    /// - `source`: Inbound message source
    /// - `shutdown_rx`: Optional oneshot receiver to trigger shutdown
    pub async fn run_with_shutdown(
        &self,
        source: &dyn MessageSource,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        let shutdown = async {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        self.run_until(source, shutdown).await
    }

    async fn run_until(
        &self,
        source: &dyn MessageSource,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        source.subscribe(&self.filter).await?;
        info!("Subscribed to {}", self.filter);

        self.emit_event(RelayEvent::Started {
            filter: self.filter.clone(),
        });

        let mut messages = source.watch();
        tokio::pin!(shutdown);

        // Main event loop
        let reason = loop {
            tokio::select! {
                inbound = messages.next() => match inbound {
                    Some(inbound) => self.handle_inbound(inbound),
                    None => break "Message source closed",
                },

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break "Shutdown signal";
                }
            }
        };

        self.emit_event(RelayEvent::Stopped {
            reason: reason.to_string(),
        });
        info!(
            "Relay stopped ({}), {} entities announced",
            reason,
            self.known.len()
        );

        Ok(())
    }

    /// Emit a relay event
    fn emit_event(&self, event: RelayEvent) {
        // Never block message handling on a slow event consumer
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecPublisher {
        published: Mutex<Vec<(String, bool)>>,
    }

    impl Publisher for std::sync::Arc<VecPublisher> {
        fn publish(
            &self,
            topic: &str,
            _payload: &[u8],
            retain: bool,
        ) -> std::result::Result<(), PublishError> {
            self.published.lock().unwrap().push((topic.to_string(), retain));
            Ok(())
        }
    }

    #[test]
    fn test_unrecognized_publishes_nothing() {
        let publisher = std::sync::Arc::new(VecPublisher::default());
        let (relay, _rx) =
            Relay::new(Box::new(publisher.clone()), RelayConfig::default()).unwrap();

        let outcome = relay
            .handle_payload(br#"{"key": "x", "type": "Other.state", "data": {}}"#)
            .unwrap();

        assert_eq!(outcome, RelayOutcome::default());
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let publisher = std::sync::Arc::new(VecPublisher::default());
        let mut config = RelayConfig::default();
        config.event_channel_capacity = 0;

        assert!(Relay::new(Box::new(publisher), config).is_err());
    }

    #[test]
    fn test_retain_flags() {
        let publisher = std::sync::Arc::new(VecPublisher::default());
        let (relay, _rx) =
            Relay::new(Box::new(publisher.clone()), RelayConfig::default()).unwrap();

        relay
            .handle_payload(
                br#"{"key": "tilt", "type": "Tilt.state", "name": "Red", "data": {}}"#,
            )
            .unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 4);
        assert!(published[..3].iter().all(|(_, retain)| *retain));
        assert_eq!(
            published[3],
            ("homeassistant/brewblox/tilt_Red/state".to_string(), false)
        );
    }
}
