//! Error types for the relay
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the relay
#[derive(Error, Debug)]
pub enum Error {
    /// Inbound message is missing mandatory keys or has the wrong shape
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Outbound publish was rejected by the transport
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Message source-related errors
    #[error("Message source error: {0}")]
    Source(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a malformed message error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    /// Create a message source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error only affects the message that caused it
    pub fn is_per_message(&self) -> bool {
        matches!(self, Self::MalformedMessage(_) | Self::Publish(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Failure reported by a [`Publisher`](crate::traits::Publisher)
///
/// Publish failures never alter the known-entity set: an entity whose
/// discovery publish failed stays eligible for announcement on a later message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The transport refused the publish (queue full, invalid topic, ...)
    #[error("publish to '{topic}' rejected: {reason}")]
    Rejected {
        /// Outbound topic
        topic: String,
        /// Transport-specific reason
        reason: String,
    },

    /// The transport has no usable connection
    #[error("transport disconnected: {0}")]
    Disconnected(String),

    /// The payload could not be encoded
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

impl PublishError {
    /// Create a rejected publish error
    pub fn rejected(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}
