//! Capability traits for the relay
//!
//! This module defines the abstract interfaces the relay depends on.
//!
//! - [`Publisher`]: Outbound publish capability
//! - [`MessageSource`]: Inbound subscription stream

pub mod message_source;
pub mod publisher;

pub use message_source::{InboundPayload, MessageSource};
pub use publisher::Publisher;
