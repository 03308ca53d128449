// # brewblox-hass-core
//
// Core library relaying Brewblox state events to Home Assistant.
//
// ## Architecture Overview
//
// This library provides the discovery-and-relay protocol:
// - **InboundMessage**: Tagged state message, validated at the boundary
// - **Translator**: Pure mapping from a message to discovery records and state
// - **KnownSet**: Process-lifetime set of announced entities
// - **Relay**: Announces each entity once, forwards every state update
// - **Publisher** / **MessageSource**: Transport capabilities injected by the caller
//
// ## Design Principles
//
// 1. **Transport-Agnostic**: No broker client types cross the core boundary
// 2. **Idempotent Discovery**: At most one discovery publish per entity per process
// 3. **Unconditional State**: Every handled message forwards its state
// 4. **Failure Isolation**: One bad message never affects the next one
// 5. **Memory-Only State**: The known set is rebuilt from zero on every start

pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod state;
pub mod traits;
pub mod translate;

// Re-export core types for convenience
pub use config::{BlockKind, HandledTypes, RelayConfig};
pub use error::{Error, PublishError, Result};
pub use message::InboundMessage;
pub use relay::{Relay, RelayEvent, RelayOutcome};
pub use state::KnownSet;
pub use traits::{InboundPayload, MessageSource, Publisher};
pub use translate::{EntityIdentity, Translation, Translator};
