// # Relay State
//
// Memory-resident state owned by the relay. Nothing here is persisted.

pub mod known;

pub use known::KnownSet;
