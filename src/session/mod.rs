//! Connection lifecycle and the streaming loop

pub mod lifecycle;
pub mod link;
pub mod sender;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use lifecycle::{BridgeSession, SessionConfig, SessionEnd, SessionReport};
