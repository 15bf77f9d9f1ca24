//! Decoupled event bus for engine lifecycle notifications.
//!
//! Engines emit events via [`EventBus::emit`] and observers subscribe via
//! [`EventBus::subscribe`]. Built on [`tokio::sync::broadcast`] so
//! multiple listeners can react independently.

use std::net::SocketAddr;

use tokio::sync::broadcast;

use crate::engine::EngineState;

/// Events that flow out of an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The engine moved to a new lifecycle state.
    StateChanged { state: EngineState },
    /// A socket engine is accepting connections on this address.
    Listening { addr: SocketAddr },
    /// A peer joined the load-balanced peer set (carries its descriptor).
    PeerRegistered { peer: String },
    /// A peer left the peer set.
    PeerDeregistered { peer: String },
}

/// A broadcast channel that any component can emit to or subscribe from.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
