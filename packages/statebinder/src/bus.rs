//! Broadcast bus for asynchronous store observers.
//!
//! # Delivery
//!
//! - Receivers see only events emitted after they subscribed
//! - Nothing is stored beyond the channel buffer
//! - A receiver that falls more than the capacity behind gets
//!   `RecvError::Lagged` and skips ahead
//!
//! Synchronous [`Listener`](crate::Listener)s see every event and run before
//! the bus publishes it. Use the bus when the observer lives in another task.

use tokio::sync::broadcast;

use crate::event::{EventKind, StoreEvent};

/// Buffered envelopes per tree before receivers lag.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A store event together with the namespace of the node it was emitted for.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Namespace of the node the operation was called on; `None` for the root.
    pub origin: Option<String>,
    pub event: StoreEvent,
}

impl EventEnvelope {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Broadcast channel owned by a tree root.
///
/// # Example
///
/// ```ignore
/// let mut receiver = store.subscribe().expect("root is alive");
///
/// store.commit("increment", args![1])?;
///
/// let first = receiver.recv().await?;
/// assert_eq!(first.kind(), EventKind::BeforeCommit);
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send to current receivers; returns how many there were.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.subscriber_count())
            .finish()
    }
}
