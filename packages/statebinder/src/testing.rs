//! Testing utilities for stores and the code built on them.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! statebinder = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use statebinder::testing::{assert_events, EventRecorder};
//! use statebinder::EventKind;
//!
//! let recorder = EventRecorder::new();
//! recorder.attach_to(&store, &[EventKind::BeforeCommit, EventKind::Set, EventKind::Commit]);
//!
//! store.commit("increment", args![1])?;
//!
//! assert_events!(recorder, [BeforeCommit, Set, Commit]);
//! ```

use std::sync::{Arc, Mutex};

use crate::event::{EventKind, StoreEvent};
use crate::listener::Listener;
use crate::store::{lock, Store};

/// Asserts the kinds recorded by an [`EventRecorder`], in order.
///
/// Kinds are written as bare [`EventKind`] variant names.
#[macro_export]
macro_rules! assert_events {
    ($recorder:expr, [$($kind:ident),* $(,)?]) => {
        assert_eq!(
            $recorder.kinds(),
            vec![$($crate::EventKind::$kind),*],
            "unexpected event sequence"
        );
    };
}

pub use crate::assert_events;

/// One recorded event and the namespace of the node it was emitted for.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub origin: Option<String>,
    pub event: StoreEvent,
}

/// A listener that keeps every event it sees.
///
/// The same underlying [`Listener`] handle is registered for every kind, so
/// attaching twice to one store records each event once.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
    listener: Listener,
}

impl EventRecorder {
    pub fn new() -> Self {
        let events: Arc<Mutex<Vec<RecordedEvent>>> = Arc::default();
        let sink = events.clone();
        let listener = Listener::new(move |origin, event| {
            lock(&sink).push(RecordedEvent {
                origin: origin.namespace().map(str::to_string),
                event: event.clone(),
            });
        });
        Self { events, listener }
    }

    /// Record every kind of event emitted in `store`'s tree.
    ///
    /// The `addlistener` events of attaching are recorded too, except the
    /// ones emitted before the recorder's own `addlistener` registration.
    pub fn attach(&self, store: &Store) -> &Self {
        self.attach_to(store, &EventKind::ALL)
    }

    /// Record only the given kinds.
    pub fn attach_to(&self, store: &Store, kinds: &[EventKind]) -> &Self {
        for kind in kinds {
            store.on(*kind, self.listener.clone());
        }
        self
    }

    /// Stop recording the given kinds.
    pub fn detach_from(&self, store: &Store, kinds: &[EventKind]) {
        for kind in kinds {
            store.off(*kind, &self.listener);
        }
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        lock(&self.events).iter().map(|r| r.event.kind()).collect()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<StoreEvent> {
        lock(&self.events)
            .iter()
            .filter(|r| r.event.kind() == kind)
            .map(|r| r.event.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}
