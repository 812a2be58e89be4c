//! Lifecycle events emitted by a store tree.
//!
//! Every event is emitted on the tree root: synchronous [`Listener`]s run
//! first, in registration order, then the event is published on the root's
//! [`EventBus`](crate::EventBus) for asynchronous observers.
//!
//! | Kind               | Emitted when                                   |
//! |--------------------|------------------------------------------------|
//! | `set`              | a state key is written inside an open gate     |
//! | `delete`           | a state key is deleted inside an open gate     |
//! | `beforecommit`     | a mutation is about to run                     |
//! | `commit`           | a mutation finished successfully               |
//! | `beforedispatch`   | an action is about to start                    |
//! | `dispatch`         | an action's result resolved successfully       |
//! | `getter`           | a getter was evaluated                         |
//! | `addlistener`      | a listener was added                           |
//! | `removelistener`   | a listener was removed                         |
//! | `plugin`           | a plugin was installed                         |
//! | `registerModule`   | a module joined the tree                       |
//! | `unregisterModule` | a module left the tree                         |

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::listener::{Listener, Plugin};
use crate::module::ModuleDef;
use crate::store::Store;
use crate::Args;

/// The kind of a [`StoreEvent`], used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Set,
    Delete,
    BeforeCommit,
    Commit,
    BeforeDispatch,
    Dispatch,
    Getter,
    AddListener,
    RemoveListener,
    Plugin,
    RegisterModule,
    UnregisterModule,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 12] = [
        EventKind::Set,
        EventKind::Delete,
        EventKind::BeforeCommit,
        EventKind::Commit,
        EventKind::BeforeDispatch,
        EventKind::Dispatch,
        EventKind::Getter,
        EventKind::AddListener,
        EventKind::RemoveListener,
        EventKind::Plugin,
        EventKind::RegisterModule,
        EventKind::UnregisterModule,
    ];

    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Set => "set",
            EventKind::Delete => "delete",
            EventKind::BeforeCommit => "beforecommit",
            EventKind::Commit => "commit",
            EventKind::BeforeDispatch => "beforedispatch",
            EventKind::Dispatch => "dispatch",
            EventKind::Getter => "getter",
            EventKind::AddListener => "addlistener",
            EventKind::RemoveListener => "removelistener",
            EventKind::Plugin => "plugin",
            EventKind::RegisterModule => "registerModule",
            EventKind::UnregisterModule => "unregisterModule",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = StoreError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| StoreError::EventNotFound {
                name: name.to_string(),
            })
    }
}

/// Identifies one `dispatch` call.
///
/// `BeforeDispatch` and `Dispatch` of the same call carry the same id, which
/// pairs them up when several dispatches overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchId(Uuid);

impl DispatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event emitted by a store tree.
///
/// Property and getter names are qualified with the emitting node's namespace
/// (`cart.items`); mutation and action names are reported exactly as passed to
/// `commit`/`dispatch`.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Set {
        prop: String,
        value: Value,
        old: Option<Value>,
    },
    Delete {
        prop: String,
        old: Option<Value>,
    },
    BeforeCommit {
        name: String,
        args: Args,
    },
    Commit {
        name: String,
        args: Args,
    },
    BeforeDispatch {
        id: DispatchId,
        name: String,
        args: Args,
    },
    Dispatch {
        id: DispatchId,
        name: String,
        args: Args,
    },
    Getter {
        name: String,
        value: Value,
    },
    AddListener {
        kind: EventKind,
        listener: Listener,
    },
    RemoveListener {
        kind: EventKind,
        listener: Listener,
    },
    Plugin {
        plugin: Plugin,
        options: Args,
    },
    /// `def` is the definition the module was built from, nested modules
    /// included.
    RegisterModule {
        namespace: String,
        def: ModuleDef,
        module: Store,
    },
    UnregisterModule {
        namespace: String,
        module: Store,
    },
}

impl StoreEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StoreEvent::Set { .. } => EventKind::Set,
            StoreEvent::Delete { .. } => EventKind::Delete,
            StoreEvent::BeforeCommit { .. } => EventKind::BeforeCommit,
            StoreEvent::Commit { .. } => EventKind::Commit,
            StoreEvent::BeforeDispatch { .. } => EventKind::BeforeDispatch,
            StoreEvent::Dispatch { .. } => EventKind::Dispatch,
            StoreEvent::Getter { .. } => EventKind::Getter,
            StoreEvent::AddListener { .. } => EventKind::AddListener,
            StoreEvent::RemoveListener { .. } => EventKind::RemoveListener,
            StoreEvent::Plugin { .. } => EventKind::Plugin,
            StoreEvent::RegisterModule { .. } => EventKind::RegisterModule,
            StoreEvent::UnregisterModule { .. } => EventKind::UnregisterModule,
        }
    }
}
