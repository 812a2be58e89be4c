//! Listeners and plugins - observe and extend a store tree.
//!
//! # Roles
//!
//! | Role     | Purpose                     | Runs                         |
//! |----------|-----------------------------|------------------------------|
//! | Listener | Observe one kind of event   | Synchronously, on every emit |
//! | Plugin   | Extend a store on install   | Once per tree                |
//!
//! Both are identified by pointer: registering a clone of the same
//! `Listener` twice is a no-op, and `off` removes exactly the handle that was
//! passed to `on`. Keep the handle (or the returned [`Subscription`]) to
//! unregister later.
//!
//! # Example
//!
//! ```ignore
//! use statebinder::{EventKind, Listener, StoreEvent};
//!
//! let log = Listener::new(|_store, event| {
//!     if let StoreEvent::Set { prop, value, .. } = event {
//!         tracing::info!(%prop, %value, "state changed");
//!     }
//! });
//!
//! let subscription = store.on(EventKind::Set, log);
//! store.commit("increment", args![1])?;
//! subscription.unsubscribe();
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::event::{EventKind, StoreEvent};
use crate::store::{lock, Store};

// =============================================================================
// Listener
// =============================================================================

type ListenerFn = dyn Fn(&Store, &StoreEvent) + Send + Sync;

/// A synchronous event callback.
///
/// Receives the node the triggering operation was called on and the event.
/// Listeners must not panic; a panic propagates out of the operation that
/// emitted the event.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Store, &StoreEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub(crate) fn call(&self, origin: &Store, event: &StoreEvent) {
        (self.0)(origin, event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

// =============================================================================
// Plugin
// =============================================================================

type PluginFn = dyn Fn(&Store, &[Value]) -> anyhow::Result<()> + Send + Sync;

/// A store extension, installed at most once per tree.
///
/// Called with the node `use_plugin` was called on and the options passed
/// alongside. Plugins typically register listeners or modules.
#[derive(Clone)]
pub struct Plugin(Arc<PluginFn>);

impl Plugin {
    pub fn new<F>(install: F) -> Self
    where
        F: Fn(&Store, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(install))
    }

    pub(crate) fn install(&self, store: &Store, options: &[Value]) -> anyhow::Result<()> {
        (self.0)(store, options)
    }
}

impl PartialEq for Plugin {
    fn eq(&self, other: &Plugin) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Plugin {}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plugin({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle returned by [`Store::on`]; removes the listener when asked.
///
/// Dropping a subscription does not unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    store: Store,
    kind: EventKind,
    listener: Listener,
}

impl Subscription {
    pub(crate) fn new(store: Store, kind: EventKind, listener: Listener) -> Self {
        Self {
            store,
            kind,
            listener,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Remove the listener. Safe to call after it was already removed.
    pub fn unsubscribe(&self) {
        self.store.off(self.kind, &self.listener);
    }
}

// =============================================================================
// Registries
// =============================================================================

/// Listener lists per event kind, owned by a tree root.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<BTreeMap<EventKind, Vec<Listener>>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Returns false if this handle is already registered.
    pub(crate) fn add(&self, kind: EventKind, listener: Listener) -> bool {
        let mut listeners = lock(&self.listeners);
        let list = listeners.entry(kind).or_default();
        if list.contains(&listener) {
            return false;
        }
        list.push(listener);
        true
    }

    /// Remove a listener. Returns false if it was not registered.
    pub(crate) fn remove(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = lock(&self.listeners);
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        match list.iter().position(|l| l == listener) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Copy out the listeners for a kind, so callbacks run without the lock.
    pub(crate) fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        lock(&self.listeners)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn len(&self, kind: EventKind) -> usize {
        lock(&self.listeners).get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = lock(&self.listeners);
        let count: usize = listeners.values().map(Vec::len).sum();
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &count)
            .finish()
    }
}

/// Installed plugins, owned by a tree root.
#[derive(Debug, Default)]
pub(crate) struct PluginRegistry {
    plugins: Mutex<Vec<Plugin>>,
}

impl PluginRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, plugin: &Plugin) -> bool {
        lock(&self.plugins).contains(plugin)
    }

    /// Record a plugin. Returns false if it was already recorded.
    pub(crate) fn record(&self, plugin: Plugin) -> bool {
        let mut plugins = lock(&self.plugins);
        if plugins.contains(&plugin) {
            return false;
        }
        plugins.push(plugin);
        true
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.plugins).len()
    }
}
