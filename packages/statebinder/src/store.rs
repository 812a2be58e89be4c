//! Store nodes - the addressable units of a store tree.
//!
//! ```text
//!                         ┌──────────────── root ────────────────┐
//!                         │ modules: "cart" → ●  "cart.items" → ●│
//!                         │ listeners · plugins · event bus      │
//!                         └──────────────────────────────────────┘
//!   commit("cart.items.add")        ▲ weak               ▲ weak
//!     │ resolve "cart.items"   ┌────┴────┐          ┌────┴────┐
//!     └──────────────────────► │  cart   │ children │  items  │
//!                              │ (node)  ├─────────►│ (node)  │
//!                              └─────────┘          └─────────┘
//! ```
//!
//! Every node owns its state slots, mutations, actions and getters. The root
//! additionally owns the flattened module registry, listeners, plugins and the
//! broadcast bus; other nodes reach them through a weak back-reference.
//!
//! # Naming
//!
//! - `commit`, `dispatch` and getter names with a dot are split on the last
//!   dot; the prefix is looked up in the root registry as an absolute path
//! - `register_module`, `unregister_module` and `module` qualify the given
//!   namespace with the calling node's namespace first

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::action::ActionFn;
use crate::bus::{EventBus, EventEnvelope};
use crate::error::StoreError;
use crate::event::{DispatchId, EventKind, StoreEvent};
use crate::gate::Gate;
use crate::getters::Getters;
use crate::listener::{Listener, ListenerRegistry, Plugin, PluginRegistry, Subscription};
use crate::module::{GetterFn, ModuleDef, MutationFn};
use crate::state::{Slot, State};
use crate::Args;

/// Lock a mutex, recovering the guard if a panicking callback poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("store mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

// =============================================================================
// Tree Registry
// =============================================================================

/// Tree-wide registries, owned by the root only.
struct TreeRegistry {
    modules: DashMap<String, Store>,
    listeners: ListenerRegistry,
    plugins: PluginRegistry,
    bus: EventBus,
}

impl TreeRegistry {
    fn new(bus_capacity: usize) -> Self {
        Self {
            modules: DashMap::new(),
            listeners: ListenerRegistry::new(),
            plugins: PluginRegistry::new(),
            bus: EventBus::with_capacity(bus_capacity),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

pub(crate) struct StoreInner {
    namespace: Option<String>,
    root: Option<Weak<StoreInner>>,
    /// Node whose state mirrors this one, and the key it is mirrored under.
    mirror: Option<(Weak<StoreInner>, String)>,
    pub(crate) should_freeze: bool,
    pub(crate) gate: Gate,
    pub(crate) slots: Mutex<BTreeMap<String, Slot>>,
    mutations: HashMap<String, MutationFn>,
    actions: HashMap<String, ActionFn>,
    pub(crate) getters: HashMap<String, GetterFn>,
    children: Mutex<BTreeMap<String, Store>>,
    tree: Option<TreeRegistry>,
}

impl StoreInner {
    fn build(
        def: ModuleDef,
        namespace: Option<String>,
        root: Option<Weak<StoreInner>>,
        mirror: Option<(Weak<StoreInner>, String)>,
        tree: Option<TreeRegistry>,
    ) -> Result<Self, StoreError> {
        let should_freeze = def.options.should_freeze;
        let slots = Slot::from_initial(def.initial_state(), should_freeze)?;
        Ok(Self {
            namespace,
            root,
            mirror,
            should_freeze,
            gate: Gate::new(),
            slots: Mutex::new(slots),
            mutations: def.mutations,
            actions: def.actions,
            getters: def.getters,
            children: Mutex::new(BTreeMap::new()),
            tree,
        })
    }
}

/// A store node: the root of a tree or one of its modules.
///
/// Cheap to clone; clones are handles to the same node.
///
/// # Example
///
/// ```ignore
/// use statebinder::{args, ModuleDef, Store};
/// use serde_json::json;
///
/// let store = Store::new(
///     ModuleDef::new()
///         .state(json!({ "count": 0 }))
///         .mutation("increment", |state, args| {
///             let by = args.first().and_then(|v| v.as_i64()).unwrap_or(1);
///             state.set("count", state.get_i64("count").unwrap_or(0) + by)?;
///             Ok(())
///         }),
/// )?;
///
/// store.commit("increment", args![2])?;
/// assert_eq!(store.state().get_i64("count"), Some(2));
/// ```
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Build a root store, registering every module nested in `def`.
    pub fn new(mut def: ModuleDef) -> Result<Store, StoreError> {
        let modules = std::mem::take(&mut def.modules);
        let tree = TreeRegistry::new(def.options.bus_capacity);
        let inner = StoreInner::build(def, None, None, None, Some(tree))?;
        let store = Store {
            inner: Arc::new(inner),
        };

        for (namespace, module) in modules {
            store.register_module(&namespace, module)?;
        }
        debug!(modules = store.modules().len(), "store created");
        Ok(store)
    }

    /// Guarded accessor over this node's state.
    pub fn state(&self) -> State {
        State::new(self.clone())
    }

    /// Getter accessor, resolving names relative to this node.
    pub fn getters(&self) -> Getters {
        Getters::new(self.clone())
    }

    /// Full dotted namespace; `None` for the root.
    pub fn namespace(&self) -> Option<&str> {
        self.inner.namespace.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.inner.tree.is_some()
    }

    /// The tree root.
    ///
    /// A module whose root was dropped returns itself; tree-wide operations on
    /// it then fail with [`StoreError::Detached`] or find nothing.
    pub fn root(&self) -> Store {
        self.inner
            .root
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Store { inner })
            .unwrap_or_else(|| self.clone())
    }

    /// Whether this node's write gate is closed.
    pub fn is_frozen(&self) -> bool {
        self.inner.gate.is_frozen()
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Look up a registered module, relative to this node.
    pub fn module(&self, namespace: &str) -> Option<Store> {
        self.root().registered(&self.qualify(namespace))
    }

    /// Every registered namespace in the tree, sorted.
    pub fn modules(&self) -> Vec<String> {
        let root = self.root();
        let Some(tree) = root.inner.tree.as_ref() else {
            return Vec::new();
        };
        let mut namespaces: Vec<String> = tree.modules.iter().map(|e| e.key().clone()).collect();
        namespaces.sort();
        namespaces
    }

    /// Receive every event emitted in this tree from now on.
    ///
    /// `None` if the node is detached from its root.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<EventEnvelope>> {
        let root = self.root();
        root.inner.tree.as_ref().map(|tree| tree.bus.subscribe())
    }

    /// Run a mutation.
    ///
    /// The owning node's gate is open for the duration of the mutation and
    /// closed again on every exit path.
    pub fn commit(&self, name: &str, args: Args) -> Result<(), StoreError> {
        let (owner, key) = self.resolve(name)?;
        let Some(mutation) = owner.inner.mutations.get(key).cloned() else {
            return Err(StoreError::MutationNotFound {
                name: key.to_string(),
            });
        };

        let _open = owner.inner.gate.open();
        self.emit(StoreEvent::BeforeCommit {
            name: name.to_string(),
            args: args.clone(),
        });
        mutation(&owner.state(), &args).map_err(|source| StoreError::MutationFailed {
            name: name.to_string(),
            source,
        })?;
        self.emit(StoreEvent::Commit {
            name: name.to_string(),
            args,
        });

        debug!(mutation = name, namespace = ?self.namespace(), "committed");
        Ok(())
    }

    /// Run an action and wait for its result.
    ///
    /// The owning node's gate is open only while the action is called, not
    /// while its future is awaited; writes after an await go through `commit`.
    pub async fn dispatch(&self, name: &str, args: Args) -> Result<Value, StoreError> {
        let (owner, key) = self.resolve(name)?;
        let Some(action) = owner.inner.actions.get(key).cloned() else {
            return Err(StoreError::ActionNotFound {
                name: key.to_string(),
            });
        };

        let id = DispatchId::new();
        let pending = {
            let _open = owner.inner.gate.open();
            self.emit(StoreEvent::BeforeDispatch {
                id,
                name: name.to_string(),
                args: args.clone(),
            });
            action(owner.clone(), args.clone())
        };

        let value = pending.await.map_err(|source| StoreError::ActionFailed {
            name: name.to_string(),
            source,
        })?;
        self.emit(StoreEvent::Dispatch {
            id,
            name: name.to_string(),
            args,
        });

        debug!(action = name, dispatch_id = %id, namespace = ?self.namespace(), "dispatched");
        Ok(value)
    }

    /// Register a listener for one kind of event on the whole tree.
    ///
    /// Registering the same handle twice for the same kind is a no-op.
    pub fn on(&self, kind: EventKind, listener: Listener) -> Subscription {
        let root = self.root();
        match root.inner.tree.as_ref() {
            Some(tree) => {
                if tree.listeners.add(kind, listener.clone()) {
                    trace!(%kind, listeners = tree.listeners.len(kind), "listener added");
                    self.emit(StoreEvent::AddListener {
                        kind,
                        listener: listener.clone(),
                    });
                }
            }
            None => warn!(namespace = ?self.namespace(), %kind, "detached node, listener ignored"),
        }
        Subscription::new(self.clone(), kind, listener)
    }

    /// Remove a listener. Removing one that is not registered is a no-op.
    pub fn off(&self, kind: EventKind, listener: &Listener) {
        let root = self.root();
        let Some(tree) = root.inner.tree.as_ref() else {
            return;
        };
        if tree.listeners.remove(kind, listener) {
            self.emit(StoreEvent::RemoveListener {
                kind,
                listener: listener.clone(),
            });
        }
    }

    /// Install a plugin, at most once per tree.
    pub fn use_plugin(&self, plugin: Plugin, options: Args) -> Result<(), StoreError> {
        let root = self.root();
        let tree = root.inner.tree.as_ref().ok_or_else(|| self.detached())?;
        if tree.plugins.contains(&plugin) {
            trace!(?plugin, "plugin already installed");
            return Ok(());
        }

        plugin
            .install(self, &options)
            .map_err(|source| StoreError::PluginFailed { source })?;
        if !tree.plugins.record(plugin.clone()) {
            // The plugin installed itself again while running.
            return Ok(());
        }
        self.emit(StoreEvent::Plugin {
            plugin: plugin.clone(),
            options,
        });

        debug!(?plugin, plugins = tree.plugins.len(), "plugin installed");
        Ok(())
    }

    /// Register a module under `namespace`, relative to this node.
    ///
    /// Modules nested in `def` are registered beneath it.
    pub fn register_module(&self, namespace: &str, def: ModuleDef) -> Result<Store, StoreError> {
        let namespace = self.qualify(namespace);
        self.root().register_at_root(namespace, def, self)
    }

    /// Unregister a module and all of its children, relative to this node.
    ///
    /// Returns the removed node, or `None` if nothing was registered there.
    pub fn unregister_module(&self, namespace: &str) -> Option<Store> {
        let namespace = self.qualify(namespace);
        self.root().unregister_at_root(&namespace, self)
    }

    // -------------------------------------------------------------------------
    // Tree internals
    // -------------------------------------------------------------------------

    fn register_at_root(
        &self,
        namespace: String,
        mut def: ModuleDef,
        origin: &Store,
    ) -> Result<Store, StoreError> {
        let tree = self.inner.tree.as_ref().ok_or_else(|| origin.detached())?;
        if tree.modules.contains_key(&namespace) {
            return Err(StoreError::ModuleExists { namespace });
        }

        let (parent, key) = self.mirror_target(&namespace);
        let registered_def = def.clone();
        let nested = std::mem::take(&mut def.modules);
        let module = Store {
            inner: Arc::new(StoreInner::build(
                def,
                Some(namespace.clone()),
                Some(Arc::downgrade(&self.inner)),
                Some((Arc::downgrade(&parent.inner), key.clone())),
                None,
            )?),
        };

        {
            let _open = parent.inner.gate.open();
            match tree.modules.entry(namespace.clone()) {
                Entry::Occupied(_) => return Err(StoreError::ModuleExists { namespace }),
                Entry::Vacant(entry) => {
                    entry.insert(module.clone());
                }
            }
            lock(&parent.inner.children).insert(key.clone(), module.clone());
            lock(&parent.inner.slots).remove(&key);
        }

        origin.emit(StoreEvent::RegisterModule {
            namespace: namespace.clone(),
            def: registered_def,
            module: module.clone(),
        });
        debug!(%namespace, parent = ?parent.namespace(), %key, "module registered");

        for (child, child_def) in nested {
            if let Err(err) = module.register_module(&child, child_def) {
                warn!(%namespace, %child, error = %err, "nested registration failed, rolling back");
                self.unregister_at_root(&namespace, origin);
                return Err(err);
            }
        }
        Ok(module)
    }

    fn unregister_at_root(&self, namespace: &str, origin: &Store) -> Option<Store> {
        let tree = self.inner.tree.as_ref()?;
        let module = tree.modules.get(namespace).map(|entry| entry.value().clone())?;

        for (_, child) in module.children() {
            if let Some(child_namespace) = child.namespace() {
                self.unregister_at_root(child_namespace, origin);
            }
        }

        match module.mirror_parent() {
            Some((parent, key)) => {
                let _open = parent.inner.gate.open();
                tree.modules.remove(namespace);
                lock(&parent.inner.children).remove(&key);
            }
            None => {
                tree.modules.remove(namespace);
            }
        }

        origin.emit(StoreEvent::UnregisterModule {
            namespace: namespace.to_string(),
            module: module.clone(),
        });
        debug!(%namespace, "module unregistered");
        Some(module)
    }

    /// Where a new module's state is mirrored: under its leaf key in the
    /// module named by its prefix if that exists, else under the full
    /// namespace in the root.
    fn mirror_target(&self, namespace: &str) -> (Store, String) {
        if let Some((prefix, leaf)) = namespace.rsplit_once('.') {
            if let Some(parent) = self.registered(prefix) {
                return (parent, leaf.to_string());
            }
        }
        (self.clone(), namespace.to_string())
    }

    fn mirror_parent(&self) -> Option<(Store, String)> {
        let (parent, key) = self.inner.mirror.as_ref()?;
        let inner = parent.upgrade()?;
        Some((Store { inner }, key.clone()))
    }

    /// Look up a namespace in this node's registry (root only).
    fn registered(&self, namespace: &str) -> Option<Store> {
        let tree = self.inner.tree.as_ref()?;
        tree.modules.get(namespace).map(|entry| entry.value().clone())
    }

    /// Split a dotted name into its owning node and local key.
    pub(crate) fn resolve<'n>(&self, name: &'n str) -> Result<(Store, &'n str), StoreError> {
        let Some((path, key)) = name.rsplit_once('.') else {
            return Ok((self.clone(), name));
        };
        self.root()
            .registered(path)
            .map(|owner| (owner, key))
            .ok_or_else(|| StoreError::ModuleNotFound {
                namespace: path.to_string(),
            })
    }

    /// Prefix a key with this node's namespace.
    pub(crate) fn qualify(&self, key: &str) -> String {
        match self.namespace() {
            Some(namespace) => format!("{namespace}.{key}"),
            None => key.to_string(),
        }
    }

    pub(crate) fn child(&self, key: &str) -> Option<Store> {
        lock(&self.inner.children).get(key).cloned()
    }

    pub(crate) fn child_keys(&self) -> Vec<String> {
        lock(&self.inner.children).keys().cloned().collect()
    }

    pub(crate) fn children(&self) -> Vec<(String, Store)> {
        lock(&self.inner.children)
            .iter()
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect()
    }

    fn detached(&self) -> StoreError {
        StoreError::Detached {
            namespace: self.namespace().unwrap_or_default().to_string(),
        }
    }

    /// Run listeners for an event, then publish it on the bus.
    pub(crate) fn emit(&self, event: StoreEvent) {
        let root = self.root();
        let Some(tree) = root.inner.tree.as_ref() else {
            trace!(kind = %event.kind(), "detached node, event dropped");
            return;
        };

        let listeners = tree.listeners.snapshot(event.kind());
        trace!(kind = %event.kind(), namespace = ?self.namespace(), listeners = listeners.len(), "emit");
        for listener in listeners {
            listener.call(self, &event);
        }
        tree.bus.publish(EventEnvelope {
            origin: self.namespace().map(str::to_string),
            event,
        });
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("namespace", &self.namespace())
            .field("is_root", &self.is_root())
            .finish_non_exhaustive()
    }
}
