//! Store and module definitions.
//!
//! A [`ModuleDef`] is the configuration record a store node is built from:
//! initial state, mutations, actions, getters, nested modules and options.
//! The same definition builds the root (`Store::new`) and every module
//! (`register_module`), and can be reused to build several independent stores.
//!
//! # Example
//!
//! ```ignore
//! use statebinder::{ModuleDef, Store};
//! use serde_json::json;
//!
//! let counter = ModuleDef::new()
//!     .state_fn(|| json!({ "count": 0 }))
//!     .mutation("increment", |state, args| {
//!         let by = args.first().and_then(|v| v.as_i64()).unwrap_or(1);
//!         let count = state.get_i64("count").unwrap_or(0);
//!         state.set("count", count + by)?;
//!         Ok(())
//!     })
//!     .getter("double", |state, _, _, _| json!(state.get_i64("count").unwrap_or(0) * 2));
//!
//! let store = Store::new(ModuleDef::new().module("counter", counter))?;
//! store.commit("counter.increment", args![2])?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{self, Action, ActionFn};
use crate::bus::DEFAULT_BUS_CAPACITY;
use crate::getters::Getters;
use crate::state::State;
use crate::store::Store;
use crate::Args;

/// A mutation: the only code allowed to write state.
pub(crate) type MutationFn = Arc<dyn Fn(&State, &[Value]) -> anyhow::Result<()> + Send + Sync>;

/// A getter: `(state, getters, root_state, root_getters) -> value`.
pub(crate) type GetterFn = Arc<dyn Fn(&State, &Getters, &State, &Getters) -> Value + Send + Sync>;

// =============================================================================
// Options
// =============================================================================

/// Tunable store behaviour.
///
/// Deserializable so a host application can keep it in its own config files;
/// missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Seal values read from state so nested references are read-only.
    ///
    /// When false, reads return detached copies instead.
    pub should_freeze: bool,

    /// Capacity of the root's broadcast bus. Ignored for modules.
    pub bus_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            should_freeze: true,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

// =============================================================================
// Module Definition
// =============================================================================

#[derive(Clone)]
enum InitialState {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

/// Definition of a store node.
#[derive(Clone, Default)]
pub struct ModuleDef {
    state: Option<InitialState>,
    pub(crate) mutations: HashMap<String, MutationFn>,
    pub(crate) actions: HashMap<String, ActionFn>,
    pub(crate) getters: HashMap<String, GetterFn>,
    pub(crate) modules: Vec<(String, ModuleDef)>,
    pub(crate) options: StoreOptions,
}

impl ModuleDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial state. Must be an object (or null, meaning empty).
    ///
    /// Every store built from this definition starts from a copy.
    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(InitialState::Value(state));
        self
    }

    /// Initial state produced by a factory, called once per built node.
    pub fn state_fn<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.state = Some(InitialState::Factory(Arc::new(factory)));
        self
    }

    /// Register a mutation, replacing any previous one with the same name.
    pub fn mutation<F>(mut self, name: impl Into<String>, mutation: F) -> Self
    where
        F: Fn(&State, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.mutations.insert(name.into(), Arc::new(mutation));
        self
    }

    /// Register an action whose body is a future.
    ///
    /// Code in the closure before the returned future runs while the node's
    /// gate is open; code inside the future does not.
    pub fn action<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Store, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.actions.insert(name.into(), action::from_async(action));
        self
    }

    /// Register an action with a synchronous body.
    pub fn action_sync<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Store, Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), action::from_sync(action));
        self
    }

    /// Register an [`Action`] implementation.
    pub fn action_impl<A: Action>(mut self, name: impl Into<String>, action: A) -> Self {
        self.actions.insert(name.into(), action::from_impl(action));
        self
    }

    /// Register a getter.
    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&State, &Getters, &State, &Getters) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(name.into(), Arc::new(getter));
        self
    }

    /// Nest a module, registered relative to the node built from this definition.
    pub fn module(mut self, namespace: impl Into<String>, module: ModuleDef) -> Self {
        self.modules.push((namespace.into(), module));
        self
    }

    pub fn should_freeze(mut self, should_freeze: bool) -> Self {
        self.options.should_freeze = should_freeze;
        self
    }

    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Produce a fresh copy of the initial state.
    pub(crate) fn initial_state(&self) -> Value {
        match &self.state {
            Some(InitialState::Value(value)) => value.clone(),
            Some(InitialState::Factory(factory)) => factory(),
            None => Value::Null,
        }
    }
}

fn sorted_names<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("mutations", &sorted_names(&self.mutations))
            .field("actions", &sorted_names(&self.actions))
            .field("getters", &sorted_names(&self.getters))
            .field(
                "modules",
                &self.modules.iter().map(|(ns, _)| ns).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
