//! The state accessor: the only path into a node's data.
//!
//! [`State`] wraps one store node's top-level keys.
//!
//! - **Reads** return child-module state untouched, sealed [`Frozen`] values
//!   (freezing nodes) or detached copies (non-freezing nodes).
//! - **Writes and deletes** succeed only while the node's gate is open, i.e.
//!   inside a mutation, and emit `set`/`delete` events on the tree root.
//!
//! ```text
//!  commit("cart.add") ──► gate open ──► mutation(&State) ──► State::set ──► slot = Raw
//!                                                                  │
//!  State::get ◄── slot = Sealed ◄── seal (once) ◄──────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::event::StoreEvent;
use crate::frozen::{check_depth, Frozen};
use crate::store::{lock, Store};

// =============================================================================
// Slots
// =============================================================================

/// Storage for one top-level key.
#[derive(Debug)]
pub(crate) enum Slot {
    /// Written inside an open gate, not read since.
    Raw(Value),
    /// Sealed; handed out to readers as is.
    Sealed(Frozen),
}

impl Slot {
    /// Build the slots of a fresh node from its initial state.
    pub(crate) fn from_initial(
        state: Value,
        should_freeze: bool,
    ) -> Result<BTreeMap<String, Slot>, StoreError> {
        let map = match state {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidState {
                    found: json_type(&other),
                })
            }
        };

        map.into_iter()
            .map(|(key, value)| {
                check_depth(&value)?;
                let slot = if should_freeze {
                    Slot::Sealed(Frozen::seal(&value))
                } else {
                    Slot::Raw(value)
                };
                Ok((key, slot))
            })
            .collect()
    }

    /// Seal in place if still raw, then hand out the sealed tree.
    pub(crate) fn seal(&mut self) -> Frozen {
        match self {
            Slot::Sealed(frozen) => frozen.clone(),
            Slot::Raw(value) => {
                let frozen = Frozen::seal(value);
                *self = Slot::Sealed(frozen.clone());
                frozen
            }
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Slot::Raw(value) => value.clone(),
            Slot::Sealed(frozen) => frozen.to_value(),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Slot::Raw(value) => value,
            Slot::Sealed(frozen) => frozen.to_value(),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// State Entry
// =============================================================================

/// What a read of one state key produced.
#[derive(Debug, Clone)]
pub enum StateEntry {
    /// The key mirrors a child module; this is that module's own accessor.
    Module(State),
    /// A sealed value from a freezing node.
    Frozen(Frozen),
    /// A detached copy from a node built with `should_freeze(false)`.
    Raw(Value),
}

impl StateEntry {
    /// Copy the entry out as a plain value (module entries are snapshotted).
    pub fn to_value(&self) -> Value {
        match self {
            StateEntry::Module(state) => state.to_value(),
            StateEntry::Frozen(frozen) => frozen.to_value(),
            StateEntry::Raw(value) => value.clone(),
        }
    }

    pub fn as_frozen(&self) -> Option<&Frozen> {
        match self {
            StateEntry::Frozen(frozen) => Some(frozen),
            _ => None,
        }
    }

    pub fn into_frozen(self) -> Option<Frozen> {
        match self {
            StateEntry::Frozen(frozen) => Some(frozen),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&State> {
        match self {
            StateEntry::Module(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_module(&self) -> bool {
        matches!(self, StateEntry::Module(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateEntry::Frozen(frozen) => frozen.as_i64(),
            StateEntry::Raw(value) => value.as_i64(),
            StateEntry::Module(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateEntry::Frozen(frozen) => frozen.as_f64(),
            StateEntry::Raw(value) => value.as_f64(),
            StateEntry::Module(_) => None,
        }
    }
}

impl PartialEq<Value> for StateEntry {
    fn eq(&self, other: &Value) -> bool {
        match self {
            StateEntry::Frozen(frozen) => frozen == other,
            StateEntry::Raw(value) => value == other,
            StateEntry::Module(state) => &state.to_value() == other,
        }
    }
}

// =============================================================================
// State Accessor
// =============================================================================

/// Guarded accessor over one node's state.
///
/// Cheap to clone; all clones view the same node.
#[derive(Clone)]
pub struct State {
    node: Store,
}

impl State {
    pub(crate) fn new(node: Store) -> Self {
        Self { node }
    }

    /// The node this accessor belongs to.
    pub fn store(&self) -> &Store {
        &self.node
    }

    /// Read a top-level key.
    pub fn get(&self, key: &str) -> Option<StateEntry> {
        if let Some(child) = self.node.child(key) {
            return Some(StateEntry::Module(child.state()));
        }

        let mut slots = lock(&self.node.inner.slots);
        let slot = slots.get_mut(key)?;
        if self.node.inner.should_freeze {
            Some(StateEntry::Frozen(slot.seal()))
        } else {
            Some(StateEntry::Raw(slot.to_value()))
        }
    }

    /// Read a key as a plain value, `None` if absent.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.get(key).map(|entry| entry.to_value())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|entry| entry.as_i64())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.node.child(key).is_some() || lock(&self.node.inner.slots).contains_key(key)
    }

    /// Top-level keys, including mirrored modules, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.node.inner.slots).keys().cloned().collect();
        keys.extend(self.node.child_keys());
        keys.sort();
        keys.dedup();
        keys
    }

    /// Write a top-level key. Only succeeds inside an open gate.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        self.ensure_writable(key)?;
        let value = value.into();
        check_depth(&value)?;

        let old = lock(&self.node.inner.slots)
            .insert(key.to_string(), Slot::Raw(value.clone()))
            .map(Slot::into_value);

        self.node.emit(StoreEvent::Set {
            prop: self.node.qualify(key),
            value,
            old,
        });
        Ok(())
    }

    /// Delete a top-level key. Only succeeds inside an open gate.
    ///
    /// Deleting an absent key is not an error; the event reports `old: None`.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_writable(key)?;

        let old = lock(&self.node.inner.slots)
            .remove(key)
            .map(Slot::into_value);

        self.node.emit(StoreEvent::Delete {
            prop: self.node.qualify(key),
            old,
        });
        Ok(())
    }

    /// Detached snapshot of the whole node, child modules included.
    pub fn to_value(&self) -> Value {
        let mut map: Map<String, Value> = lock(&self.node.inner.slots)
            .iter()
            .map(|(key, slot)| (key.clone(), slot.to_value()))
            .collect();
        for (key, child) in self.node.children() {
            map.insert(key, child.state().to_value());
        }
        Value::Object(map)
    }

    fn ensure_writable(&self, key: &str) -> Result<(), StoreError> {
        if self.node.inner.gate.is_frozen() {
            return Err(StoreError::StateFrozen {
                key: self.node.qualify(key),
            });
        }
        if self.node.child(key).is_some() {
            return Err(StoreError::ModuleStateKey {
                key: self.node.qualify(key),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("namespace", &self.node.namespace())
            .field("keys", &self.keys())
            .finish()
    }
}
