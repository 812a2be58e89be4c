//! Lazily evaluated, read-only derived values.

use std::fmt;

use serde_json::Value;
use tracing::trace;

use crate::event::StoreEvent;
use crate::store::Store;

/// Getter accessor of one store node.
///
/// Names resolve like commit names: `"total"` is this node's getter,
/// `"cart.total"` is the `total` getter of the `cart` module, looked up from
/// the tree root. Every successful read runs the getter again; nothing is
/// cached.
#[derive(Clone)]
pub struct Getters {
    node: Store,
}

impl Getters {
    pub(crate) fn new(node: Store) -> Self {
        Self { node }
    }

    /// Evaluate a getter. `None` when the name does not resolve.
    pub fn get(&self, name: &str) -> Option<Value> {
        let (owner, key) = match self.node.resolve(name) {
            Ok(resolved) => resolved,
            Err(error) => {
                trace!(getter = name, %error, "getter module not found");
                return None;
            }
        };
        let Some(getter) = owner.inner.getters.get(key).cloned() else {
            trace!(getter = name, "getter not found");
            return None;
        };

        let root = owner.root();
        let value = getter(
            &owner.state(),
            &owner.getters(),
            &root.state(),
            &root.getters(),
        );

        self.node.emit(StoreEvent::Getter {
            name: self.node.qualify(name),
            value: value.clone(),
        });
        Some(value)
    }

    /// Whether `name` resolves to a registered getter.
    pub fn contains(&self, name: &str) -> bool {
        self.node
            .resolve(name)
            .is_ok_and(|(owner, key)| owner.inner.getters.contains_key(key))
    }

    /// Names of this node's own getters, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.node.inner.getters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Getters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Getters")
            .field("namespace", &self.node.namespace())
            .field("names", &self.names())
            .finish()
    }
}
