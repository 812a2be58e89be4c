//! Structured error type for store operations.
//!
//! `StoreError` provides pattern-matchable errors instead of generic `anyhow::Error`.
//!
//! # The Error Boundary Rule
//!
//! > **Handlers speak `anyhow`, the store speaks `StoreError`.**
//!
//! - Mutations, actions and plugins return `anyhow::Result` (ergonomic for user code)
//! - Every failure that leaves `commit`, `dispatch` or `use_plugin` is a `StoreError`,
//!   with the handler's error kept as `source`
//!
//! # Example
//!
//! ```ignore
//! use statebinder::{args, StoreError};
//!
//! match store.commit("todos.add", args!["write docs"]) {
//!     Ok(()) => {}
//!     Err(StoreError::ModuleNotFound { namespace }) => {
//!         eprintln!("no module registered at {namespace}");
//!     }
//!     Err(err) if err.is_lookup() => eprintln!("unknown name: {err}"),
//!     Err(err) => return Err(err.into()),
//! }
//! ```

use thiserror::Error;

/// Structured error type for store operations.
///
/// Each variant carries the name or key it is about, so callers can report
/// exactly what was missing or rejected.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No mutation with this name is registered on the owning node.
    #[error("the mutation \"{name}\" does not exist")]
    MutationNotFound {
        /// The local (unqualified) mutation name.
        name: String,
    },

    /// No action with this name is registered on the owning node.
    #[error("the action \"{name}\" does not exist")]
    ActionNotFound {
        /// The local (unqualified) action name.
        name: String,
    },

    /// The module path of a dotted name is not in the root registry.
    #[error("the module \"{namespace}\" does not exist")]
    ModuleNotFound {
        /// The missing module path.
        namespace: String,
    },

    /// An event kind name did not match any known kind.
    #[error("the event \"{name}\" does not exist")]
    EventNotFound {
        /// The name that failed to parse.
        name: String,
    },

    /// A write or delete was attempted while the node's gate was closed.
    #[error("state key \"{key}\" is frozen: commit a mutation to change the state")]
    StateFrozen {
        /// The qualified key that was written.
        key: String,
    },

    /// A write or delete targeted a key that mirrors a child module.
    #[error("state key \"{key}\" belongs to a module and cannot be written directly")]
    ModuleStateKey {
        /// The qualified key that was written.
        key: String,
    },

    /// A value nests deeper than the store accepts.
    #[error("state value nests deeper than {max} levels")]
    StateTooDeep {
        /// The maximum accepted depth.
        max: usize,
    },

    /// Initial state was not a mapping.
    #[error("initial state must be an object, found {found}")]
    InvalidState {
        /// The JSON type that was supplied instead.
        found: &'static str,
    },

    /// A module is already registered under this namespace.
    #[error("a module with the namespace \"{namespace}\" is already registered")]
    ModuleExists {
        /// The duplicate namespace.
        namespace: String,
    },

    /// The node's root has been dropped, so tree-wide registries are gone.
    #[error("store node \"{namespace}\" is detached from its root")]
    Detached {
        /// Namespace of the detached node.
        namespace: String,
    },

    /// A mutation body returned an error.
    #[error("mutation \"{name}\" failed: {source}")]
    MutationFailed {
        /// The name as passed to `commit`.
        name: String,
        /// The handler's error.
        source: anyhow::Error,
    },

    /// An action future resolved to an error.
    #[error("action \"{name}\" failed: {source}")]
    ActionFailed {
        /// The name as passed to `dispatch`.
        name: String,
        /// The handler's error.
        source: anyhow::Error,
    },

    /// A plugin returned an error while being installed.
    #[error("plugin failed to install: {source}")]
    PluginFailed {
        /// The plugin's error.
        source: anyhow::Error,
    },
}

impl StoreError {
    /// Returns true for the "referenced name does not exist" family.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            StoreError::MutationNotFound { .. }
                | StoreError::ActionNotFound { .. }
                | StoreError::ModuleNotFound { .. }
                | StoreError::EventNotFound { .. }
        )
    }

    /// Returns true if a handler (mutation, action or plugin) failed.
    pub fn is_handler_failure(&self) -> bool {
        matches!(
            self,
            StoreError::MutationFailed { .. }
                | StoreError::ActionFailed { .. }
                | StoreError::PluginFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_not_found_display() {
        let err = StoreError::MutationNotFound {
            name: "hello".into(),
        };
        assert_eq!(err.to_string(), "the mutation \"hello\" does not exist");
    }

    #[test]
    fn test_module_not_found_names_the_path() {
        let err = StoreError::ModuleNotFound {
            namespace: "my.nonexistent".into(),
        };
        assert!(err.to_string().contains("my.nonexistent"));
    }

    #[test]
    fn test_lookup_family() {
        let lookups = vec![
            StoreError::MutationNotFound { name: "a".into() },
            StoreError::ActionNotFound { name: "a".into() },
            StoreError::ModuleNotFound {
                namespace: "a".into(),
            },
            StoreError::EventNotFound { name: "a".into() },
        ];
        for err in lookups {
            assert!(err.is_lookup(), "{err} should be a lookup error");
            assert!(!err.is_handler_failure());
        }

        let frozen = StoreError::StateFrozen { key: "a".into() };
        assert!(!frozen.is_lookup());
    }

    #[test]
    fn test_handler_failure_keeps_source() {
        let err = StoreError::MutationFailed {
            name: "increment".into(),
            source: anyhow::anyhow!("overflow"),
        };
        assert!(err.is_handler_failure());
        assert!(err.to_string().contains("increment"));
        assert!(err.to_string().contains("overflow"));

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("overflow"));
    }

    #[test]
    fn test_error_can_be_downcast_from_anyhow() {
        let err: anyhow::Error = StoreError::ModuleExists {
            namespace: "cart".into(),
        }
        .into();

        match err.downcast_ref::<StoreError>() {
            Some(StoreError::ModuleExists { namespace }) => assert_eq!(namespace, "cart"),
            other => panic!("Expected ModuleExists, got {other:?}"),
        }
    }
}
