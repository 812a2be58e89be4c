//! # Statebinder
//!
//! A namespaced, reactive state store: state is read freely, changed only by
//! named mutations, and every change is observable.
//!
//! ## Core Concepts
//!
//! - [`State`] = the guarded accessor over a node's data
//! - **Mutations** = synchronous functions, the only code allowed to write state
//! - **Actions** = asynchronous functions that commit mutations
//! - [`Getters`] = derived values computed from state on every read
//! - **Modules** = nested stores addressed by dotted namespaces (`cart.items`)
//!
//! ## Architecture
//!
//! ```text
//! dispatch("cart.checkout") ──► resolve "cart" ──► action(ctx, args) ─┐
//!                                                                      │ await
//! commit("cart.add") ◄───────────────────────────────────────────────┘
//!     │
//!     ▼ resolve "cart" in root registry
//! gate open ──► mutation(&State, args) ──► State::set ──► emit(set)
//!     │
//!     ▼
//! gate closed ──► emit(commit) ──► listeners ──► EventBus
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Writes only inside commits** - a node's gate is closed at rest, and
//!    [`State::set`] fails with [`StoreError::StateFrozen`] outside a mutation
//! 2. **Reads are read-only** - values come back sealed as [`Frozen`] trees
//!    with no mutating API
//! 3. **One registry per tree** - module namespaces are unique and resolved
//!    against the root
//! 4. **Gate restoration on every exit** - errors and panics inside a mutation
//!    never leave the gate open
//!
//! ## Example
//!
//! ```ignore
//! use statebinder::{args, EventKind, Listener, ModuleDef, Store};
//! use serde_json::json;
//!
//! let todos = ModuleDef::new()
//!     .state_fn(|| json!({ "items": [] }))
//!     .mutation("add", |state, args| {
//!         let mut items = state.get_value("items").unwrap_or_else(|| json!([]));
//!         if let (Some(list), Some(item)) = (items.as_array_mut(), args.first()) {
//!             list.push(item.clone());
//!         }
//!         state.set("items", items)?;
//!         Ok(())
//!     })
//!     .getter("count", |state, _, _, _| {
//!         json!(state.get("items").map_or(0, |items| items.to_value().as_array().map_or(0, Vec::len)))
//!     });
//!
//! let store = Store::new(ModuleDef::new().module("todos", todos))?;
//! store.on(EventKind::Set, Listener::new(|_, event| println!("{event:?}")));
//!
//! store.commit("todos.add", args!["write docs"])?;
//! assert_eq!(store.getters().get("todos.count"), Some(json!(1)));
//! ```

// Core modules
mod action;
mod bus;
mod error;
mod event;
mod frozen;
mod gate;
mod getters;
mod listener;
mod module;
mod state;
mod store;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export store types
pub use module::{ModuleDef, StoreOptions};
pub use store::Store;

// Re-export state types
pub use frozen::{Frozen, MAX_STATE_DEPTH};
pub use getters::Getters;
pub use state::{State, StateEntry};

// Re-export action types
pub use action::Action;

// Re-export event types
pub use bus::{EventBus, EventEnvelope, DEFAULT_BUS_CAPACITY};
pub use event::{DispatchId, EventKind, StoreEvent};
pub use listener::{Listener, Plugin, Subscription};

// Re-export error types
pub use error::StoreError;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use serde_json;

/// Arguments passed to mutations, actions and plugins.
pub type Args = Vec<serde_json::Value>;

/// Build an [`Args`] list from JSON-convertible expressions.
///
/// ```ignore
/// store.commit("todos.add", args!["write docs", { "done": false }])?;
/// store.commit("reset", args![])?;
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($arg:tt),+ $(,)?) => {
        vec![$($crate::serde_json::json!($arg)),+]
    };
}
