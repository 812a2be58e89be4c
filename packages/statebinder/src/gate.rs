//! Per-node write gate.
//!
//! A node's state is frozen at rest. Commits, the synchronous prefix of a
//! dispatch, and module (un)registration open the gate through a
//! [`GateGuard`]. The gate counts open guards and is frozen only when none
//! are left, so nested openings, guards dropped out of order by commits on
//! other threads, and panicking mutations all leave it frozen once every
//! guard is gone.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

/// The write gate of one store node.
#[derive(Debug)]
pub(crate) struct Gate {
    open: AtomicUsize,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            open: AtomicUsize::new(0),
        }
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.open.load(Ordering::Acquire) == 0
    }

    /// Open the gate until the returned guard is dropped.
    pub(crate) fn open(&self) -> GateGuard<'_> {
        let already_open = self.open.fetch_add(1, Ordering::AcqRel);
        if already_open > 0 {
            trace!(open_guards = already_open + 1, "write gate already open, nesting");
        }
        GateGuard { gate: self }
    }
}

/// RAII guard that keeps a gate open.
///
/// Releases its hold on drop, including during unwinding.
pub(crate) struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.open.fetch_sub(1, Ordering::AcqRel);
    }
}
