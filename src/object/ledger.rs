//! Per-object pointer slot bookkeeping.
//!
//! Pairs each pointer-tagged release with the most recent acquire recorded
//! through the same pointer variable, so balanced pointer churn can be
//! dropped from the history.

use std::collections::HashMap;

use crate::event::Address;

/// Index of an entry in a [`TrackedObject`](super::TrackedObject) history.
pub type EventId = usize;

/// Open increments keyed by the pointer slot that holds them.
#[derive(Debug, Default, Clone)]
pub struct PointerLedger {
    open: HashMap<Address, Vec<EventId>>,
}

impl PointerLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
        }
    }

    /// Record an increment held through `slot`.
    pub fn register_increment(&mut self, slot: &Address, event: EventId) {
        self.open.entry(slot.clone()).or_default().push(event);
    }

    /// Pop the most recent increment held through `slot`.
    ///
    /// `None` means the release has no matching acquire (a bad pointer).
    pub fn resolve_decrement(&mut self, slot: &Address) -> Option<EventId> {
        let held = self.open.get_mut(slot)?;
        let matched = held.pop();
        if held.is_empty() {
            self.open.remove(slot);
        }
        matched
    }

    /// Number of increments still held across all slots.
    pub fn outstanding(&self) -> usize {
        self.open.values().map(Vec::len).sum()
    }
}
