//! Lifetime state of a single reference-counted object.
//!
//! A [`TrackedObject`] is created by the first event seen for an address and
//! mutated by every later event for that address until its count drops to
//! zero or below.

mod ledger;

pub use ledger::{EventId, PointerLedger};

use crate::event::{Address, EventState, RefEvent};

/// How a history entry relates to the pointer slot it was logged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerStatus {
    /// No pointer slot recorded.
    Untracked,
    /// Reference held through a pointer slot.
    Held,
    /// Release through a slot with no matching acquire.
    BadPointer,
}

/// Location of a pointer slot inside another live object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Containment {
    /// Object containing the pointer slot.
    pub container: Address,
    /// Byte offset of the slot within `container`.
    pub offset: u64,
}

/// One retained event with the count it left behind.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The logged event.
    pub event: RefEvent,
    /// Running count after applying the event.
    pub count_after: i64,
    /// Pointer pairing result.
    pub pointer_status: PointerStatus,
    /// Set by offset resolution when the slot lies inside another object.
    pub indirect: Option<Containment>,
}

impl HistoryEntry {
    /// Whether this reference is held through another live object.
    pub fn is_indirect(&self) -> bool {
        self.indirect.is_some()
    }
}

/// Classification flags accumulated over an object's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectFlags {
    /// Count went negative, or the first event was a use-after-free.
    pub invalid: bool,
    /// History does not start with a constructor.
    pub skewed: bool,
}

/// Final lifecycle outcome of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Over-released or referenced after destruction.
    Invalid,
    /// Still referenced at end of log.
    Leaked,
    /// Still referenced at end of log, but only through other live objects.
    IndirectlyLeaked,
    /// Lifetime observed from the middle.
    Skewed,
    /// Constructed and released cleanly.
    Finalized,
}

/// Reference count state of one object.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    address: Address,
    declared_size: Option<u64>,
    running_count: i64,
    starting_count: i64,
    flags: ObjectFlags,
    /// Slab of entries; paired pointer acquires are taken out in place.
    history: Vec<Option<HistoryEntry>>,
    ledger: PointerLedger,
    seq: u64,
}

impl TrackedObject {
    /// Start tracking from the first event observed for an address.
    ///
    /// `seq` orders objects by first appearance.
    pub fn create(event: RefEvent, seq: u64) -> Self {
        let mut flags = ObjectFlags::default();
        let mut declared_size = None;
        let starting_count = match event.state {
            EventState::Constructor { size } => {
                declared_size = size.map(|s| s.total());
                1
            }
            EventState::Destructor => {
                flags.skewed = true;
                event.delta.saturating_neg()
            }
            EventState::Count(count) => {
                flags.skewed = true;
                i64::try_from(count).unwrap_or(i64::MAX)
            }
            EventState::Invalid => {
                flags.invalid = true;
                0
            }
        };

        let mut object = Self {
            address: event.address.clone(),
            declared_size,
            running_count: starting_count,
            starting_count,
            flags,
            history: Vec::new(),
            ledger: PointerLedger::new(),
            seq,
        };
        // A constructor's hold is already the starting count; an invalid
        // reference is to an object that is already gone.
        let apply_delta = !matches!(
            event.state,
            EventState::Constructor { .. } | EventState::Invalid
        );
        object.record(event, apply_delta);
        object
    }

    /// Apply a later event for the same address.
    pub fn apply(&mut self, event: RefEvent) {
        debug_assert_eq!(event.address, self.address);
        self.record(event, true);
    }

    fn record(&mut self, event: RefEvent, apply_delta: bool) {
        if apply_delta {
            self.running_count = self.running_count.saturating_add(event.delta);
        }
        if self.running_count < 0 {
            self.flags.invalid = true;
        }

        let pointer_status = match &event.pointer {
            None => PointerStatus::Untracked,
            Some(slot) if event.is_pointer_decrement() => {
                match self.ledger.resolve_decrement(slot) {
                    Some(matched) => {
                        self.history[matched] = None;
                        return;
                    }
                    None => PointerStatus::BadPointer,
                }
            }
            Some(slot) => {
                if event.is_pointer_increment() {
                    self.ledger.register_increment(slot, self.history.len());
                }
                PointerStatus::Held
            }
        };

        self.history.push(Some(HistoryEntry {
            event,
            count_after: self.running_count,
            pointer_status,
            indirect: None,
        }));
    }

    /// Whether the count has dropped to zero or below.
    pub fn is_finalized(&self) -> bool {
        self.running_count <= 0
    }

    /// Outcome for an object whose count reached zero during the log.
    pub fn finished_outcome(&self) -> Outcome {
        if self.flags.invalid {
            Outcome::Invalid
        } else if self.flags.skewed {
            Outcome::Skewed
        } else {
            Outcome::Finalized
        }
    }

    /// Outcome for an object still referenced at end of log.
    ///
    /// Offset resolution must already have run.
    pub fn live_outcome(&self) -> Outcome {
        if self.flags.invalid {
            Outcome::Invalid
        } else if self.flags.skewed {
            Outcome::Skewed
        } else if self.direct_count() == 0 && self.running_count > 0 {
            Outcome::IndirectlyLeaked
        } else {
            Outcome::Leaked
        }
    }

    /// Sum of retained deltas excluding references held through other objects.
    pub fn direct_count(&self) -> i64 {
        self.history()
            .filter(|entry| !entry.is_indirect())
            .map(|entry| entry.event.delta)
            .sum()
    }

    /// Retained events in log order.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().flatten()
    }

    /// Mutable view of retained events, for annotating pointer status.
    pub fn history_mut(&mut self) -> impl Iterator<Item = &mut HistoryEntry> {
        self.history.iter_mut().flatten()
    }

    /// Object address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Overhead plus user data, when constructed with a known size.
    pub fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    /// Current count.
    pub fn running_count(&self) -> i64 {
        self.running_count
    }

    /// Count the object was first observed with.
    pub fn starting_count(&self) -> i64 {
        self.starting_count
    }

    /// Accumulated flags.
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    /// Creation order.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Increments still held through pointer slots.
    pub fn open_pointer_refs(&self) -> usize {
        self.ledger.outstanding()
    }
}
