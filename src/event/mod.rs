//! Reference-count events as recorded in the debug log.
//!
//! Each line of the log describes a single change to one object's
//! reference count. This module holds the typed representation of those
//! lines; the text format lives in [`parser`].

mod parser;

pub use parser::{parse_line, LogFormat, ParseError};

use std::borrow::Borrow;
use std::fmt;

/// Opaque object identifier as it appears in the log.
///
/// Addresses are compared and hashed as strings. The only numeric view is
/// [`Address::as_u64`], which exists for range arithmetic when resolving
/// embedded pointers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Wrap a raw address token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The address exactly as logged.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the address as an unsigned hexadecimal integer.
    ///
    /// Returns `None` for tokens that are not hexadecimal.
    pub fn as_u64(&self) -> Option<u64> {
        let raw = self.0.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16).ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Allocation size carried by a constructor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationSize {
    /// Bytes of allocator bookkeeping preceding the user data.
    pub overhead: u64,
    /// Bytes requested by the caller.
    pub user_data: u64,
}

impl AllocationSize {
    /// Total footprint of the object.
    pub fn total(&self) -> u64 {
        self.overhead.saturating_add(self.user_data)
    }
}

/// What kind of record a log line is, decided once at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Object allocation. Older producers omit the size sub-fields.
    Constructor {
        /// Declared size when the producer recorded it.
        size: Option<AllocationSize>,
    },
    /// Object destruction.
    Destructor,
    /// Reference taken on an object that was already destroyed.
    Invalid,
    /// Reference count observed before this change.
    Count(u64),
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventState::Constructor { .. } => f.write_str("constructor"),
            EventState::Destructor => f.write_str("destructor"),
            EventState::Invalid => f.write_str("invalid"),
            EventState::Count(count) => write!(f, "{count}"),
        }
    }
}

/// A single parsed log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEvent {
    /// Object the event applies to.
    pub address: Address,
    /// Change applied to the reference count.
    pub delta: i64,
    /// Thread that performed the change.
    pub thread_id: String,
    /// Source file of the call site.
    pub source_file: String,
    /// Source line of the call site.
    pub source_line: String,
    /// Function containing the call site.
    pub function: String,
    /// Record kind.
    pub state: EventState,
    /// Address of the pointer variable that holds this reference, if tracked.
    pub pointer: Option<Address>,
    /// Free-form annotation.
    pub tag: String,
    /// 1-based line number in the input.
    pub line_no: usize,
}

impl RefEvent {
    /// Whether this event pushes a reference through a tracked pointer slot.
    pub fn is_pointer_increment(&self) -> bool {
        self.delta == 1 && self.pointer.is_some()
    }

    /// Whether this event releases a reference through a tracked pointer slot.
    pub fn is_pointer_decrement(&self) -> bool {
        self.delta == -1 && self.pointer.is_some()
    }

    /// Drop the pointer slot, treating the reference as untracked.
    pub fn without_pointer(mut self) -> Self {
        self.pointer = None;
        self
    }
}
