//! Detection of references held through fields embedded in other objects.
//!
//! A pointer slot whose address falls inside `[start, start + size)` of a
//! different live object means the reference is owned by that object rather
//! than by an independent holder.

use std::collections::BTreeMap;

use tracing::debug;

use crate::event::Address;
use crate::object::{Containment, TrackedObject};

/// Interval lookup over live objects with a known declared size.
#[derive(Debug, Default)]
pub struct OffsetIndex {
    by_start: BTreeMap<u64, Vec<(Address, u64)>>,
    widest: u64,
}

impl OffsetIndex {
    /// Index every object that has a known size and a hexadecimal address.
    pub fn build<'a>(objects: impl IntoIterator<Item = &'a TrackedObject>) -> Self {
        let mut index = Self::default();
        for object in objects {
            let (Some(start), Some(size)) = (object.address().as_u64(), object.declared_size())
            else {
                continue;
            };
            if size == 0 {
                continue;
            }
            index
                .by_start
                .entry(start)
                .or_default()
                .push((object.address().clone(), size));
            index.widest = index.widest.max(size);
        }
        index
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.by_start.values().map(Vec::len).sum()
    }

    /// Whether nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    /// Find an object other than `owner` whose range contains `pointer`.
    pub fn locate(&self, pointer: u64, owner: &Address) -> Option<Containment> {
        for (&start, candidates) in self.by_start.range(..=pointer).rev() {
            let offset = pointer - start;
            if offset >= self.widest {
                break;
            }
            let found = candidates
                .iter()
                .find(|(address, size)| address != owner && offset < *size);
            if let Some((container, _)) = found {
                return Some(Containment {
                    container: container.clone(),
                    offset,
                });
            }
        }
        None
    }
}

/// Annotate pointer-tagged history entries of `objects` that live inside
/// another object of the same set. Returns the number of entries marked.
pub fn resolve_offsets(objects: &mut [TrackedObject]) -> usize {
    let index = OffsetIndex::build(objects.iter());
    if index.is_empty() {
        return 0;
    }

    let mut marked = 0;
    for object in objects.iter_mut() {
        let owner = object.address().clone();
        for entry in object.history_mut() {
            let Some(pointer) = entry.event.pointer.as_ref().and_then(Address::as_u64) else {
                continue;
            };
            if let Some(containment) = index.locate(pointer, &owner) {
                debug!(
                    object = %owner,
                    container = %containment.container,
                    offset = containment.offset,
                    "reference held inside another object"
                );
                entry.indirect = Some(containment);
                marked += 1;
            }
        }
    }
    marked
}
