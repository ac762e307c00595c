//! Balancing pre-pass for large logs.
//!
//! Sums deltas per address and forgets an address whenever its sum returns
//! to zero. Only addresses left unbalanced at the end are analysed in the
//! real pass. Objects that are invalid or skewed but net to zero by
//! coincidence are missed; this is accepted in exchange for memory.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::AnalyzerError;
use crate::event::{parse_line, Address, LogFormat};

/// Result of the balancing pass.
#[derive(Debug)]
pub struct Balance {
    /// Addresses whose deltas do not net to zero.
    pub addresses: HashSet<Address>,
    /// Format settled on by the first accepted record, or `Auto` if none was.
    pub format: LogFormat,
}

/// Collect addresses whose deltas do not balance over the whole log.
///
/// Malformed lines are skipped silently; they are reported by the real pass.
pub fn unbalanced_addresses<R: BufRead>(
    reader: R,
    mut format: LogFormat,
    cancel: &AtomicBool,
) -> Result<Balance, AnalyzerError> {
    let mut sums: HashMap<Address, i64> = HashMap::new();
    let mut lines = 0usize;

    for (idx, bytes) in reader.split(b'\n').enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(AnalyzerError::Cancelled);
        }
        let bytes = bytes?;
        let line = String::from_utf8_lossy(&bytes);
        lines += 1;
        let line_format = format.settle(&line);
        let Ok(event) = parse_line(&line, idx + 1, line_format) else {
            continue;
        };
        format = line_format;

        match sums.get_mut(&event.address) {
            Some(sum) => {
                *sum = sum.saturating_add(event.delta);
                if *sum == 0 {
                    sums.remove(&event.address);
                }
            }
            None if event.delta != 0 => {
                sums.insert(event.address, event.delta);
            }
            None => {}
        }
    }

    debug!(lines, unbalanced = sums.len(), "preprocess pass complete");
    Ok(Balance {
        addresses: sums.into_keys().collect(),
        format,
    })
}
