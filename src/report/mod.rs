//! Grouped text report of classified objects.

mod exit;

pub use exit::{ExitStatus, EXIT_CANCELLED, EXIT_USAGE};

use std::io::{self, Write};

use crate::analysis::Buckets;
use crate::config::ReportFilter;
use crate::object::{HistoryEntry, Outcome, PointerStatus, TrackedObject};

/// Print order of the report buckets.
pub const BUCKET_ORDER: [Outcome; 5] = [
    Outcome::Invalid,
    Outcome::Leaked,
    Outcome::IndirectlyLeaked,
    Outcome::Skewed,
    Outcome::Finalized,
];

fn title(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Invalid => "Invalid objects",
        Outcome::Leaked => "Leaked objects",
        Outcome::IndirectlyLeaked => "Indirectly leaked objects",
        Outcome::Skewed => "Skewed objects",
        Outcome::Finalized => "Finalized objects",
    }
}

/// Write every shown, non-empty bucket to `writer`.
pub fn write_report<W: Write>(
    writer: &mut W,
    buckets: &Buckets,
    filter: &ReportFilter,
) -> io::Result<()> {
    for outcome in BUCKET_ORDER {
        let objects = buckets.get(outcome);
        if !filter.shows(outcome) || objects.is_empty() {
            continue;
        }
        writeln!(writer, "==== {} ({}) ====", title(outcome), objects.len())?;
        let leaked = matches!(outcome, Outcome::Leaked | Outcome::IndirectlyLeaked);
        for object in objects {
            write_object(writer, object, leaked)?;
        }
    }
    writer.flush()
}

/// Render the report into a string (useful for tests and snapshots).
pub fn render_report(buckets: &Buckets, filter: &ReportFilter) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_report(&mut buffer, buckets, filter);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn write_object<W: Write>(writer: &mut W, object: &TrackedObject, leaked: bool) -> io::Result<()> {
    write!(writer, "Object {} (", object.address())?;
    match object.declared_size() {
        Some(size) => write!(writer, "{size} bytes")?,
        None => write!(writer, "unknown size")?,
    }
    write!(writer, ") count {}", object.running_count())?;
    if leaked {
        write!(writer, " direct {}", object.direct_count())?;
    }
    writeln!(writer)?;

    for entry in object.history() {
        writeln!(writer, "  {}", format_entry(entry))?;
    }
    writeln!(writer)
}

/// One history line: `[thread] file:line function: delta tag - [state] pointer => count`.
pub fn format_entry(entry: &HistoryEntry) -> String {
    let event = &entry.event;
    let mut line = format!(
        "[{}] {}:{} {}: {:+} {} - [{}]",
        event.thread_id,
        event.source_file,
        event.source_line,
        event.function,
        event.delta,
        event.tag,
        event.state
    );

    if let Some(pointer) = &event.pointer {
        line.push(' ');
        if entry.pointer_status == PointerStatus::BadPointer {
            line.push_str("bad-pointer ");
        }
        match &entry.indirect {
            Some(containment) => line.push_str(&format!(
                "offset:{}[{}]",
                containment.container, containment.offset
            )),
            None => line.push_str(&format!("ptr:{pointer}")),
        }
    }

    line.push_str(&format!(" => {}", entry.count_after));
    line
}
