//! # refscan
//!
//! Reconstructs object lifetimes from a reference-count debug log and
//! reports objects that leaked, were over-released, or were observed from
//! the middle of their lifetime.
//!
//! ## Pipeline
//!
//! 1. **Parse**: each log line becomes a typed [`RefEvent`]
//! 2. **Track**: events mutate the [`TrackedObject`] for their address,
//!    pairing pointer-held acquires with their releases
//! 3. **Resolve**: at end of input, references held through fields of other
//!    live objects are marked indirect
//! 4. **Classify**: every object lands in exactly one [`Outcome`] bucket
//! 5. **Report**: buckets are printed and folded into an [`ExitStatus`]
//!
//! ## Usage Example
//!
//! ```
//! use refscan::{analyze_str, render_report, AnalyzerConfig, ExitStatus, ReportFilter};
//!
//! let log = "0x1000,1,1,chan.c,10,alloc,**constructor**40**20**,(nil),create\n";
//! let analysis = analyze_str(log, AnalyzerConfig::new());
//! let filter = ReportFilter::all();
//!
//! assert_eq!(analysis.buckets.leaked.len(), 1);
//! assert!(render_report(&analysis.buckets, &filter).contains("Leaked objects"));
//! assert!(ExitStatus::from_buckets(&analysis.buckets, &filter).contains(ExitStatus::LEAKS));
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod analysis; // Registry, classification, offset resolution
pub mod config; // Analyzer and report configuration
pub mod event; // Log records and parsing
pub mod object; // Per-object lifetime state
pub mod report; // Text report and exit status

pub use analysis::{
    analyze_path, analyze_str, Analysis, Analyzer, AnalyzerError, Buckets, LineError,
};
pub use config::{AnalyzerConfig, ConfigError, ReportFilter, DEFAULT_LOG_PATH};
pub use event::{parse_line, Address, EventState, LogFormat, ParseError, RefEvent};
pub use object::{HistoryEntry, Outcome, PointerStatus, TrackedObject};
pub use report::{render_report, write_report, ExitStatus, EXIT_CANCELLED, EXIT_USAGE};
