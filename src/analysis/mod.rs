//! Object registry and lifecycle classification.
//!
//! The [`Analyzer`] owns every live object, feeds each parsed event to the
//! object it addresses, retires objects whose count reaches zero, and at end
//! of input resolves embedded pointers and sorts the survivors into leak
//! buckets.

mod offset;
mod preprocess;

pub use offset::{resolve_offsets, OffsetIndex};
pub use preprocess::{unbalanced_addresses, Balance};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AnalyzerConfig, ConfigError};
use crate::event::{parse_line, Address, LogFormat, ParseError, RefEvent};
use crate::object::{Outcome, TrackedObject};

/// Errors that abort an analysis run.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The input log could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Reading the input failed midway.
    #[error("read error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Interrupted by the user.
    #[error("processing cancelled")]
    Cancelled,
}

/// A line that was skipped because it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line number.
    pub line_no: usize,
    /// Offending text.
    pub line: String,
    /// Why parsing failed.
    pub error: ParseError,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line_no, self.error, self.line)
    }
}

/// Classified objects, one collection per outcome.
#[derive(Debug, Default)]
pub struct Buckets {
    /// Over-released or referenced after destruction.
    pub invalid: Vec<TrackedObject>,
    /// Still held directly at end of log.
    pub leaked: Vec<TrackedObject>,
    /// Still held only through other live objects.
    pub indirectly_leaked: Vec<TrackedObject>,
    /// Observed from mid-lifetime.
    pub skewed: Vec<TrackedObject>,
    /// Released cleanly.
    pub finalized: Vec<TrackedObject>,
}

impl Buckets {
    /// Objects classified as `outcome`.
    pub fn get(&self, outcome: Outcome) -> &[TrackedObject] {
        match outcome {
            Outcome::Invalid => &self.invalid,
            Outcome::Leaked => &self.leaked,
            Outcome::IndirectlyLeaked => &self.indirectly_leaked,
            Outcome::Skewed => &self.skewed,
            Outcome::Finalized => &self.finalized,
        }
    }

    fn push(&mut self, outcome: Outcome, object: TrackedObject) {
        let bucket = match outcome {
            Outcome::Invalid => &mut self.invalid,
            Outcome::Leaked => &mut self.leaked,
            Outcome::IndirectlyLeaked => &mut self.indirectly_leaked,
            Outcome::Skewed => &mut self.skewed,
            Outcome::Finalized => &mut self.finalized,
        };
        bucket.push(object);
    }
}

/// Counters gathered while processing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisStats {
    /// Input lines read, blank ones included.
    pub lines: usize,
    /// Events applied to objects.
    pub events: usize,
    /// Lines skipped as malformed.
    pub malformed: usize,
    /// Lines skipped by the pre-pass filter.
    pub filtered: usize,
    /// Objects tracked in total.
    pub objects: u64,
}

/// Result of a complete run.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Objects per outcome; suppressed outcomes stay empty.
    pub buckets: Buckets,
    /// Processing counters.
    pub stats: AnalysisStats,
}

/// Streaming registry of live objects.
#[derive(Debug)]
pub struct Analyzer {
    config: AnalyzerConfig,
    format: LogFormat,
    live: HashMap<Address, TrackedObject>,
    buckets: Buckets,
    stats: AnalysisStats,
    only: Option<HashSet<Address>>,
}

impl Analyzer {
    /// Create an analyzer with no live objects.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            format: config.format,
            config,
            live: HashMap::new(),
            buckets: Buckets::default(),
            stats: AnalysisStats::default(),
            only: None,
        }
    }

    /// Restrict processing to `addresses`, as computed by the pre-pass.
    pub fn restrict_to(mut self, addresses: HashSet<Address>) -> Self {
        self.only = Some(addresses);
        self
    }

    /// Log format in effect; `Auto` until the first record is accepted.
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Number of objects currently live.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Look up a live object.
    pub fn live_object(&self, address: &str) -> Option<&TrackedObject> {
        self.live.get(address)
    }

    /// Parse and apply one input line.
    ///
    /// Blank lines and lines outside the pre-pass set are ignored. A
    /// malformed line leaves every object untouched. With `Auto`, the first
    /// accepted record fixes the format for every later line.
    pub fn feed_line(&mut self, line: &str, line_no: usize) -> Result<(), LineError> {
        self.stats.lines += 1;
        if line.trim().is_empty() {
            return Ok(());
        }
        if let Some(only) = &self.only {
            let address = line.split(',').next().unwrap_or_default().trim();
            if !only.contains(address) {
                self.stats.filtered += 1;
                return Ok(());
            }
        }

        let format = self.format.settle(line);
        match parse_line(line, line_no, format) {
            Ok(event) => {
                self.format = format;
                self.feed(event);
                Ok(())
            }
            Err(error) => {
                self.stats.malformed += 1;
                Err(LineError {
                    line_no,
                    line: line.to_string(),
                    error,
                })
            }
        }
    }

    /// Apply one event to the object it addresses.
    pub fn feed(&mut self, event: RefEvent) {
        let event = if self.config.track_pointers {
            event
        } else {
            event.without_pointer()
        };
        self.stats.events += 1;

        let address = event.address.clone();
        let finalized = match self.live.get_mut(&address) {
            Some(object) => {
                object.apply(event);
                object.is_finalized()
            }
            None => {
                let object = TrackedObject::create(event, self.stats.objects);
                self.stats.objects += 1;
                let finalized = object.is_finalized();
                self.live.insert(address.clone(), object);
                finalized
            }
        };

        if finalized {
            if let Some(object) = self.live.remove(&address) {
                self.retire(object);
            }
        }
    }

    fn retire(&mut self, object: TrackedObject) {
        let outcome = object.finished_outcome();
        debug!(
            object = %object.address(),
            count = object.running_count(),
            ?outcome,
            "object finalized"
        );
        self.keep(outcome, object);
    }

    fn keep(&mut self, outcome: Outcome, object: TrackedObject) {
        if self.config.filter.shows(outcome) {
            self.buckets.push(outcome, object);
        }
    }

    /// Consume every line of `reader`, reporting skipped lines to `on_error`.
    pub fn process<R, F>(
        &mut self,
        reader: R,
        cancel: &AtomicBool,
        mut on_error: F,
    ) -> Result<(), AnalyzerError>
    where
        R: BufRead,
        F: FnMut(&LineError),
    {
        for (idx, bytes) in reader.split(b'\n').enumerate() {
            if cancel.load(Ordering::Relaxed) {
                return Err(AnalyzerError::Cancelled);
            }
            let bytes = bytes?;
            let line = String::from_utf8_lossy(&bytes);
            if let Err(err) = self.feed_line(&line, idx + 1) {
                on_error(&err);
            }
        }
        Ok(())
    }

    /// End of input: resolve embedded pointers among the survivors and
    /// classify them.
    pub fn finish(mut self) -> Analysis {
        let mut survivors: Vec<TrackedObject> = self.live.drain().map(|(_, obj)| obj).collect();
        survivors.sort_by_key(TrackedObject::seq);

        let indirect = resolve_offsets(&mut survivors);
        debug!(
            survivors = survivors.len(),
            indirect, "end of input, classifying live objects"
        );

        for object in survivors {
            let outcome = object.live_outcome();
            self.keep(outcome, object);
        }

        Analysis {
            buckets: self.buckets,
            stats: self.stats,
        }
    }
}

/// Analyse the log at `path`.
///
/// Runs the balancing pre-pass first when the configuration allows it.
pub fn analyze_path<F>(
    path: &Path,
    config: AnalyzerConfig,
    cancel: &AtomicBool,
    on_error: F,
) -> Result<Analysis, AnalyzerError>
where
    F: FnMut(&LineError),
{
    config.filter.validate()?;
    if config.preprocess && config.filter.normal {
        warn!("preprocess ignored: it requires finalized objects to be suppressed");
    }

    let preprocess = config.preprocess_active();
    let format = config.format;
    let mut analyzer = Analyzer::new(config);
    if preprocess {
        let balance = unbalanced_addresses(open(path)?, format, cancel)?;
        analyzer.format = balance.format;
        analyzer = analyzer.restrict_to(balance.addresses);
    }

    analyzer.process(open(path)?, cancel, on_error)?;
    Ok(analyzer.finish())
}

/// Analyse an in-memory log, discarding line errors.
pub fn analyze_str(log: &str, config: AnalyzerConfig) -> Analysis {
    let mut analyzer = Analyzer::new(config);
    for (idx, line) in log.lines().enumerate() {
        let _ = analyzer.feed_line(line, idx + 1);
    }
    analyzer.finish()
}

fn open(path: &Path) -> Result<BufReader<File>, AnalyzerError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| AnalyzerError::Open {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportFilter;

    const CREATE: &str = "0x1000,1,1,chan.c,10,alloc,**constructor**40**20**,(nil),create";
    const DESTROY: &str = "0x1000,-1,1,chan.c,20,free,destructor,(nil),destroy";

    #[test]
    fn constructor_destructor_pair_is_finalized() {
        let analysis = analyze_str(&format!("{CREATE}\n{DESTROY}\n"), AnalyzerConfig::new());
        let finalized = &analysis.buckets.finalized;
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].declared_size(), Some(60));
        assert_eq!(finalized[0].history().count(), 2);
        assert!(analysis.buckets.leaked.is_empty());
        assert!(analysis.buckets.invalid.is_empty());
    }

    #[test]
    fn unreleased_object_leaks_with_direct_count() {
        let analysis = analyze_str(CREATE, AnalyzerConfig::new());
        assert_eq!(analysis.buckets.leaked.len(), 1);
        assert_eq!(analysis.buckets.leaked[0].direct_count(), 1);
    }

    #[test]
    fn address_reuse_starts_a_new_object() {
        let log = format!("{CREATE}\n{DESTROY}\n{CREATE}\n");
        let analysis = analyze_str(&log, AnalyzerConfig::new());
        assert_eq!(analysis.buckets.finalized.len(), 1);
        assert_eq!(analysis.buckets.leaked.len(), 1);
        assert_eq!(analysis.stats.objects, 2);
    }

    #[test]
    fn malformed_line_is_reported_and_skipped() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::new());
        analyzer.feed_line(CREATE, 1).unwrap();
        let err = analyzer.feed_line("0x1000,-1,1,chan.c,20", 2).unwrap_err();
        assert_eq!(err.line_no, 2);
        assert!(err.to_string().starts_with("line 2: object 0x1000"));
        assert_eq!(analyzer.live_object("0x1000").unwrap().running_count(), 1);
    }

    #[test]
    fn suppressed_buckets_are_not_retained() {
        let config = AnalyzerConfig::new().with_filter(ReportFilter::all().with_normal(false));
        let analysis = analyze_str(&format!("{CREATE}\n{DESTROY}\n"), config);
        assert!(analysis.buckets.finalized.is_empty());
        assert_eq!(analysis.stats.objects, 1);
    }

    #[test]
    fn ignore_pointers_keeps_pointer_churn() {
        let log = format!(
            "{CREATE}\n\
             0x1000,1,1,chan.c,11,ref,1,0x5000,hold\n\
             0x1000,-1,1,chan.c,12,unref,2,0x5000,release\n"
        );
        let tracked = analyze_str(&log, AnalyzerConfig::new());
        assert_eq!(tracked.buckets.leaked[0].history().count(), 1);

        let untracked = analyze_str(&log, AnalyzerConfig::new().with_pointer_tracking(false));
        assert_eq!(untracked.buckets.leaked[0].history().count(), 3);
    }

    #[test]
    fn process_reports_each_skipped_line() {
        let log = format!("{CREATE}\nnot a record\n\n{DESTROY}\n");
        let mut analyzer = Analyzer::new(AnalyzerConfig::new());
        let mut skipped = Vec::new();
        analyzer
            .process(log.as_bytes(), &AtomicBool::new(false), |err| {
                skipped.push(err.line_no)
            })
            .unwrap();

        assert_eq!(skipped, [2]);
        let analysis = analyzer.finish();
        assert_eq!(analysis.stats.lines, 4);
        assert_eq!(analysis.buckets.finalized.len(), 1);
    }

    #[test]
    fn process_stops_when_cancelled() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::new());
        let err = analyzer
            .process(CREATE.as_bytes(), &AtomicBool::new(true), |_| {})
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Cancelled));
    }

    #[test]
    fn auto_format_is_fixed_by_first_record() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::new());
        assert_eq!(analyzer.format(), LogFormat::Auto);
        assert!(analyzer.feed_line("junk", 1).is_err());
        assert_eq!(analyzer.format(), LogFormat::Auto);

        analyzer
            .feed_line("0x1000,1,1,chan.c,10,alloc,**constructor**40**20**,create", 2)
            .unwrap();
        assert_eq!(analyzer.format(), LogFormat::Legacy);
        analyzer
            .feed_line("0x1000,1,1,chan.c,11,ref,1,0x5000,hold", 3)
            .unwrap();

        let object = analyzer.live_object("0x1000").unwrap();
        let last = object.history().last().unwrap();
        assert_eq!(last.event.pointer, None);
        assert_eq!(last.event.tag, "0x5000,hold");
    }

    #[test]
    fn restricted_analyzer_skips_other_addresses() {
        let mut only = HashSet::new();
        only.insert(Address::from("0x2000"));
        let mut analyzer = Analyzer::new(AnalyzerConfig::new()).restrict_to(only);
        analyzer.feed_line(CREATE, 1).unwrap();
        assert_eq!(analyzer.live_count(), 0);
    }
}
