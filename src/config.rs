//! Analyzer and report configuration.

use thiserror::Error;

use crate::event::LogFormat;
use crate::object::Outcome;

/// Default location of the reference debug log.
pub const DEFAULT_LOG_PATH: &str = "/var/log/asterisk/refs";

/// Errors in user-supplied configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Every report category has been suppressed.
    #[error("all report categories are disabled; nothing to report")]
    AllCategoriesDisabled,
}

/// Which report buckets are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFilter {
    /// Show over-released and use-after-free objects.
    pub invalid: bool,
    /// Show leaked objects.
    pub leaked: bool,
    /// Show objects only referenced through other live objects.
    pub indirect: bool,
    /// Show objects whose history starts mid-lifetime.
    pub skewed: bool,
    /// Show objects that were released cleanly.
    pub normal: bool,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl ReportFilter {
    /// Every bucket enabled.
    pub fn all() -> Self {
        Self {
            invalid: true,
            leaked: true,
            indirect: true,
            skewed: true,
            normal: true,
        }
    }

    /// Toggle the invalid bucket.
    pub fn with_invalid(mut self, enabled: bool) -> Self {
        self.invalid = enabled;
        self
    }

    /// Toggle the leaked bucket.
    pub fn with_leaked(mut self, enabled: bool) -> Self {
        self.leaked = enabled;
        self
    }

    /// Toggle the indirectly-leaked bucket.
    pub fn with_indirect(mut self, enabled: bool) -> Self {
        self.indirect = enabled;
        self
    }

    /// Toggle the skewed bucket.
    pub fn with_skewed(mut self, enabled: bool) -> Self {
        self.skewed = enabled;
        self
    }

    /// Toggle the finalized bucket.
    pub fn with_normal(mut self, enabled: bool) -> Self {
        self.normal = enabled;
        self
    }

    /// Whether objects with `outcome` are reported.
    pub fn shows(&self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Invalid => self.invalid,
            Outcome::Leaked => self.leaked,
            Outcome::IndirectlyLeaked => self.indirect,
            Outcome::Skewed => self.skewed,
            Outcome::Finalized => self.normal,
        }
    }

    /// Reject a filter that would report nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.invalid || self.leaked || self.indirect || self.skewed || self.normal {
            Ok(())
        } else {
            Err(ConfigError::AllCategoriesDisabled)
        }
    }
}

/// Configuration for a single analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Log format revision to expect.
    pub format: LogFormat,
    /// Pair pointer-tagged increments and decrements.
    pub track_pointers: bool,
    /// Request a balancing pre-pass that drops fully released addresses.
    pub preprocess: bool,
    /// Buckets to retain and report.
    pub filter: ReportFilter,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerConfig {
    /// Auto-detected format, pointer tracking on, all buckets shown.
    pub fn new() -> Self {
        Self {
            format: LogFormat::Auto,
            track_pointers: true,
            preprocess: false,
            filter: ReportFilter::all(),
        }
    }

    /// Set the expected log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable pointer slot pairing.
    pub fn with_pointer_tracking(mut self, enabled: bool) -> Self {
        self.track_pointers = enabled;
        self
    }

    /// Request the balancing pre-pass.
    pub fn with_preprocess(mut self, enabled: bool) -> Self {
        self.preprocess = enabled;
        self
    }

    /// Set the report filter.
    pub fn with_filter(mut self, filter: ReportFilter) -> Self {
        self.filter = filter;
        self
    }

    /// The pre-pass only runs when finalized objects are not reported,
    /// since it drops their histories.
    pub fn preprocess_active(&self) -> bool {
        self.preprocess && !self.filter.normal
    }
}
