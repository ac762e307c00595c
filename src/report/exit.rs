//! Process exit status derived from the reported findings.

use crate::analysis::Buckets;
use crate::config::ReportFilter;
use crate::object::Outcome;

/// Bad arguments, unreadable input, or nothing enabled to report.
pub const EXIT_USAGE: i32 = -1;

/// Interrupted before the report was produced.
pub const EXIT_CANCELLED: i32 = -2;

/// Bitmask of finding categories present in the shown buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitStatus(u8);

impl ExitStatus {
    /// Leaked or indirectly leaked objects.
    pub const LEAKS: u8 = 1 << 0;
    /// Skewed objects.
    pub const SKEWED: u8 = 1 << 1;
    /// Invalid objects.
    pub const INVALID: u8 = 1 << 2;

    /// Compute the status for `buckets` under `filter`.
    pub fn from_buckets(buckets: &Buckets, filter: &ReportFilter) -> Self {
        let present = |outcome| filter.shows(outcome) && !buckets.get(outcome).is_empty();

        let mut bits = 0;
        if present(Outcome::Leaked) || present(Outcome::IndirectlyLeaked) {
            bits |= Self::LEAKS;
        }
        if present(Outcome::Skewed) {
            bits |= Self::SKEWED;
        }
        if present(Outcome::Invalid) {
            bits |= Self::INVALID;
        }
        Self(bits)
    }

    /// Raw bitmask.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Value to pass to `std::process::exit`.
    pub fn code(self) -> i32 {
        i32::from(self.0)
    }

    /// No findings in the shown buckets.
    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    /// Whether `flag` is set.
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }
}
