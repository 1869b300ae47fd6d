//! Shared value types for the notification pipeline.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (a completion ratio is in `[0, 100]`) and
//! participate in computations such as ordering events or drawing a progress
//! bar.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Percentage of an issue that is done, in the range `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompletionRatio(u8);

impl CompletionRatio {
    /// Largest valid ratio.
    pub const MAX: u8 = 100;

    /// Creates a [`CompletionRatio`], returning `None` if `percent` is outside
    /// `[0, 100]`.
    #[must_use]
    pub fn new(percent: i64) -> Option<Self> {
        u8::try_from(percent)
            .ok()
            .filter(|p| *p <= Self::MAX)
            .map(Self)
    }

    /// Returns the ratio as a whole percentage.
    pub fn as_percent(self) -> u8 {
        self.0
    }

    /// Returns `true` if no progress has been recorded.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for CompletionRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// ---------------------------------------------------------------------------

/// Numeric status code assigned by the issue tracker (the `status_id` field).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(i64);

impl StatusCode {
    /// Creates a [`StatusCode`] from a raw integer.
    pub fn new(code: i64) -> Self {
        Self(code)
    }

    /// Returns the underlying integer value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A wall-clock timestamp that remembers the UTC offset it was produced in.
///
/// Ordering and equality compare the instant, not the offset, so two events
/// stamped `10:00+09:00` and `01:00Z` are the same moment. Calendar dates are
/// rendered in the offset the timestamp carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<FixedOffset>);

impl Timestamp {
    /// Parses an RFC 3339 string such as `"2024-05-01T10:00:00+09:00"`.
    pub fn parse_rfc3339(value: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(value).map(Self)
    }

    /// Formats the calendar date in the timestamp's own offset (`YYYY-MM-DD`).
    pub fn calendar_date(self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_ratio_bounds() {
        assert_eq!(CompletionRatio::new(0).unwrap().as_percent(), 0);
        assert_eq!(CompletionRatio::new(100).unwrap().as_percent(), 100);
        assert!(CompletionRatio::new(101).is_none());
        assert!(CompletionRatio::new(-1).is_none());
    }

    #[test]
    fn test_timestamp_orders_by_instant_and_formats_in_own_offset() {
        let seoul = Timestamp::parse_rfc3339("2024-05-01T08:00:00+09:00").unwrap();
        let utc = Timestamp::parse_rfc3339("2024-04-30T23:30:00Z").unwrap();

        assert!(seoul < utc);
        assert_eq!(seoul.calendar_date(), "2024-05-01");
        assert_eq!(utc.calendar_date(), "2024-04-30");
    }
}
