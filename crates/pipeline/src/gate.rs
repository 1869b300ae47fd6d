//! Business-hours gate deciding whether a poll may run.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

use crate::PipelineError;

/// Monday–Friday, `[start_hour, end_hour)` in a fixed UTC offset.
///
/// Stateless; evaluate it once per timer tick. A Seoul office is
/// `BusinessHours::new(540, 9, 18)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    offset: FixedOffset,
    start_hour: u32,
    end_hour: u32,
}

impl BusinessHours {
    /// Creates a gate for `offset_minutes` east of UTC, open from
    /// `start_hour` (inclusive) to `end_hour` (exclusive).
    pub fn new(offset_minutes: i32, start_hour: u32, end_hour: u32) -> Result<Self, PipelineError> {
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| PipelineError::Configuration {
                message: format!("UTC offset of {offset_minutes} minutes is out of range"),
            })?;
        if start_hour >= end_hour || end_hour > 24 {
            return Err(PipelineError::Configuration {
                message: format!(
                    "business hours {start_hour}..{end_hour} must satisfy start < end <= 24"
                ),
            });
        }
        Ok(Self {
            offset,
            start_hour,
            end_hour,
        })
    }

    /// The offset local time is evaluated in.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Returns `true` if `now` falls inside business hours.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        let weekday = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        weekday && (self.start_hour..self.end_hour).contains(&local.hour())
    }
}
