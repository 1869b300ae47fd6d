//! Fixed-width progress bar showing how a completion ratio moved.

use crate::CompletionRatio;

/// Number of segments in a bar; each segment stands for 10%.
pub const BAR_SEGMENTS: u8 = 10;

/// One cell of a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Progress that already existed (or, on a decrease, still exists).
    Filled,
    /// Progress added by this change.
    Gained,
    /// Work still to do.
    Empty,
    /// Progress taken away by this change.
    Lost,
}

impl Segment {
    /// The emoji drawn for this segment.
    pub fn glyph(self) -> &'static str {
        match self {
            Segment::Filled => "⬛",
            Segment::Gained => "🟩",
            Segment::Empty => "⬜",
            Segment::Lost => "🟥",
        }
    }
}

/// A completion ratio transition, ready to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressChange {
    segments: Vec<Segment>,
    diff: i16,
}

impl ProgressChange {
    /// Computes the bar for a move from `old` to `new`.
    ///
    /// An increase keeps the old progress filled, highlights the gain and
    /// leaves the rest empty. Anything else (including no change) fills the
    /// new progress and marks every remaining segment as lost.
    pub fn between(old: CompletionRatio, new: CompletionRatio) -> Self {
        let diff = i16::from(new.as_percent()) - i16::from(old.as_percent());
        let old_cells = cells(old);
        let new_cells = cells(new);

        let segments = (0..u16::from(BAR_SEGMENTS))
            .map(|i| {
                if diff > 0 {
                    if i < old_cells {
                        Segment::Filled
                    } else if i < new_cells {
                        Segment::Gained
                    } else {
                        Segment::Empty
                    }
                } else if i < new_cells {
                    Segment::Filled
                } else {
                    Segment::Lost
                }
            })
            .collect();

        Self { segments, diff }
    }

    /// The drawn segments, left to right.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Signed percentage-point change.
    pub fn diff(&self) -> i16 {
        self.diff
    }

    /// The bar as a string of emoji.
    pub fn bar(&self) -> String {
        self.segments.iter().map(|s| s.glyph()).collect()
    }

    /// `+30%` for an increase, `-30%` or `0%` otherwise.
    pub fn caption(&self) -> String {
        if self.diff > 0 {
            format!("+{}%", self.diff)
        } else {
            format!("{}%", self.diff)
        }
    }
}

fn cells(ratio: CompletionRatio) -> u16 {
    u16::from(ratio.as_percent()) * u16::from(BAR_SEGMENTS) / u16::from(CompletionRatio::MAX)
}
