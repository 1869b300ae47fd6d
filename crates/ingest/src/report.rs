use serde::Serialize;

/// Counts of what happened to each object during one cycle.
///
/// Every listed object ends up in exactly one of `vanished`, `malformed`,
/// `duplicate`, `filtered`, `delivered` or `delivery_failed`, unless the
/// batch was stopped early. `archived`, `archive_failed` and
/// `persist_failed` count side effects on top of that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub listed: usize,
    /// Listed but gone by the time it was fetched.
    pub vanished: usize,
    pub malformed: usize,
    pub duplicate: usize,
    pub filtered: usize,
    pub delivered: usize,
    pub delivery_failed: usize,
    pub archived: usize,
    pub archive_failed: usize,
    pub persist_failed: usize,
}

impl CycleReport {
    /// Returns `true` if the cycle had nothing to do.
    pub fn is_idle(&self) -> bool {
        self.listed == 0
    }
}
