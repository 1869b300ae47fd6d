//! Controlled vocabulary used when presenting tracker fields to people.
//!
//! Both tables are closed: a key or code that is not listed falls back to
//! its raw form rather than to a guess.

use crate::StatusCode;

/// Display names for tracker property keys.
const PROPERTY_NAMES: [(&str, &str); 18] = [
    ("status_id", "진행상태"),
    ("due_date", "마감일"),
    ("done_ratio", "완료율"),
    ("tracker_id", "트래커"),
    ("parent_id", "상위일감"),
    ("child_id", "하위일감"),
    ("description", "설명"),
    ("priority_id", "우선순위"),
    ("precedes", "이전"),
    ("follows", "팔로워"),
    ("subject", "일감명"),
    ("start_date", "시작일"),
    ("estimated_hours", "수행시간"),
    ("assigned_to_id", "담당자"),
    ("project_id", "프로젝트"),
    ("category_id", "범주"),
    ("fixed_version_id", "목표버전"),
    ("is_private", "비공개"),
];

/// Labels for tracker status codes that have one.
const STATUS_LABELS: [(i64, &str); 3] = [
    (4, "의견(Opinion)"),
    (5, "완료(Completion)"),
    (7, "중지(Pause)"),
];

/// Returns the display name of a property key, or the key itself when the
/// key is not in the table.
pub fn property_display_name(key: &str) -> &str {
    PROPERTY_NAMES
        .iter()
        .find(|(k, _)| *k == key)
        .map_or(key, |(_, name)| *name)
}

/// Returns the label of a status code, or its numeral when it has none.
pub fn status_label(code: StatusCode) -> String {
    STATUS_LABELS
        .iter()
        .find(|(c, _)| *c == code.as_i64())
        .map_or_else(|| code.to_string(), |(_, label)| (*label).to_string())
}
