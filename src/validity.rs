//! Validity Filter

use jiff::Timestamp;

use crate::records::ConditionRecord;

/// Whether a condition is effective at `now`: active, and `now` within its inclusive
/// `[valid_from, valid_until]` window. A missing bound leaves that side open.
#[must_use]
pub fn is_effective(condition: &ConditionRecord, now: Timestamp) -> bool {
    condition.active
        && condition.valid_from.is_none_or(|from| now >= from)
        && condition.valid_until.is_none_or(|until| now <= until)
}
