use chrono::NaiveDate;

use crate::models::JournalEntry;

/// Group entries by the calendar date of their timestamp. Groups and the
/// entries inside them keep the input's (newest-first) order.
pub fn group_by_day(entries: &[JournalEntry]) -> Vec<(NaiveDate, Vec<&JournalEntry>)> {
    let mut groups: Vec<(NaiveDate, Vec<&JournalEntry>)> = Vec::new();
    for entry in entries {
        let day = entry.created_at.date_naive();
        match groups.iter_mut().find(|(d, _)| *d == day) {
            Some((_, group)) => group.push(entry),
            None => groups.push((day, vec![entry])),
        }
    }
    groups
}
