//! One-directional comparison of two extracted sets.
//!
//! Only ids that appear in the current capture and not in the previous one
//! count. Events that dropped off the page (expired, cancelled) are never
//! reported.

use std::cmp::Ordering;

use crate::extract::{EventRecord, ExtractedSet};

/// Newly appeared events, ascending by start time, ties by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: Vec<EventRecord>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.added.iter().map(|e| e.id.as_str()).collect()
    }
}

/// `current − previous` by id. Pure.
pub fn diff(current: &ExtractedSet, previous: &ExtractedSet) -> DiffResult {
    let mut added: Vec<EventRecord> = current
        .records()
        .filter(|e| !previous.contains(&e.id))
        .cloned()
        .collect();
    added.sort_by(presentation_order);
    DiffResult { added }
}

fn presentation_order(a: &EventRecord, b: &EventRecord) -> Ordering {
    a.start.utc.cmp(&b.start.utc).then_with(|| a.id.cmp(&b.id))
}
