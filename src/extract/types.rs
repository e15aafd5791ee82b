// src/extract/types.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Start of an event: the absolute instant plus the zones it was read in and
/// is shown in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStart {
    pub utc: DateTime<Utc>,
    pub source_zone: Tz,
    pub display_zone: Tz,
}

impl EventStart {
    pub fn local(&self) -> DateTime<Tz> {
        self.utc.with_timezone(&self.display_zone)
    }
}

/// One event as published by the listing page. `id` is assigned upstream and
/// stays the same across captures while the event is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: String,
    pub name: String,
    pub start: EventStart,
}

/// Events decoded from one capture, keyed by id. Never absent: an empty or
/// missing capture yields an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSet {
    events: BTreeMap<String, EventRecord>,
}

impl ExtractedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later records with an id already present replace the earlier one.
    pub fn insert(&mut self, record: EventRecord) {
        self.events.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<&EventRecord> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.values()
    }
}

impl FromIterator<EventRecord> for ExtractedSet {
    fn from_iter<I: IntoIterator<Item = EventRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        for r in iter {
            set.insert(r);
        }
        set
    }
}
