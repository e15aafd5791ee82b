// src/extract/mod.rs
//! Event extraction: page text → [`ExtractedSet`].
//!
//! The page embeds its client-side store as one JSON blob. Model entries whose
//! key starts with the record prefix are events; their `attributes` carry
//! `id`, `name` and a zone-less `start_at`. The data contract is all-or-nothing:
//! one bad record fails the whole extraction.

pub mod locator;
pub mod types;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::config::ExtractConfig;
use crate::error::{WatchError, WatchResult};
use locator::{MarkerPattern, PayloadLocator};
pub use types::{EventRecord, EventStart, ExtractedSet};

pub struct EventExtractor {
    locator: Box<dyn PayloadLocator>,
    models_path: Vec<String>,
    record_prefix: String,
    source_zone: Tz,
    display_zone: Tz,
}

impl EventExtractor {
    pub fn from_config(cfg: &ExtractConfig) -> WatchResult<Self> {
        let locator = MarkerPattern::new(&cfg.payload_pattern)?;
        Self::with_locator(locator, cfg)
    }

    /// Same settings as `cfg`, but a caller-supplied way of finding the payload.
    pub fn with_locator<L: PayloadLocator + 'static>(locator: L, cfg: &ExtractConfig) -> WatchResult<Self> {
        Ok(Self {
            locator: Box::new(locator),
            models_path: cfg.models_path.clone(),
            record_prefix: cfg.record_prefix.clone(),
            source_zone: cfg.source_tz()?,
            display_zone: cfg.display_tz()?,
        })
    }

    /// `None` or a blank document (no prior capture) is the empty set.
    pub fn extract(&self, document: Option<&str>) -> WatchResult<ExtractedSet> {
        let Some(doc) = document.filter(|d| !d.trim().is_empty()) else {
            return Ok(ExtractedSet::new());
        };

        let raw = self.locator.locate(doc)?;
        let payload: Value = serde_json::from_str(raw)
            .map_err(|e| WatchError::Extraction(format!("embedded payload is not valid JSON: {e}")))?;
        let models = self.models(&payload)?;

        let mut set = ExtractedSet::new();
        for (key, model) in models {
            if !key.starts_with(&self.record_prefix) {
                continue;
            }
            set.insert(self.parse_record(key, model)?);
        }
        tracing::debug!(events = set.len(), models = models.len(), "capture extracted");
        Ok(set)
    }

    fn models<'p>(&self, payload: &'p Value) -> WatchResult<&'p Map<String, Value>> {
        let mut node = payload;
        for key in &self.models_path {
            node = node.get(key).ok_or_else(|| {
                WatchError::Extraction(format!(
                    "payload has no {:?} (looking for {})",
                    key,
                    self.models_path.join(".")
                ))
            })?;
        }
        node.as_object().ok_or_else(|| {
            WatchError::Extraction(format!("{} is not an object", self.models_path.join(".")))
        })
    }

    fn parse_record(&self, key: &str, model: &Value) -> WatchResult<EventRecord> {
        let attrs = model
            .get("attributes")
            .and_then(Value::as_object)
            .ok_or_else(|| WatchError::Extraction(format!("{key}: missing attributes")))?;

        let id = match attrs.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(WatchError::Extraction(format!("{key}: missing id"))),
        };
        let name = attrs
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| WatchError::Extraction(format!("{key}: missing name")))?
            .to_string();
        let start_raw = attrs
            .get("start_at")
            .and_then(Value::as_str)
            .ok_or_else(|| WatchError::Extraction(format!("{key}: missing start_at")))?;
        let utc = parse_start(start_raw, self.source_zone).ok_or_else(|| {
            WatchError::Extraction(format!("{key}: unparsable start_at {start_raw:?}"))
        })?;

        Ok(EventRecord {
            id,
            name,
            start: EventStart {
                utc,
                source_zone: self.source_zone,
                display_zone: self.display_zone,
            },
        })
    }
}

/// ISO-8601 start time. Zone-less values are read in `source`; an explicit
/// offset, when present, is honored as written.
pub fn parse_start(raw: &str, source: Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    // Ambiguous wall times (fall-back hour) resolve to the earlier instant.
    source
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
