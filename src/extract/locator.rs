// src/extract/locator.rs
//! Finding the embedded data blob inside a page.
//!
//! The markup coupling is isolated behind [`PayloadLocator`] so a page redesign
//! only means a new pattern (or a new locator), not a new pipeline.

use regex::Regex;

use crate::error::{WatchError, WatchResult};

pub trait PayloadLocator: Send + Sync {
    /// Returns the raw payload text. A document without the marker is an
    /// error, never `Ok` with nothing.
    fn locate<'a>(&self, document: &'a str) -> WatchResult<&'a str>;

    /// Human-readable description of what is being searched for.
    fn describe(&self) -> String;
}

/// Regex-driven locator. The pattern's first capture group is the payload and
/// must match within a single line.
#[derive(Debug, Clone)]
pub struct MarkerPattern {
    re: Regex,
}

impl MarkerPattern {
    pub fn new(pattern: &str) -> WatchResult<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| WatchError::Config(format!("payload pattern {pattern:?}: {e}")))?;
        if re.captures_len() < 2 {
            return Err(WatchError::Config(format!(
                "payload pattern {pattern:?} has no capture group"
            )));
        }
        Ok(Self { re })
    }
}

impl PayloadLocator for MarkerPattern {
    fn locate<'a>(&self, document: &'a str) -> WatchResult<&'a str> {
        let mut hits = self.re.captures_iter(document);
        let first = hits.next().ok_or_else(|| {
            WatchError::Extraction(format!("cannot find text matching {}", self.describe()))
        })?;
        if hits.next().is_some() {
            return Err(WatchError::Extraction(format!(
                "more than one embedded payload matches {}",
                self.describe()
            )));
        }
        first
            .get(1)
            .map(|m| m.as_str())
            .ok_or_else(|| WatchError::Extraction("payload capture group did not match".into()))
    }

    fn describe(&self) -> String {
        format!("/{}/", self.re.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = r"var App = window.App = new TimecountsApp\((.*)\);";

    #[test]
    fn captures_payload_on_one_line() {
        let loc = MarkerPattern::new(PATTERN).unwrap();
        let doc = "<script>\nvar App = window.App = new TimecountsApp({\"a\":1});\n</script>";
        assert_eq!(loc.locate(doc).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn payload_split_across_lines_is_not_found() {
        let loc = MarkerPattern::new(PATTERN).unwrap();
        let doc = "var App = window.App = new TimecountsApp({\n\"a\":1});";
        let err = loc.locate(doc).unwrap_err();
        assert!(matches!(err, WatchError::Extraction(_)));
    }

    #[test]
    fn duplicate_markers_are_rejected() {
        let loc = MarkerPattern::new(PATTERN).unwrap();
        let line = "var App = window.App = new TimecountsApp({});";
        let doc = format!("{line}\n{line}");
        let err = loc.locate(&doc).unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn pattern_without_group_is_a_config_error() {
        let err = MarkerPattern::new("TimecountsApp").unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
