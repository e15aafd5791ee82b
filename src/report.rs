//! Plain-text change report written to stdout.

use std::fmt::Write as _;

use crate::config::WatchConfig;
use crate::diff::DiffResult;
use crate::extract::EventRecord;

/// e.g. `Sat., Jan. 04, (01/04/2025)`
pub const DATE_FORMAT: &str = "%a., %b. %d, (%m/%d/%Y)";

/// `<name> on <date> , <event url>` for one event.
pub fn render_line(event: &EventRecord, cfg: &WatchConfig) -> String {
    format!(
        "{} on {} , {}",
        event.name,
        event.start.local().format(DATE_FORMAT),
        cfg.event_url(&event.id)
    )
}

/// One line per new event, each followed by a blank line. Empty diff renders
/// as the empty string.
pub fn render(diff: &DiffResult, cfg: &WatchConfig) -> String {
    let mut out = String::new();
    for event in &diff.added {
        let _ = writeln!(out, "{}", render_line(event, cfg));
        out.push('\n');
    }
    out
}
