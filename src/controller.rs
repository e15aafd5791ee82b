//! One capture → compare → persist cycle.
//!
//! FETCHING → EXTRACTING → COMPARING → one of REPORTING, BASELINE, NO_CHANGE,
//! or FAILED. Only REPORTING produces output for stdout; FAILED persists
//! nothing and surfaces as an `Err`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time;

use crate::config::WatchConfig;
use crate::diff::{diff, DiffResult};
use crate::error::{WatchError, WatchResult};
use crate::extract::EventExtractor;
use crate::fetch::PageFetcher;
use crate::history::SnapshotStore;
use crate::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Fetching,
    Extracting,
    Comparing,
    Reporting,
    Baseline,
    NoChange,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetching => "FETCHING",
            Self::Extracting => "EXTRACTING",
            Self::Comparing => "COMPARING",
            Self::Reporting => "REPORTING",
            Self::Baseline => "BASELINE",
            Self::NoChange => "NO_CHANGE",
            Self::Failed => "FAILED",
        })
    }
}

/// Successful terminal states.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// New events against a previous capture; `report` goes to stdout.
    Reporting {
        diff: DiffResult,
        report: String,
        snapshot: PathBuf,
    },
    /// No usable history yet: the capture is stored, nothing is reported.
    Baseline { events: usize, snapshot: PathBuf },
    /// Nothing new; nothing stored.
    NoChange { events: usize },
}

impl RunOutcome {
    pub fn phase(&self) -> RunPhase {
        match self {
            Self::Reporting { .. } => RunPhase::Reporting,
            Self::Baseline { .. } => RunPhase::Baseline,
            Self::NoChange { .. } => RunPhase::NoChange,
        }
    }

    /// Text for stdout. `None` for every outcome except REPORTING.
    pub fn report(&self) -> Option<&str> {
        match self {
            Self::Reporting { report, .. } => Some(report.as_str()),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        0
    }
}

pub struct RunController<F: PageFetcher> {
    cfg: WatchConfig,
    fetcher: F,
    store: SnapshotStore,
    extractor: EventExtractor,
}

impl<F: PageFetcher> RunController<F> {
    pub fn new(cfg: WatchConfig, fetcher: F) -> WatchResult<Self> {
        let extractor = EventExtractor::from_config(&cfg.extract)?;
        Ok(Self::with_extractor(cfg, fetcher, extractor))
    }

    /// Swap in a different extractor (e.g. a custom payload locator).
    pub fn with_extractor(cfg: WatchConfig, fetcher: F, extractor: EventExtractor) -> Self {
        let store = SnapshotStore::new(cfg.store.clone());
        Self {
            cfg,
            fetcher,
            store,
            extractor,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.cfg
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn run_once(&self) -> WatchResult<RunOutcome> {
        match self.cycle().await {
            Ok(outcome) => {
                tracing::info!(phase = %outcome.phase(), "run finished");
                Ok(outcome)
            }
            Err(e) => {
                tracing::debug!(phase = %RunPhase::Failed, kind = e.kind(), "run failed");
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> WatchResult<RunOutcome> {
        let previous = self.store.latest().await?;

        tracing::debug!(phase = %RunPhase::Fetching, "fetching listing");
        let current = self.fetch_current().await?;

        tracing::debug!(phase = %RunPhase::Extracting, "extracting events");
        let current_events = self.extractor.extract(Some(&current))?;
        let previous_events = self
            .extractor
            .extract(previous.as_ref().map(|c| c.document.as_str()))?;

        tracing::debug!(
            phase = %RunPhase::Comparing,
            current = current_events.len(),
            previous = previous_events.len(),
            previous_capture = previous.as_ref().map(|c| c.name.as_str()).unwrap_or("-"),
            "comparing captures"
        );
        let new_events = diff(&current_events, &previous_events);

        if new_events.is_empty() {
            return Ok(RunOutcome::NoChange {
                events: current_events.len(),
            });
        }

        let snapshot = self.store.persist(&current).await?;
        if previous_events.is_empty() {
            tracing::info!(events = current_events.len(), "baseline established");
            return Ok(RunOutcome::Baseline {
                events: current_events.len(),
                snapshot,
            });
        }

        tracing::info!(new = new_events.len(), "new events found");
        let report = report::render(&new_events, &self.cfg);
        Ok(RunOutcome::Reporting {
            diff: new_events,
            report,
            snapshot,
        })
    }

    async fn fetch_current(&self) -> WatchResult<String> {
        let limit = self.cfg.site.fetch_timeout();
        let creds = &self.cfg.credentials;

        let mut session = time::timeout(limit, self.fetcher.authenticate(&self.cfg.site.login_url, creds))
            .await
            .map_err(|_| WatchError::Auth(timed_out("signing in", limit)))??;

        let url = self.cfg.listing_url();
        let document = time::timeout(limit, self.fetcher.fetch(&mut session, &url))
            .await
            .map_err(|_| WatchError::Fetch(timed_out(&format!("loading {url}"), limit)))??;

        if !self.fetcher.is_authenticated(&session) {
            let mut msg = "login unsuccessful: listing page still asks to sign in".to_string();
            if let Some(dump) = self.dump_failed_login(&session).await {
                msg.push_str(&format!(" (page saved to {dump})"));
            }
            return Err(WatchError::Auth(msg));
        }

        let marker = &self.cfg.site.required_marker;
        if !document.contains(marker.as_str()) {
            return Err(WatchError::Fetch(format!(
                "cannot find {marker:?} in content at {url}"
            )));
        }
        tracing::debug!(bytes = document.len(), "listing fetched");
        Ok(document)
    }

    async fn dump_failed_login(&self, session: &F::Session) -> Option<String> {
        let path = self.cfg.site.failed_login_dump.as_ref()?;
        let page = self.fetcher.last_page(session)?;
        match tokio::fs::write(path, page).await {
            Ok(()) => Some(path.display().to_string()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not save failed sign-in page");
                None
            }
        }
    }
}

fn timed_out(what: &str, limit: Duration) -> String {
    format!("{what} timed out after {}s", limit.as_secs())
}
