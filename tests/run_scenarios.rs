// tests/run_scenarios.rs
// End-to-end runs of the controller against a scripted fetcher and a temp store.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use opportunity_watch::config::Credentials;
use opportunity_watch::fetch::PageFetcher;
use opportunity_watch::{RunController, RunOutcome, RunPhase, WatchConfig, WatchError, WatchResult};

const SIGN_IN_PAGE: &str = "<html><h1>Sign in to Timecounts</h1></html>";

/// Serves one canned listing page; optionally refuses the sign-in or stalls.
struct ScriptedFetcher {
    page: String,
    signed_in: bool,
    stall: Option<Duration>,
}

impl ScriptedFetcher {
    fn serving(page: String) -> Self {
        Self {
            page,
            signed_in: true,
            stall: None,
        }
    }

    fn rejecting() -> Self {
        Self {
            page: String::new(),
            signed_in: false,
            stall: None,
        }
    }
}

struct Session {
    last_page: String,
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    type Session = Session;

    async fn authenticate(&self, _login_url: &str, _credentials: &Credentials) -> WatchResult<Session> {
        if let Some(d) = self.stall {
            tokio::time::sleep(d).await;
        }
        Ok(Session {
            last_page: String::new(),
        })
    }

    async fn fetch(&self, session: &mut Session, _url: &str) -> WatchResult<String> {
        session.last_page = if self.signed_in {
            self.page.clone()
        } else {
            SIGN_IN_PAGE.to_string()
        };
        Ok(session.last_page.clone())
    }

    fn is_authenticated(&self, session: &Session) -> bool {
        !session.last_page.contains("Sign in to Timecounts")
    }

    fn last_page<'s>(&self, session: &'s Session) -> Option<&'s str> {
        Some(&session.last_page)
    }
}

fn event_json(id: &str, name: &str, day: u32) -> String {
    format!(
        r#""Event:{id}":{{"type":"Event","attributes":{{"id":"{id}","name":"{name}","start_at":"2025-01-{day:02}T17:00:00.000"}}}}"#
    )
}

fn listing(events: &[(&str, &str, u32)]) -> String {
    let mut models: Vec<String> = events
        .iter()
        .map(|(id, name, day)| event_json(id, name, *day))
        .collect();
    models.push(r#""Organization:1":{"attributes":{"id":"1","name":"Org"}}"#.to_string());
    format!(
        "<html><body><h2>Events</h2>\n<script>var App = window.App = new TimecountsApp({{\"dehydrated_store\":{{\"api\":{{\"models\":{{{}}}}}}}}});</script>\n</body></html>",
        models.join(",")
    )
}

const E1: (&str, &str, u32) = ("e1", "Sort donations", 1);
const E2: (&str, &str, u32) = ("e2", "Pack boxes", 2);
const E3: (&str, &str, u32) = ("e3", "Deliver meals", 3);

fn config(dir: &Path) -> WatchConfig {
    WatchConfig::new(Credentials::new("me@example.org", "pw", "food-bank"), dir)
}

fn controller(dir: &Path, fetcher: ScriptedFetcher) -> RunController<ScriptedFetcher> {
    RunController::new(config(dir), fetcher).unwrap()
}

async fn seed(dir: &Path, page: &str) {
    let store = opportunity_watch::SnapshotStore::new(config(dir).store);
    store
        .persist_at(page, Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn first_run_establishes_baseline_quietly() {
    let tmp = tempfile::tempdir().unwrap();
    let c = controller(tmp.path(), ScriptedFetcher::serving(listing(&[E1, E2])));

    let outcome = c.run_once().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Baseline { events: 2, .. }));
    assert_eq!(outcome.report(), None);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(c.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn new_event_is_reported_and_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    seed(tmp.path(), &listing(&[E1, E2])).await;
    let c = controller(tmp.path(), ScriptedFetcher::serving(listing(&[E1, E2, E3])));

    let outcome = c.run_once().await.unwrap();
    assert_eq!(outcome.phase(), RunPhase::Reporting);
    let RunOutcome::Reporting { diff, report, .. } = &outcome else {
        unreachable!()
    };
    assert_eq!(diff.ids(), vec!["e3"]);
    assert_eq!(
        report,
        "Deliver meals on Fri., Jan. 03, (01/03/2025) , https://timecounts.org/food-bank/events/e3\n\n"
    );
    assert_eq!(c.store().count().await.unwrap(), 2);
    // the new capture is now the comparison point
    let latest = c.store().latest().await.unwrap().unwrap();
    assert!(latest.document.contains("Deliver meals"));
}

#[tokio::test]
async fn unchanged_listing_stores_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    seed(tmp.path(), &listing(&[E1, E2])).await;
    let c = controller(tmp.path(), ScriptedFetcher::serving(listing(&[E2, E1])));

    let outcome = c.run_once().await.unwrap();
    assert_eq!(outcome, RunOutcome::NoChange { events: 2 });
    assert_eq!(outcome.report(), None);
    assert_eq!(c.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn expired_events_alone_are_not_a_change() {
    let tmp = tempfile::tempdir().unwrap();
    seed(tmp.path(), &listing(&[E1, E2])).await;
    let c = controller(tmp.path(), ScriptedFetcher::serving(listing(&[E2])));

    let outcome = c.run_once().await.unwrap();
    assert_eq!(outcome.phase(), RunPhase::NoChange);
    assert_eq!(c.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn rejected_sign_in_fails_without_persisting() {
    let tmp = tempfile::tempdir().unwrap();
    let dump = tmp.path().join("post_login_result.html");
    let mut cfg = config(&tmp.path().join("store"));
    cfg.site.failed_login_dump = Some(dump.clone());
    let c = RunController::new(cfg, ScriptedFetcher::rejecting()).unwrap();

    let err = c.run_once().await.unwrap_err();
    assert!(matches!(err, WatchError::Auth(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(err.diagnostic().starts_with("error[auth]: "));
    assert!(err.to_string().contains(&dump.display().to_string()));
    assert_eq!(std::fs::read_to_string(&dump).unwrap(), SIGN_IN_PAGE);
    assert_eq!(c.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn page_without_required_text_is_a_fetch_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let c = controller(
        tmp.path(),
        ScriptedFetcher::serving("<html>maintenance</html>".into()),
    );
    let err = c.run_once().await.unwrap_err();
    assert_eq!(err.kind(), "fetch");
    assert_eq!(c.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn page_without_embedded_data_is_an_extraction_failure() {
    let tmp = tempfile::tempdir().unwrap();
    seed(tmp.path(), &listing(&[E1])).await;
    let c = controller(
        tmp.path(),
        ScriptedFetcher::serving("<html><h2>Events</h2>nothing embedded</html>".into()),
    );
    let err = c.run_once().await.unwrap_err();
    assert!(matches!(err, WatchError::Extraction(_)));
    assert_eq!(c.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn broken_previous_capture_fails_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    seed(tmp.path(), "<html>truncated capture</html>").await;
    let c = controller(tmp.path(), ScriptedFetcher::serving(listing(&[E1, E2])));

    let err = c.run_once().await.unwrap_err();
    assert_eq!(err.kind(), "extraction");
    assert_eq!(c.store().count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_sign_in_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let mut fetcher = ScriptedFetcher::serving(listing(&[E1]));
    fetcher.stall = Some(Duration::from_secs(600));
    let c = controller(tmp.path(), fetcher);

    let err = c.run_once().await.unwrap_err();
    assert!(matches!(err, WatchError::Auth(_)));
    assert!(err.to_string().contains("timed out after 15s"), "{err}");
}
