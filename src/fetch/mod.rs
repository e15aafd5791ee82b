// src/fetch/mod.rs
//! The authenticated page fetch the run depends on.
//!
//! The core only needs three calls: sign in, load a page within that session,
//! and ask whether the session is still signed in. Anything that can do that
//! (plain HTTP, a headless browser, a fixture in tests) plugs in here.

pub mod http;

use async_trait::async_trait;

use crate::config::Credentials;
use crate::error::WatchResult;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Session: Send;

    /// Submit the sign-in form. A transport failure is an `Auth` error; a
    /// rejected sign-in usually only shows up via [`Self::is_authenticated`].
    async fn authenticate(&self, login_url: &str, credentials: &Credentials) -> WatchResult<Self::Session>;

    /// Load `url` within the session and return its document text.
    async fn fetch(&self, session: &mut Self::Session, url: &str) -> WatchResult<String>;

    /// Judged on the page the session saw most recently.
    fn is_authenticated(&self, session: &Self::Session) -> bool;

    /// Most recent page text, for diagnosing failed sign-ins.
    fn last_page<'s>(&self, _session: &'s Self::Session) -> Option<&'s str> {
        None
    }
}
