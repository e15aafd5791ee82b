// src/fetch/http.rs
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;

use super::PageFetcher;
use crate::config::{Credentials, SiteConfig};
use crate::error::{WatchError, WatchResult};

/// Cookie-carrying reqwest client that signs in through the login form.
pub struct HttpFetcher {
    client: Client,
    signed_out_marker: String,
}

#[derive(Debug, Default)]
pub struct HttpSession {
    last_url: String,
    last_page: String,
}

impl HttpSession {
    /// Where the last request ended up after redirects.
    pub fn last_url(&self) -> &str {
        &self.last_url
    }
}

impl HttpFetcher {
    pub fn from_config(site: &SiteConfig) -> WatchResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(&site.user_agent)
            .timeout(site.fetch_timeout())
            .build()
            .map_err(|e| WatchError::Config(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            signed_out_marker: site.signed_out_marker.clone(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// `<meta name="csrf-token" content="...">`, if the login page carries one.
fn csrf_token(page: &str) -> Option<String> {
    static RE_CSRF: OnceCell<Regex> = OnceCell::new();
    let re = RE_CSRF.get_or_init(|| {
        Regex::new(r#"<meta\s+name="csrf-token"\s+content="([^"]+)""#).expect("static csrf regex")
    });
    re.captures(page).map(|c| c[1].to_string())
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    type Session = HttpSession;

    async fn authenticate(&self, login_url: &str, credentials: &Credentials) -> WatchResult<HttpSession> {
        let login_page = self
            .get_text(login_url)
            .await
            .map_err(|e| WatchError::Auth(format!("loading {login_url}: {e}")))?;

        let mut form: Vec<(&str, String)> = vec![
            ("email", credentials.username.clone()),
            ("password", credentials.password.clone()),
        ];
        if let Some(token) = csrf_token(&login_page) {
            form.push(("authenticity_token", token));
        }

        let resp = self
            .client
            .post(login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| WatchError::Auth(format!("submitting sign-in form: {e}")))?;
        let last_url = resp.url().to_string();
        let last_page = resp
            .text()
            .await
            .map_err(|e| WatchError::Auth(format!("reading sign-in response: {e}")))?;
        tracing::debug!(url = %last_url, "sign-in form submitted");

        Ok(HttpSession { last_url, last_page })
    }

    async fn fetch(&self, session: &mut HttpSession, url: &str) -> WatchResult<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WatchError::Fetch(format!("GET {url}: {e}")))?;
        session.last_url = resp.url().to_string();
        session.last_page = resp
            .text()
            .await
            .map_err(|e| WatchError::Fetch(format!("reading {url}: {e}")))?;
        tracing::debug!(requested = %url, landed = %session.last_url(), "page fetched");
        Ok(session.last_page.clone())
    }

    fn is_authenticated(&self, session: &HttpSession) -> bool {
        !session.last_page.contains(&self.signed_out_marker)
    }

    fn last_page<'s>(&self, session: &'s HttpSession) -> Option<&'s str> {
        Some(session.last_page.as_str())
    }
}
