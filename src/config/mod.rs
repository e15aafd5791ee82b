// src/config/mod.rs
//! Run configuration: one TOML file plus env overrides for the credentials.
//!
//! Every former hardcoded constant (URLs, zones, directory, retention) lives
//! here with a documented default, and the resolved [`WatchConfig`] is handed
//! to the run controller at construction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{WatchError, WatchResult};

/// Env var naming the config file when no CLI argument is given.
pub const ENV_CONFIG_PATH: &str = "OPPORTUNITY_WATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/opportunities.toml";

const ENV_USERNAME: &str = "OPPORTUNITIES_USERNAME";
const ENV_PASSWORD: &str = "OPPORTUNITIES_PASSWORD";
const ENV_ORG: &str = "OPPORTUNITIES_ORG";

fn default_login_url() -> String {
    "https://timecounts.org/login".into()
}
fn default_listing_url() -> String {
    "https://timecounts.org/{org}/opportunities/events".into()
}
fn default_event_url() -> String {
    "https://timecounts.org/{org}/events/{id}".into()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 12_4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/103.0.0.0 Safari/537.36".into()
}
fn default_required_marker() -> String {
    "Events".into()
}
fn default_signed_out_marker() -> String {
    "Sign in to Timecounts".into()
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_payload_pattern() -> String {
    r"var App = window.App = new TimecountsApp\((.*)\);".into()
}
fn default_models_path() -> Vec<String> {
    vec!["dehydrated_store".into(), "api".into(), "models".into()]
}
fn default_record_prefix() -> String {
    "Event".into()
}
fn default_source_zone() -> String {
    "UTC".into()
}
fn default_display_zone() -> String {
    "America/Los_Angeles".into()
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("opportunities")
}
fn default_file_prefix() -> String {
    "opportunities-".into()
}
fn default_file_extension() -> String {
    "html".into()
}
fn default_max_retained() -> usize {
    24
}
fn default_confirm_timeout_secs() -> u64 {
    10
}
fn default_confirm_poll_secs() -> u64 {
    1
}
fn default_notify_timeout_secs() -> u64 {
    10
}
fn default_notify_retries() -> u8 {
    3
}

#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Organization slug as it appears in listing URLs (lower case, hyphens).
    #[serde(default)]
    pub org: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            org: org.into(),
        }
    }
}

// Keep the password out of logs and panics.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("org", &self.org)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Listing page template; `{org}` is substituted.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    /// Event page template; `{org}` and `{id}` are substituted.
    #[serde(default = "default_event_url")]
    pub event_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Text a valid listing page must contain.
    #[serde(default = "default_required_marker")]
    pub required_marker: String,
    /// Text that only appears when the session was bounced to the sign-in page.
    #[serde(default = "default_signed_out_marker")]
    pub signed_out_marker: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Where to drop the page seen after a failed sign-in, if anywhere.
    #[serde(default)]
    pub failed_login_dump: Option<PathBuf>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            listing_url: default_listing_url(),
            event_url: default_event_url(),
            user_agent: default_user_agent(),
            required_marker: default_required_marker(),
            signed_out_marker: default_signed_out_marker(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            failed_login_dump: None,
        }
    }
}

impl SiteConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    /// Regex with exactly one capture group around the embedded JSON payload.
    #[serde(default = "default_payload_pattern")]
    pub payload_pattern: String,
    /// Object keys leading from the payload root to the model collection.
    #[serde(default = "default_models_path")]
    pub models_path: Vec<String>,
    /// Model keys starting with this prefix are events.
    #[serde(default = "default_record_prefix")]
    pub record_prefix: String,
    /// IANA zone the naive `start_at` values are expressed in.
    #[serde(default = "default_source_zone")]
    pub source_zone: String,
    /// IANA zone used when presenting start times.
    #[serde(default = "default_display_zone")]
    pub display_zone: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            payload_pattern: default_payload_pattern(),
            models_path: default_models_path(),
            record_prefix: default_record_prefix(),
            source_zone: default_source_zone(),
            display_zone: default_display_zone(),
        }
    }
}

impl ExtractConfig {
    pub fn source_tz(&self) -> WatchResult<Tz> {
        parse_zone("source_zone", &self.source_zone)
    }

    pub fn display_tz(&self) -> WatchResult<Tz> {
        parse_zone("display_zone", &self.display_zone)
    }
}

fn parse_zone(field: &str, name: &str) -> WatchResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| WatchError::Config(format!("{field}: unknown time zone {name:?}")))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_confirm_poll_secs")]
    pub confirm_poll_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            file_prefix: default_file_prefix(),
            file_extension: default_file_extension(),
            max_retained: default_max_retained(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            confirm_poll_secs: default_confirm_poll_secs(),
        }
    }
}

impl StoreConfig {
    /// Store rooted at `dir` with every other setting at its default.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn confirm_poll(&self) -> Duration {
        Duration::from_secs(self.confirm_poll_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Form endpoint receiving the report or the failure text.
    pub url: String,
    /// Form field name carrying the text.
    pub param: String,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_notify_retries")]
    pub retries: u8,
    /// Path of the `opportunity-watch` binary; defaults to the sibling executable.
    #[serde(default)]
    pub watch_bin: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

impl WatchConfig {
    /// Defaults everywhere, with the given credentials and store directory.
    pub fn new(credentials: Credentials, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            site: SiteConfig::default(),
            extract: ExtractConfig::default(),
            store: StoreConfig::in_dir(store_dir),
            notify: None,
        }
    }

    /// Parse TOML text without touching env or validating.
    pub fn from_toml_str(s: &str) -> WatchResult<Self> {
        toml::from_str(s).map_err(|e| WatchError::Config(format!("malformed config: {e}")))
    }

    /// Read, apply env overrides, and validate.
    pub fn load_from(path: &Path) -> WatchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WatchError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        tracing::debug!(
            path = %path.display(),
            org = %cfg.credentials.org,
            store = %cfg.store.dir.display(),
            "config loaded"
        );
        Ok(cfg)
    }

    /// Non-empty credential env vars win over the file.
    pub fn apply_env_overrides(&mut self) {
        let pick = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = pick(ENV_USERNAME) {
            self.credentials.username = v;
        }
        if let Some(v) = pick(ENV_PASSWORD) {
            self.credentials.password = v;
        }
        if let Some(v) = pick(ENV_ORG) {
            self.credentials.org = v;
        }
    }

    pub fn validate(&self) -> WatchResult<()> {
        let c = &self.credentials;
        let missing: Vec<&str> = [
            ("username", c.username.as_str()),
            ("password", c.password.as_str()),
            ("org", c.org.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(WatchError::Config(format!(
                "[credentials] is missing {} (or set {ENV_USERNAME}/{ENV_PASSWORD}/{ENV_ORG})",
                missing.join(", ")
            )));
        }

        self.extract.source_tz()?;
        self.extract.display_tz()?;
        regex::Regex::new(&self.extract.payload_pattern)
            .map_err(|e| WatchError::Config(format!("payload_pattern: {e}")))?;
        if self.extract.models_path.is_empty() {
            return Err(WatchError::Config("models_path must not be empty".into()));
        }
        if self.store.max_retained == 0 {
            return Err(WatchError::Config("max_retained must be at least 1".into()));
        }
        if self.store.file_prefix.is_empty() || self.store.file_extension.is_empty() {
            return Err(WatchError::Config(
                "file_prefix and file_extension must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn listing_url(&self) -> String {
        self.site.listing_url.replace("{org}", &self.credentials.org)
    }

    pub fn event_url(&self, id: &str) -> String {
        self.site
            .event_url
            .replace("{org}", &self.credentials.org)
            .replace("{id}", id)
    }
}

/// Config path resolution: explicit argument, then $OPPORTUNITY_WATCH_CONFIG,
/// then `config/opportunities.toml`.
pub fn resolve_config_path(arg: Option<PathBuf>) -> PathBuf {
    if let Some(p) = arg {
        return p;
    }
    std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const MINIMAL: &str = r#"
[credentials]
username = "me@example.org"
password = "hunter2"
org = "food-bank"
"#;

    fn clear_env() {
        env::remove_var(ENV_USERNAME);
        env::remove_var(ENV_PASSWORD);
        env::remove_var(ENV_ORG);
    }

    #[test]
    fn defaults_fill_every_optional_section() {
        let cfg = WatchConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.store.max_retained, 24);
        assert_eq!(cfg.store.confirm_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.site.fetch_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.extract.record_prefix, "Event");
        assert_eq!(cfg.extract.display_tz().unwrap(), chrono_tz::America::Los_Angeles);
        assert!(cfg.notify.is_none());
        assert_eq!(
            cfg.listing_url(),
            "https://timecounts.org/food-bank/opportunities/events"
        );
        assert_eq!(
            cfg.event_url("42"),
            "https://timecounts.org/food-bank/events/42"
        );
    }

    #[test]
    fn unknown_zone_is_a_config_error() {
        let toml = format!("{MINIMAL}\n[extract]\ndisplay_zone = \"Mars/Olympus\"\n");
        let cfg = WatchConfig::from_toml_str(&toml).unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = WatchConfig::from_toml_str("[credentials\nusername=").unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn debug_output_redacts_password() {
        let c = Credentials::new("u", "s3cret", "o");
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[serial_test::serial]
    #[test]
    fn missing_credentials_name_the_fields() {
        clear_env();
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("opportunities.toml");
        fs::write(&p, "[credentials]\nusername = \"me\"\n").unwrap();

        let err = WatchConfig::load_from(&p).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("password"), "{msg}");
        assert!(msg.contains("org"), "{msg}");
        assert!(!msg.contains("username,"), "{msg}");
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_win_over_file() {
        clear_env();
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("opportunities.toml");
        fs::write(&p, MINIMAL).unwrap();

        env::set_var(ENV_PASSWORD, "from-env");
        env::set_var(ENV_ORG, "   ");
        let cfg = WatchConfig::load_from(&p).unwrap();
        assert_eq!(cfg.credentials.password, "from-env");
        // blank env values do not clobber the file
        assert_eq!(cfg.credentials.org, "food-bank");
        clear_env();
    }

    #[serial_test::serial]
    #[test]
    fn config_path_prefers_argument_then_env() {
        env::remove_var(ENV_CONFIG_PATH);
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));

        env::set_var(ENV_CONFIG_PATH, "/etc/watch.toml");
        assert_eq!(resolve_config_path(None), PathBuf::from("/etc/watch.toml"));
        assert_eq!(
            resolve_config_path(Some(PathBuf::from("local.toml"))),
            PathBuf::from("local.toml")
        );
        env::remove_var(ENV_CONFIG_PATH);
    }
}
