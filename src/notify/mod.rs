// src/notify/mod.rs
//! Relaying a finished watch run to a human.
//!
//! The watch binary keeps stdout for the change report and stderr for
//! diagnostics; this side reads both plus the exit status and decides what,
//! if anything, to send.

pub mod form;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::config::{NotifyConfig, WatchConfig};

pub use form::FormNotifier;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// What a finished run asks to be forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relay {
    /// Non-zero exit: the diagnostic output.
    Failure(String),
    /// Clean exit with a change report on stdout.
    Change(String),
}

impl Relay {
    pub fn text(&self) -> &str {
        match self {
            Self::Failure(t) | Self::Change(t) => t,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Failure(_) => "failure",
            Self::Change(_) => "change",
        }
    }
}

/// Failure → stderr; success with more than a stray character on stdout →
/// stdout; anything else is a quiet run.
pub fn select_message(success: bool, stdout: &str, stderr: &str) -> Option<Relay> {
    if !success {
        let text = if stderr.trim().is_empty() {
            "opportunity-watch failed without diagnostic output".to_string()
        } else {
            stderr.to_string()
        };
        return Some(Relay::Failure(text));
    }
    if stdout.len() > 1 {
        return Some(Relay::Change(stdout.to_string()));
    }
    None
}

/// Send the selected message, if any. Returns what was sent.
pub async fn relay<N: Notifier + ?Sized>(
    notifier: &N,
    success: bool,
    stdout: &str,
    stderr: &str,
) -> Result<Option<Relay>> {
    let Some(msg) = select_message(success, stdout, stderr) else {
        tracing::debug!("quiet run; nothing to relay");
        return Ok(None);
    };
    notifier
        .send(msg.text())
        .await
        .with_context(|| format!("relaying {} message", msg.label()))?;
    tracing::info!(kind = msg.label(), bytes = msg.text().len(), "run relayed");
    Ok(Some(msg))
}

/// Reads only the `[notify]` section; credentials are the watch run's concern.
pub fn load_notify_config(path: &Path) -> Result<NotifyConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let cfg = WatchConfig::from_toml_str(&content)?;
    cfg.notify
        .ok_or_else(|| anyhow!("{} has no [notify] section (url, param)", path.display()))
}

/// The configured watch binary, or `opportunity-watch` next to this executable.
pub fn watch_binary(cfg: &NotifyConfig) -> Result<PathBuf> {
    if let Some(p) = &cfg.watch_bin {
        return Ok(p.clone());
    }
    let me = std::env::current_exe().context("locating current executable")?;
    Ok(me.with_file_name(format!(
        "opportunity-watch{}",
        std::env::consts::EXE_SUFFIX
    )))
}
