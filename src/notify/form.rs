use anyhow::{anyhow, Result};
use reqwest::Client;
use std::time::Duration;

use super::Notifier;
use crate::config::NotifyConfig;

/// Posts text as one url-encoded form field (e.g. a Google Form entry).
#[derive(Clone)]
pub struct FormNotifier {
    url: String,
    param: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl FormNotifier {
    pub fn new(url: String, param: String) -> Self {
        Self {
            url,
            param,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn from_config(cfg: &NotifyConfig) -> Self {
        Self::new(cfg.url.clone(), cfg.param.clone())
            .with_timeout(cfg.timeout_secs)
            .with_retries(cfg.retries)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for FormNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let form = [(self.param.as_str(), text)];

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .form(&form)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("form endpoint HTTP error: {e}"),
                },
                Err(e) => anyhow!("form submission failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::warn!(attempt, error = %err, "form submission failed; retrying");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}
