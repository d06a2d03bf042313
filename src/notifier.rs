// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Best-effort webhook notifier.
//!
//! Runs detached from the request: the caller's response never waits on
//! it, and every failure stops at this module's boundary.

use crate::clock::Clock;
use crate::config::WebhookConfig;
use crate::submission::Submission;
use chrono::SecondsFormat;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

/// Webhook delivery failure. Logged, never surfaced.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook answered {0}")]
    Status(u16),
}

/// Flat JSON record: every text field, then `ip`, `ua` and `when`.
pub fn build_record(submission: &Submission, clock: &dyn Clock) -> Map<String, Value> {
    let mut record = Map::new();
    for (name, value) in submission.fields() {
        record.insert(name.clone(), Value::String(value.clone()));
    }
    record.insert("ip".into(), Value::String(submission.origin.clone()));
    record.insert("ua".into(), Value::String(submission.agent.clone()));
    record.insert(
        "when".into(),
        Value::String(clock.now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    record
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("enabled", &self.webhook_url.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(client: reqwest::Client, config: &WebhookConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            webhook_url: config.url.clone(),
            timeout: config.timeout(),
            clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Spawn delivery of `submission` and return immediately.
    ///
    /// Returns `None` when no webhook is configured. The handle is only
    /// useful to tests; the pipeline drops it.
    pub fn dispatch(&self, submission: &Submission) -> Option<JoinHandle<()>> {
        let url = self.webhook_url.clone()?;
        let record = build_record(submission, self.clock.as_ref());
        let client = self.client.clone();
        let timeout = self.timeout;

        Some(tokio::spawn(async move {
            if let Err(e) = deliver(&client, &url, timeout, &record).await {
                debug!(error = %e, "Webhook notification dropped");
            }
        }))
    }
}

async fn deliver(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    record: &Map<String, Value>,
) -> Result<(), NotifyError> {
    let response = client.post(url).timeout(timeout).json(record).send().await?;
    if !response.status().is_success() {
        return Err(NotifyError::Status(response.status().as_u16()));
    }
    debug!("Webhook notified");
    Ok(())
}
