// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Relay forwarder.
//!
//! Posts the accepted submission's original body to the upstream form
//! processor and reports how it answered. No retries.

use crate::config::RelayConfig;
use crate::error::{GateError, MissingSetting};
use crate::submission::FormBody;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::{info, warn};

/// How the upstream answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub ok: bool,
    pub status: u16,
    pub body_text: String,
}

impl RelayOutcome {
    /// Turn a non-success answer into the pipeline's gateway error.
    pub fn into_result(self) -> Result<(), GateError> {
        if self.ok {
            Ok(())
        } else {
            Err(GateError::UpstreamRejected {
                status: self.status,
                body: self.body_text,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayForwarder {
    client: reqwest::Client,
    base_url: String,
    upstream_id: Option<String>,
    timeout: Duration,
}

impl RelayForwarder {
    pub fn new(client: reqwest::Client, config: &RelayConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            upstream_id: config.upstream_id.clone(),
            timeout: config.timeout(),
        }
    }

    /// Upstream URL, or a configuration error when no id is set.
    pub fn endpoint(&self) -> Result<String, GateError> {
        let id = self
            .upstream_id
            .as_deref()
            .ok_or(GateError::Configuration(MissingSetting::UpstreamId))?;
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), id))
    }

    /// Forward `body` verbatim to the upstream.
    pub async fn forward(&self, body: &FormBody) -> Result<RelayOutcome, GateError> {
        let endpoint = self.endpoint()?;

        let response = self
            .client
            .post(&endpoint)
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, &body.content_type)
            .body(body.bytes.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Upstream relay request failed");
                GateError::UpstreamUnreachable {
                    detail: e.to_string(),
                }
            })?;

        let status = response.status();
        let body_text = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        if status.is_success() {
            info!(status = status.as_u16(), "Submission relayed");
        } else {
            warn!(status = status.as_u16(), "Upstream rejected submission");
        }

        Ok(RelayOutcome {
            ok: status.is_success(),
            status: status.as_u16(),
            body_text,
        })
    }
}
