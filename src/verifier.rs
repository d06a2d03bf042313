// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CAPTCHA verification gate.
//!
//! Checks run in a fixed order so that nothing reaches the network unless it
//! can succeed: secret configured, token present, then one site-verify call.

use crate::config::VerificationConfig;
use crate::error::{GateError, MissingSetting};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome reported by the site-verify endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    pub success: bool,
    pub error_codes: Vec<String>,
}

impl VerificationResult {
    /// Read a site-verify reply.
    ///
    /// Only `"success": true` passes. A missing, `null` or non-boolean
    /// `success` is a rejection, and `error-codes` that is not an array
    /// contributes no codes.
    pub fn from_json(reply: &Value) -> Self {
        let success = reply
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let error_codes = reply
            .get("error-codes")
            .and_then(Value::as_array)
            .map(|codes| {
                codes
                    .iter()
                    .map(|code| match code {
                        Value::String(code) => code.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            success,
            error_codes,
        }
    }

    /// Error codes joined for display, or `unknown` when none were given.
    pub fn joined_codes(&self) -> String {
        if self.error_codes.is_empty() {
            "unknown".to_string()
        } else {
            self.error_codes.join(", ")
        }
    }
}

/// Client for the CAPTCHA provider's site-verify endpoint.
#[derive(Clone)]
pub struct CaptchaVerifier {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for CaptchaVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptchaVerifier")
            .field("endpoint", &self.endpoint)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CaptchaVerifier {
    pub fn new(client: reqwest::Client, config: &VerificationConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            secret: config.secret.clone(),
            timeout: config.timeout(),
        }
    }

    /// Fail with a configuration error if no secret is available.
    pub fn ensure_configured(&self) -> Result<&str, GateError> {
        self.secret
            .as_deref()
            .ok_or(GateError::Configuration(MissingSetting::VerificationSecret))
    }

    /// Verify `token` for a caller at `origin`.
    pub async fn verify(&self, token: Option<&str>, origin: &str) -> Result<(), GateError> {
        let secret = self.ensure_configured()?;

        let token = token.map(str::trim).unwrap_or_default();
        if token.is_empty() {
            debug!(origin = %origin, "Submission carries no captcha token");
            return Err(GateError::MissingToken);
        }

        let params = [("secret", secret), ("response", token), ("remoteip", origin)];

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Captcha verification request failed");
                GateError::VerificationUnreachable {
                    detail: e.to_string(),
                }
            })?;

        let reply: Value = response.json().await.map_err(|e| {
            warn!(error = %e, "Captcha verification returned an unreadable body");
            GateError::VerificationUnreachable {
                detail: e.to_string(),
            }
        })?;
        let result = VerificationResult::from_json(&reply);

        if !result.success {
            let codes = result.joined_codes();
            info!(origin = %origin, codes = %codes, "Captcha rejected");
            return Err(GateError::VerificationRejected { codes });
        }

        debug!(origin = %origin, "Captcha verified");
        Ok(())
    }
}
