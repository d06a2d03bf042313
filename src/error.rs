// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the admission pipeline.
//!
//! Every variant terminates the pipeline and maps to a fixed status code.
//! Bodies are plain text so the form page can show them as-is.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// Deployment setting whose absence makes a request unserviceable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSetting {
    VerificationSecret,
    UpstreamId,
}

impl std::fmt::Display for MissingSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VerificationSecret => write!(f, "captcha secret"),
            Self::UpstreamId => write!(f, "upstream id"),
        }
    }
}

/// Pipeline failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Server not configured ({0}).")]
    Configuration(MissingSetting),

    #[error("Invalid form submission.")]
    MalformedSubmission,

    #[error("Captcha required")]
    MissingToken,

    #[error("Captcha failed ({codes})")]
    VerificationRejected { codes: String },

    #[error("Captcha verification unreachable.")]
    VerificationUnreachable { detail: String },

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after: Duration },

    #[error("Upstream error")]
    UpstreamUnreachable { detail: String },

    #[error("{}", upstream_message(.body))]
    UpstreamRejected { status: u16, body: String },
}

fn upstream_message(body: &str) -> &str {
    if body.is_empty() {
        "Upstream error"
    } else {
        body
    }
}

impl GateError {
    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedSubmission
            | Self::MissingToken
            | Self::VerificationRejected { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::VerificationUnreachable { .. }
            | Self::UpstreamUnreachable { .. }
            | Self::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short machine-readable tag used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::MalformedSubmission => "MALFORMED_SUBMISSION",
            Self::MissingToken => "MISSING_TOKEN",
            Self::VerificationRejected { .. } => "VERIFICATION_REJECTED",
            Self::VerificationUnreachable { .. } => "VERIFICATION_UNREACHABLE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::UpstreamUnreachable { .. } => "UPSTREAM_UNREACHABLE",
            Self::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.to_string();

        match self {
            Self::RateLimited { retry_after } => {
                // Round up so clients never retry inside the window.
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
