// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The admission pipeline.
//!
//! Stages run strictly in order and any of them may end the request:
//!
//! ```text
//! honeypot -> config pre-flight -> verification -> quota -> relay -> notify
//! ```
//!
//! - A tripped honeypot answers with a quiet success and touches nothing else.
//! - Verification runs before quota so bots never spend an origin's allowance,
//!   and before relay so unverified traffic never reaches the paid upstream.
//! - Quota fails open when its store misbehaves.
//! - The notifier is fire-and-forget once the upstream has answered.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::GateError;
use crate::honeypot::Honeypot;
use crate::notifier::Notifier;
use crate::quota::{QuotaAccountant, QuotaDecision};
use crate::relay::RelayForwarder;
use crate::store::QuotaStore;
use crate::submission::Submission;
use crate::verifier::CaptchaVerifier;
use std::sync::Arc;
use tracing::{debug, info};

/// Successful end of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Honeypot tripped; answered as if accepted
    Decoy,
    /// Verified, counted and accepted by the upstream
    Relayed,
}

/// Runs a [`Submission`] through every stage.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    honeypot: Honeypot,
    token_field: String,
    verifier: CaptchaVerifier,
    quota: Option<QuotaAccountant>,
    relay: RelayForwarder,
    notifier: Notifier,
}

impl Gatekeeper {
    /// Wire the stages from configuration and a bound quota store.
    pub fn new(config: &Config, store: Option<Arc<dyn QuotaStore>>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Like [`Gatekeeper::new`] with an explicit clock.
    pub fn with_clock(
        config: &Config,
        store: Option<Arc<dyn QuotaStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let client = reqwest::Client::new();

        Self {
            honeypot: Honeypot::new(config.intake.honeypot_field.clone()),
            token_field: config.intake.token_field.clone(),
            verifier: CaptchaVerifier::new(client.clone(), &config.verification),
            quota: store
                .map(|store| QuotaAccountant::new(store, clock.clone(), config.quota.clone())),
            relay: RelayForwarder::new(client.clone(), &config.relay),
            notifier: Notifier::new(client, &config.webhook, clock),
        }
    }

    /// Run the pipeline for one submission.
    pub async fn admit(&self, submission: &Submission) -> Result<Admission, GateError> {
        if self.honeypot.is_tripped(submission) {
            info!(
                origin = %submission.origin,
                field = %self.honeypot.field(),
                "Honeypot tripped; discarding submission"
            );
            return Ok(Admission::Decoy);
        }

        // Both settings are checked before any outbound call.
        self.verifier.ensure_configured()?;
        self.relay.endpoint()?;

        self.verifier
            .verify(submission.get(&self.token_field), &submission.origin)
            .await?;

        match &self.quota {
            Some(quota) => match quota.charge(&submission.origin).await {
                QuotaDecision::Limited { retry_after } => {
                    return Err(GateError::RateLimited { retry_after });
                }
                QuotaDecision::Admitted { remaining, .. } => {
                    debug!(origin = %submission.origin, remaining, "Within quota");
                }
                QuotaDecision::Bypassed { .. } => {}
            },
            None => debug!("No quota store bound; skipping accounting"),
        }

        let outcome = self.relay.forward(submission.body()).await?;

        // Detached; its handle is intentionally dropped.
        let _ = self.notifier.dispatch(submission);

        outcome.into_result()?;
        Ok(Admission::Relayed)
    }
}
