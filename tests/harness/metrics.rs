// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome tallies for abuse simulations.

use axum::http::StatusCode;
use std::collections::HashMap;

/// How the gatekeeper answered a simulated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Accepted,
    ClientRejected,
    RateLimited,
    Misconfigured,
    GatewayFailure,
    Other,
}

impl From<StatusCode> for Outcome {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => Self::Accepted,
            StatusCode::BAD_REQUEST => Self::ClientRejected,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::INTERNAL_SERVER_ERROR => Self::Misconfigured,
            StatusCode::BAD_GATEWAY => Self::GatewayFailure,
            _ => Self::Other,
        }
    }
}

/// Collects outcomes during a simulation.
#[derive(Debug, Default)]
pub struct AbuseMetrics {
    outcomes: HashMap<Outcome, usize>,
    per_origin: HashMap<String, HashMap<Outcome, usize>>,
}

impl AbuseMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, origin: &str, status: StatusCode) {
        let outcome = Outcome::from(status);
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        *self
            .per_origin
            .entry(origin.to_string())
            .or_default()
            .entry(outcome)
            .or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Count of `outcome` for one origin.
    pub fn count_for(&self, origin: &str, outcome: Outcome) -> usize {
        self.per_origin
            .get(origin)
            .and_then(|outcomes| outcomes.get(&outcome))
            .copied()
            .unwrap_or(0)
    }

    pub fn unique_origins(&self) -> usize {
        self.per_origin.len()
    }
}
