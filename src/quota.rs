// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window quota accounting per origin.
//!
//! Each origin's state is a list of hit timestamps kept in an external
//! store. On every request the list is trimmed to the trailing window
//! before counting, so stale hits never carry forward.
//!
//! ## Concurrency
//!
//! The read-trim-write sequence is not transactional. Two concurrent
//! requests from one origin can both read the same state, both find room,
//! and both write, letting a burst exceed the limit by a small margin.
//! That relaxation is accepted; an atomic variant would need
//! compare-and-swap support from the store.
//!
//! ## Store failures
//!
//! An unreachable store or an unreadable record lets the submission through
//! without accounting. Availability for legitimate users wins over strict
//! enforcement here.

use crate::clock::Clock;
use crate::config::QuotaConfig;
use crate::store::QuotaStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Persisted per-origin record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Hit timestamps in epoch milliseconds, oldest first
    #[serde(default)]
    pub hits: Vec<i64>,
}

/// A stored hit too far from the current time to reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("hit timestamp {0} is out of range")]
pub struct HitOutOfRange(pub i64);

impl QuotaState {
    /// Keep only hits younger than `window_ms` relative to `now_ms`.
    ///
    /// Fails without touching the state if any hit's age or expiry
    /// overflows.
    pub fn slide(&mut self, now_ms: i64, window_ms: i64) -> Result<(), HitOutOfRange> {
        if let Some(&ts) = self
            .hits
            .iter()
            .find(|&&ts| now_ms.checked_sub(ts).is_none() || ts.checked_add(window_ms).is_none())
        {
            return Err(HitOutOfRange(ts));
        }

        self.hits.retain(|&ts| now_ms - ts < window_ms);
        self.hits.sort_unstable();
        Ok(())
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Hit recorded
    Admitted {
        /// Hits in the window, including this one
        hits: usize,
        /// Submissions left before the limit
        remaining: u32,
    },
    /// Origin is at its limit; nothing was written
    Limited {
        /// Time until the oldest hit leaves the window
        retry_after: Duration,
    },
    /// Store failed; submission proceeds unaccounted
    Bypassed { reason: String },
}

/// Sliding-window accountant over a [`QuotaStore`].
#[derive(Clone)]
pub struct QuotaAccountant {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    config: QuotaConfig,
}

impl std::fmt::Debug for QuotaAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaAccountant")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QuotaAccountant {
    pub fn new(store: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>, config: QuotaConfig) -> Self {
        if config.retention() <= config.window() {
            warn!(
                window_secs = config.window().as_secs(),
                retention_secs = config.retention().as_secs(),
                "Quota retention does not outlive the window; hits may be forgotten early"
            );
        }
        Self {
            store,
            clock,
            config,
        }
    }

    /// Store key for an origin.
    pub fn key(&self, origin: &str) -> String {
        format!("{}{}", self.config.key_prefix, origin)
    }

    /// Count a submission from `origin` against its quota.
    pub async fn charge(&self, origin: &str) -> QuotaDecision {
        let key = self.key(origin);
        let now = self.clock.now_ms();
        let window_ms = i64::try_from(self.config.window().as_millis()).unwrap_or(i64::MAX);

        let raw = match self.store.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(origin = %origin, error = %e, "Quota store read failed; failing open");
                return QuotaDecision::Bypassed {
                    reason: e.to_string(),
                };
            }
        };

        let mut state = match raw.as_deref().map(serde_json::from_str::<QuotaState>) {
            None => QuotaState::default(),
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                warn!(origin = %origin, error = %e, "Unreadable quota record; failing open");
                return QuotaDecision::Bypassed {
                    reason: e.to_string(),
                };
            }
        };

        if let Err(e) = state.slide(now, window_ms) {
            warn!(origin = %origin, error = %e, "Unreadable quota record; failing open");
            return QuotaDecision::Bypassed {
                reason: e.to_string(),
            };
        }

        let limit = self.config.limit as usize;
        if state.hits.len() >= limit {
            let retry_after = state
                .hits
                .first()
                .map(|&oldest| (oldest + window_ms).saturating_sub(now))
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.config.window());
            info!(
                origin = %origin,
                hits = state.hits.len(),
                limit,
                retry_after_secs = retry_after.as_secs(),
                "Quota exceeded"
            );
            return QuotaDecision::Limited { retry_after };
        }

        state.hits.push(now);
        let hits = state.hits.len();

        let encoded = match serde_json::to_string(&state) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(origin = %origin, error = %e, "Could not encode quota record; failing open");
                return QuotaDecision::Bypassed {
                    reason: e.to_string(),
                };
            }
        };

        if let Err(e) = self.store.put(&key, encoded, self.config.retention()).await {
            warn!(origin = %origin, error = %e, "Quota store write failed; failing open");
            return QuotaDecision::Bypassed {
                reason: e.to_string(),
            };
        }

        let remaining = (limit - hits) as u32;
        debug!(origin = %origin, hits, remaining, "Quota hit recorded");
        QuotaDecision::Admitted { hits, remaining }
    }
}
