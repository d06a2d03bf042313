// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Form Gatekeeper
//!
//! This crate sits between a public web form and the paid services behind
//! it, admitting a submission only after an ordered set of checks:
//!
//! - Honeypot decoy field (quiet success for bots)
//! - CAPTCHA site-verify call
//! - Per-origin sliding-window quota (fails open on store errors)
//! - Synchronous relay to the upstream form processor
//! - Best-effort webhook notification

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod honeypot;
pub mod notifier;
pub mod pipeline;
pub mod quota;
pub mod relay;
pub mod store;
pub mod submission;
pub mod verifier;

pub use config::Config;
pub use error::GateError;
pub use pipeline::{Admission, Gatekeeper};
pub use quota::{QuotaAccountant, QuotaDecision, QuotaState};
pub use store::{MemoryStore, QuotaStore};
pub use submission::Submission;
