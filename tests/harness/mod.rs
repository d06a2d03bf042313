// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for the form gatekeeper.
//!
//! Provides fake upstream services, instrumented quota stores and request
//! generators shared by the integration and abuse simulation suites.

#![allow(dead_code)]

pub mod generators;
pub mod metrics;
pub mod services;
pub mod stores;
