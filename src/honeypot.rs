// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Honeypot filter.
//!
//! Form fillers populate every input, including ones hidden from people.
//! A non-empty decoy field ends the pipeline with a quiet success.

use crate::submission::Submission;

#[derive(Debug, Clone)]
pub struct Honeypot {
    field: String,
}

impl Honeypot {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Name of the decoy field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// True when the decoy field is non-empty or was sent as a file.
    pub fn is_tripped(&self, submission: &Submission) -> bool {
        submission.is_filled(&self.field)
    }
}
