// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request intake.
//!
//! Turns the raw request body into a [`Submission`]: the ordered form
//! fields, the caller's origin and agent, and the untouched body bytes
//! that the relay forwards verbatim.

use crate::config::IntakeConfig;
use crate::error::GateError;
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart},
    http::{header, HeaderMap, Request},
};
use std::net::IpAddr;
use tracing::debug;

/// Origin used when neither the proxy header nor the peer address is known.
pub const UNKNOWN_ORIGIN: &str = "0.0.0.0";

const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Encoding of an inbound form body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormEncoding {
    UrlEncoded,
    Multipart,
}

impl FormEncoding {
    /// Classify a `Content-Type` value, ignoring parameters and case.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            URLENCODED => Some(Self::UrlEncoded),
            MULTIPART => Some(Self::Multipart),
            _ => None,
        }
    }
}

/// The original request body, kept for verbatim relay.
#[derive(Debug, Clone)]
pub struct FormBody {
    pub bytes: Bytes,
    pub content_type: String,
}

/// An inbound form submission.
#[derive(Debug, Clone)]
pub struct Submission {
    fields: Vec<(String, String)>,
    /// Names of multipart parts that carried a file
    file_parts: Vec<String>,
    /// Network address of the caller
    pub origin: String,
    /// Client identifier (`User-Agent`)
    pub agent: String,
    body: FormBody,
}

impl Submission {
    /// Assemble a submission from already parsed parts.
    pub fn new(
        fields: Vec<(String, String)>,
        origin: impl Into<String>,
        agent: impl Into<String>,
        body: FormBody,
    ) -> Self {
        Self {
            fields,
            file_parts: Vec::new(),
            origin: origin.into(),
            agent: agent.into(),
            body,
        }
    }

    /// Record names of file parts that arrived alongside the text fields.
    pub fn with_file_parts(mut self, names: Vec<String>) -> Self {
        self.file_parts = names;
        self
    }

    /// Parse a submission from request headers, peer address and body.
    pub async fn parse(
        config: &IntakeConfig,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        bytes: Bytes,
    ) -> Result<Self, GateError> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or(GateError::MalformedSubmission)?
            .to_string();

        let (fields, file_parts) = match FormEncoding::from_content_type(&content_type) {
            Some(FormEncoding::UrlEncoded) => (parse_urlencoded(&bytes), Vec::new()),
            Some(FormEncoding::Multipart) => parse_multipart(&content_type, bytes.clone()).await?,
            None => {
                debug!(content_type = %content_type, "Unsupported form encoding");
                return Err(GateError::MalformedSubmission);
            }
        };

        Ok(Self {
            fields,
            file_parts,
            origin: resolve_origin(headers, &config.client_ip_header, peer),
            agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            body: FormBody {
                bytes,
                content_type,
            },
        })
    }

    /// First value submitted for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// True when `name` arrived as a non-empty text field or as any file part.
    pub fn is_filled(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.is_empty())
            || self.file_parts.iter().any(|part| part == name)
    }

    /// Names of file parts, in submission order.
    pub fn file_parts(&self) -> &[String] {
        &self.file_parts
    }

    /// All text fields in submission order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// The body as received.
    pub fn body(&self) -> &FormBody {
        &self.body
    }
}

/// Caller address: proxy header first, then TCP peer, then `0.0.0.0`.
pub fn resolve_origin(headers: &HeaderMap, header_name: &str, peer: Option<IpAddr>) -> String {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

fn parse_urlencoded(bytes: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(bytes)
        .into_owned()
        .collect()
}

/// Text fields and file part names of a multipart body.
type MultipartParts = (Vec<(String, String)>, Vec<String>);

async fn parse_multipart(content_type: &str, bytes: Bytes) -> Result<MultipartParts, GateError> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .map_err(|_| GateError::MalformedSubmission)?;

    let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| {
        debug!(error = %e, "Rejected multipart body");
        GateError::MalformedSubmission
    })?;

    let mut fields = Vec::new();
    let mut file_parts = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!(error = %e, "Malformed multipart field");
        GateError::MalformedSubmission
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        // Contents stay in the relayed body; only the name is kept.
        if field.file_name().is_some() {
            file_parts.push(name);
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|_| GateError::MalformedSubmission)?;
        fields.push((name, value));
    }

    Ok((fields, file_parts))
}
