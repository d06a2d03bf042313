// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request generators.

use axum::body::Body;
use axum::http::{header, Request};

pub const FORM: &str = "application/x-www-form-urlencoded";

/// `count` distinct IPv4 origins in 10.0.0.0/8.
pub fn generate_ips(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let i = i as u32 + 1;
            format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff)
        })
        .collect()
}

/// A human-looking submission with a CAPTCHA token.
pub fn human_form(token: &str) -> String {
    format!("name=Ada+Lovelace&email=ada%40example.org&message=Hello&_hp=&h-captcha-response={token}")
}

/// A submission as a form-filling bot would send it.
pub fn bot_form() -> String {
    "name=Buy+now&email=spam%40example.com&message=cheap&_hp=http%3A%2F%2Fspam.example&h-captcha-response=forged"
        .to_string()
}

/// POST /submit from `origin` with an url-encoded `body`.
pub fn submit_request(origin: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/submit")
        .header(header::CONTENT_TYPE, FORM)
        .header(header::USER_AGENT, "harness/1.0")
        .header("CF-Connecting-IP", origin)
        .body(Body::from(body.into()))
        .expect("valid request")
}
