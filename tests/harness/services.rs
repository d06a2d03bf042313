// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fake upstream services and app construction.

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use form_gatekeeper::clock::Clock;
use form_gatekeeper::config::Config;
use form_gatekeeper::handlers::{router, AppState};
use form_gatekeeper::pipeline::Gatekeeper;
use form_gatekeeper::store::QuotaStore;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SECRET: &str = "S";
pub const UPSTREAM_ID: &str = "xyzabc";

/// The three outbound dependencies, each backed by a mock server.
pub struct Upstreams {
    pub captcha: MockServer,
    pub relay: MockServer,
    pub webhook: MockServer,
}

impl Upstreams {
    pub async fn start() -> Self {
        Self {
            captcha: MockServer::start().await,
            relay: MockServer::start().await,
            webhook: MockServer::start().await,
        }
    }

    /// Fully configured gatekeeper pointing at the mocks.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.verification.endpoint = format!("{}/siteverify", self.captcha.uri());
        config.verification.secret = Some(SECRET.to_string());
        config.verification.timeout_ms = 2_000;
        config.relay.base_url = format!("{}/f", self.relay.uri());
        config.relay.upstream_id = Some(UPSTREAM_ID.to_string());
        config.relay.timeout_ms = 2_000;
        config.webhook.url = Some(format!("{}/hook", self.webhook.uri()));
        config.webhook.timeout_ms = 1_000;
        config
    }

    pub async fn captcha_accepts(&self) {
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })),
            )
            .mount(&self.captcha)
            .await;
    }

    pub async fn captcha_rejects(&self, codes: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error-codes": codes,
            })))
            .mount(&self.captcha)
            .await;
    }

    pub async fn relay_answers(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/f/{UPSTREAM_ID}")))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.relay)
            .await;
    }

    pub async fn webhook_answers(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.webhook)
            .await;
    }

    pub async fn captcha_calls(&self) -> usize {
        received(&self.captcha).await
    }

    pub async fn relay_calls(&self) -> usize {
        received(&self.relay).await
    }

    pub async fn webhook_calls(&self) -> usize {
        received(&self.webhook).await
    }

    /// Wait for detached webhook deliveries to land.
    pub async fn wait_for_webhook_calls(&self, expected: usize) -> usize {
        for _ in 0..50 {
            let seen = self.webhook_calls().await;
            if seen >= expected {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.webhook_calls().await
    }
}

async fn received(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or_default()
}

/// Build the router with the given store and clock.
pub fn app(config: Config, store: Option<Arc<dyn QuotaStore>>, clock: Arc<dyn Clock>) -> Router {
    let gatekeeper = Gatekeeper::with_clock(&config, store, clock);
    router(Arc::new(AppState { gatekeeper, config }))
}

/// Response status, headers and body text.
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

pub async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    Reply {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}
