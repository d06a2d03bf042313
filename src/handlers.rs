// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the form gatekeeper service.

use crate::config::Config;
use crate::pipeline::{Admission, Gatekeeper};
use crate::submission::Submission;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pub gatekeeper: Gatekeeper,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "form-gatekeeper",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Admission endpoint for form posts.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let peer_ip = peer.map(|ConnectInfo(addr)| addr.ip());

    let submission =
        match Submission::parse(&state.config.intake, &headers, peer_ip, body).await {
            Ok(submission) => submission,
            Err(err) => {
                info!(peer = ?peer_ip, code = err.code(), "Unreadable submission");
                return err.into_response();
            }
        };

    match state.gatekeeper.admit(&submission).await {
        Ok(Admission::Decoy) | Ok(Admission::Relayed) => (StatusCode::OK, "OK").into_response(),
        Err(err) => {
            if err.status().is_server_error() {
                warn!(
                    origin = %submission.origin,
                    code = err.code(),
                    error = %err,
                    "Submission failed"
                );
            } else {
                info!(origin = %submission.origin, code = err.code(), "Submission refused");
            }
            err.into_response()
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let router = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/submit", post(submit));

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::POST, Method::OPTIONS]),
    )
}
