// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Form Gatekeeper Service
//!
//! Admits form posts on `POST /submit` after a honeypot check, CAPTCHA
//! verification and a per-origin quota, then relays them upstream and
//! notifies an optional webhook.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env`):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `VERIFICATION_SECRET`: CAPTCHA secret (required; 500 when missing)
//! - `UPSTREAM_ID`: Upstream form id (required; 500 when missing)
//! - `WEBHOOK_URL`: Optional notification webhook
//! - `QUOTA_STORE_URL`: `memory` or `redis://...` (absent: no quota)
//! - `QUOTA_LIMIT`: Submissions per origin per window (default: 5)
//! - `QUOTA_WINDOW_SECS`: Sliding window length (default: 3600)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use form_gatekeeper::{
    config::Config,
    handlers::{router, AppState},
    pipeline::Gatekeeper,
    store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        quota_limit = config.quota.limit,
        quota_window_secs = config.quota.window_secs,
        verification_configured = config.verification.secret.is_some(),
        upstream_configured = config.relay.upstream_id.is_some(),
        webhook_configured = config.webhook.url.is_some(),
        "Starting form gatekeeper"
    );

    let store = store::connect(config.quota.store_url.as_deref()).await;
    let gatekeeper = Gatekeeper::new(&config, store);

    let state = Arc::new(AppState {
        gatekeeper,
        config: config.clone(),
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
