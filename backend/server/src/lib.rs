//! Backend of an online electronics storefront.
//!
//!
//!
//! # General Infrastructure
//! - One axum service answers both the storefront (`/api`) and identity administration (`/users`)
//! - Documents live in Redis, one hash per collection, keyed by id
//! - Without `REDIS_URL` the service keeps documents in memory, handy for local runs and tests
//! - The `process` binary seeds the device catalog from a JSON file or URL
//!
//!
//!
//! # Access
//!
//! - Customers register and log in, receiving a bearer token (HS256, `TOKEN_TTL_HOURS`)
//! - Device writes need the admin role
//! - Admin and support may see every order and move its status along
//! - `/users` administration is admin only, except the three password reset steps which are public
//!
//!
//!
//! # Checkout
//!
//! Checkouts and admin device edits run one at a time behind [`state::AppState::catalog`]. Every
//! line is checked for existence and stock before any stock is written, so a rejected order leaves
//! the catalog untouched.
//!
//!
//!
//! # Notes
//!
//! ## Identifiers
//! Documents use v4 UUIDs. Path ids that do not parse as UUIDs answer 404, the same as unknown ids.
//!
//! ## Notifications
//! Order confirmations, status changes, reset codes and deactivations are logged under the
//! `notify` target instead of being mailed.
//!
//!
//!
//! # Setup
//!
//! Run with verbose logs.
//! ```sh
//! RUST_LOG=storefront=debug,notify=info JWT_SECRET=change-me cargo run --bin storefront
//! ```
//!
//! Seed the catalog.
//! ```sh
//! REDIS_URL=redis://localhost:6379 cargo run --bin process -- catalog.json
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::sync::Arc;

use anyhow::Context;
use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod filters;
pub mod notify;
pub mod routes;
pub mod state;
pub mod utils;

use config::Config;
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load().context("Failed to load config")?;

    info!("Initializing state...");
    let state: Arc<AppState> = AppState::new(config)
        .await
        .context("Failed to initialize state")?;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(state.config.cors_max_age);

    let app = routes::router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!("Failed to install Ctrl+C handler: {e}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
