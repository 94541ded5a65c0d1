//! burrow rendezvous server.
//!
//! Pairs two anonymous WebSocket connections on a numeric slot and relays
//! their handshake frames. The server is an untrusted courier by design:
//! peers authenticate each other end to end with a PAKE, so the worst a
//! compromised server can do is drop or reorder frames.

#![forbid(unsafe_code)]

pub mod config;
pub mod slots;
pub mod turn;
pub mod ws;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

pub use config::ServerConfig;
pub use slots::SlotTable;
pub use turn::TurnMinter;

#[derive(Clone)]
pub struct AppState {
    pub slots: Arc<SlotTable>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            slots: Arc::new(SlotTable::new(config.max_slots)),
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
struct RuntimeMetrics {
    waiting_slots: usize,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(RuntimeMetrics {
        waiting_slots: state.slots.waiting(),
    })
}

/// Reject requests whose Host header is not in the configured allowlist.
async fn enforce_allowed_hosts(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let allowed = &state.config.allowed_hosts;
    if allowed.is_empty() {
        return next.run(req).await;
    }
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h));
    match host {
        Some(host) if allowed.iter().any(|a| a.eq_ignore_ascii_case(host)) => next.run(req).await,
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

/// Build the server's router: the rendezvous endpoint on `/` and
/// `/<slot>`, plus a health probe.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(ws::ws_handler))
        .route("/:slot", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_allowed_hosts,
        ))
        .with_state(state)
}
