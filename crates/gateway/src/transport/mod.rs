// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the gateway.

pub mod http;

use std::sync::Arc;

use axum::routing::{any, delete, get};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        // Health
        .route("/api/v1/health", get(http::health))
        // Plugin table
        .route("/api/v1/plugins", get(http::list_plugins).post(http::register_plugin))
        .route("/api/v1/plugins/{service_id}", delete(http::deregister_plugin))
        // Token cache
        .route("/api/v1/tokens", get(http::list_tokens).delete(http::revoke_token))
        // Dispatch
        .route("/gotapi/{*path}", any(http::gotapi))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
