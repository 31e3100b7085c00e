// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugmux: local request-routing gateway for device plugins.
//!
//! Callers address a plugin by service id and capability path. The gateway
//! obtains a per-origin access token from the plugin on first use, attaches
//! it to every forwarded request, and replaces it when the plugin rejects it.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod plugin;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth::{persist, AuthEvent, TokenStore};
use crate::config::GatewayConfig;
use crate::plugin::{HttpChannel, PluginChannel, PluginConfig, PluginTable};
use crate::state::GatewayState;
use crate::transport::build_router;

/// Run the gateway until ctrl-c.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let plugins = match config.plugins {
        Some(ref path) => PluginConfig::load(path)?.plugins,
        None => vec![],
    };
    let plugins = PluginTable::from_plugins(plugins);

    let tokens = Arc::new(TokenStore::new());
    if let Some(ref path) = config.token_snapshot {
        let snapshot = persist::load(path)?;
        tracing::info!(
            path = %path.display(),
            clients = snapshot.clients.len(),
            no_auth = snapshot.no_auth.len(),
            "token snapshot loaded"
        );
        tokens.restore(snapshot);
    }

    let channel: Arc<dyn PluginChannel> = Arc::new(HttpChannel::new());
    let state = Arc::new(GatewayState::new(
        config.clone(),
        plugins,
        tokens,
        channel,
        shutdown.clone(),
    ));

    spawn_event_log(state.coordinator.subscribe(), shutdown.clone());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
            shutdown.cancel();
        });
    }

    tracing::info!("plugmux listening on {addr} ({} plugins)", state.plugins.len());
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Log token cache changes.
fn spawn_event_log(mut rx: broadcast::Receiver<AuthEvent>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(AuthEvent::ClientRegistered { key, client_id }) => {
                    tracing::info!(origin = %key.origin, service_id = %key.service_id, client_id = %client_id, "client registered");
                }
                Ok(AuthEvent::TokenIssued { key }) => {
                    tracing::info!(origin = %key.origin, service_id = %key.service_id, "access token issued");
                }
                Ok(AuthEvent::TokenRevoked { key }) => {
                    tracing::info!(origin = %key.origin, service_id = %key.service_id, "access token revoked");
                }
                Ok(AuthEvent::NoAuthRequired { key }) => {
                    tracing::info!(origin = %key.origin, service_id = %key.service_id, "plugin requires no token");
                }
                Ok(AuthEvent::HandshakeFailed { key, error }) => {
                    tracing::debug!(origin = %key.origin, service_id = %key.service_id, %error, "handshake failed");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "auth event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
