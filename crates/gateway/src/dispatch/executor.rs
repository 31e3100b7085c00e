// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request executor: token lookup, handshake on a miss, forward, and
//! retry after a token rejection.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{
    HandshakeCoordinator, HandshakeError, HandshakeOutcome, TokenEntry, TokenStore,
    MAX_RETRY_COUNT,
};
use crate::error::ErrorCode;
use crate::message::{PluginMessage, Request, Response};
use crate::plugin::{PluginChannel, PluginInfo};

/// Result of the authorization step.
enum Authorized {
    /// Forward with this token, or with none.
    Proceed(Option<String>),
    /// Stop and answer the caller with this response.
    Done(Response),
}

pub struct RequestExecutor {
    store: Arc<TokenStore>,
    coordinator: Arc<HandshakeCoordinator>,
    channel: Arc<dyn PluginChannel>,
    ignored_profiles: Vec<String>,
}

impl RequestExecutor {
    pub fn new(
        coordinator: Arc<HandshakeCoordinator>,
        channel: Arc<dyn PluginChannel>,
        ignored_profiles: Vec<String>,
    ) -> Self {
        Self { store: Arc::clone(coordinator.store()), coordinator, channel, ignored_profiles }
    }

    /// Whether requests to `profile` skip the token path.
    pub fn is_ignored(&self, profile: &str) -> bool {
        self.ignored_profiles.iter().any(|p| p.eq_ignore_ascii_case(profile))
    }

    /// Run `request` to its final response. Never fails; every outcome is
    /// a [`Response`].
    pub async fn execute(&self, mut request: Request, plugin: &PluginInfo) -> Response {
        let on_token_path = request.requires_token && !self.is_ignored(&request.path.profile);
        if !on_token_path {
            return self.forward(&request, plugin, None).await;
        }

        let key = request.token_key();
        loop {
            let token = match self.authorize(&request, plugin).await {
                Authorized::Proceed(token) => token,
                Authorized::Done(response) => return response,
            };

            let response = self.forward(&request, plugin, token.as_deref()).await;
            // Without a token there is nothing to revoke; a sentinel stays put.
            let Some(sent) = token.as_deref() else {
                return response;
            };
            match response.error_code() {
                Some(code) if code.is_token_rejection() && request.retry_count < MAX_RETRY_COUNT => {
                    self.coordinator.revoke(&key, Some(sent));
                    request.retry_count += 1;
                    debug!(
                        correlation_id = %request.correlation_id,
                        service_id = %request.service_id,
                        %code,
                        retry = request.retry_count,
                        "token rejected, retrying"
                    );
                }
                Some(ErrorCode::NotFoundClientId) => {
                    // The plugin lost the client; the next request registers anew.
                    self.coordinator.revoke(&key, Some(sent));
                    return response;
                }
                _ => return response,
            }
        }
    }

    async fn authorize(&self, request: &Request, plugin: &PluginInfo) -> Authorized {
        let key = request.token_key();
        match self.store.lookup(&key) {
            Some(TokenEntry::NoAuthRequired) => return Authorized::Proceed(None),
            Some(TokenEntry::Client(record)) if record.access_token.is_some() => {
                return Authorized::Proceed(record.access_token);
            }
            _ => {}
        }

        match self.coordinator.perform_handshake(key.clone(), plugin, request.timeout).await {
            Ok(HandshakeOutcome::TokenReady) => match self.store.lookup(&key) {
                Some(TokenEntry::Client(record)) if record.access_token.is_some() => {
                    Authorized::Proceed(record.access_token)
                }
                Some(TokenEntry::NoAuthRequired) => Authorized::Proceed(None),
                // Revoked again between the handshake and this lookup.
                _ => Authorized::Done(Response::error(
                    ErrorCode::Authorization,
                    "Cannot create access token.",
                )),
            },
            Ok(HandshakeOutcome::NoAuthRequired) => Authorized::Proceed(None),
            Ok(HandshakeOutcome::Rejected(response)) => Authorized::Done(response),
            Err(HandshakeError::TimedOut) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    service_id = %request.service_id,
                    "handshake did not finish in time"
                );
                Authorized::Done(Response::timeout())
            }
            Err(e @ HandshakeError::Stopped) => {
                Authorized::Done(Response::error(ErrorCode::Unknown, e.to_string()))
            }
        }
    }

    async fn forward(&self, request: &Request, plugin: &PluginInfo, token: Option<&str>) -> Response {
        let message = PluginMessage::forward(request, token);
        match tokio::time::timeout(request.timeout, self.channel.send(plugin, message)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    service_id = %request.service_id,
                    err = %e,
                    "plugin request failed"
                );
                Response::error(ErrorCode::Unknown, format!("plugin request failed: {e}"))
            }
            Err(_) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    service_id = %request.service_id,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "plugin did not reply in time"
                );
                Response::timeout()
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
