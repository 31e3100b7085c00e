// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthEvent, HandshakeCoordinator, TokenStore};
use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, RequestExecutor};
use crate::plugin::{PluginChannel, PluginTable};

/// Shared gateway state.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub plugins: Arc<PluginTable>,
    pub tokens: Arc<TokenStore>,
    pub coordinator: Arc<HandshakeCoordinator>,
    pub dispatcher: Dispatcher,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    /// Wire the dispatch pipeline and start the handshake coordinator.
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: GatewayConfig,
        plugins: PluginTable,
        tokens: Arc<TokenStore>,
        channel: Arc<dyn PluginChannel>,
        shutdown: CancellationToken,
    ) -> Self {
        let plugins = Arc::new(plugins);
        let (event_tx, _) = broadcast::channel::<AuthEvent>(64);
        let coordinator = HandshakeCoordinator::spawn(
            Arc::clone(&tokens),
            Arc::clone(&channel),
            config.handshake_settings(),
            event_tx,
            shutdown.clone(),
        );
        let executor = Arc::new(RequestExecutor::new(
            Arc::clone(&coordinator),
            channel,
            config.ignored_profiles(),
        ));
        let dispatcher = Dispatcher::new(plugins.clone(), executor, config.dispatch_settings());
        Self { config, plugins, tokens, coordinator, dispatcher, shutdown }
    }
}
