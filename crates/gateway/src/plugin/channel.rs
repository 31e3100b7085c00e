// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message channel to plugins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use reqwest::Client;

use crate::message::{PluginMessage, Response};
use crate::plugin::PluginInfo;

/// Delivers one message to a plugin and yields its reply.
///
/// Implementations need not bound their own latency; callers wrap every
/// send in a timeout.
pub trait PluginChannel: Send + Sync + 'static {
    fn send(
        &self,
        plugin: &PluginInfo,
        message: PluginMessage,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Response>> + Send + '_>>;
}

static CRYPTO_INIT: Once = Once::new();

/// Plugin channel that POSTs messages as JSON to
/// `{address}/gotapi/{profile}[/{interface}][/{attribute}]`.
pub struct HttpChannel {
    client: Client,
}

impl HttpChannel {
    pub fn new() -> Self {
        CRYPTO_INIT.call_once(|| {
            let _ = rustls::crypto::ring::default_provider().install_default();
        });
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    fn url(plugin: &PluginInfo, message: &PluginMessage) -> String {
        format!("{}/gotapi/{}", plugin.address.trim_end_matches('/'), message.path())
    }

    async fn post(&self, plugin: &PluginInfo, message: PluginMessage) -> anyhow::Result<Response> {
        let url = Self::url(plugin, &message);
        let resp = self.client.post(&url).json(&message).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        // Plugins report failures in the body; only an unparseable body is a
        // transport error.
        match serde_json::from_slice::<Response>(&bytes) {
            Ok(reply) => Ok(reply),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => anyhow::bail!("plugin replied {status}: {}", String::from_utf8_lossy(&bytes)),
        }
    }
}

impl Default for HttpChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginChannel for HttpChannel {
    fn send(
        &self,
        plugin: &PluginInfo,
        message: PluginMessage,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Response>> + Send + '_>> {
        let plugin = plugin.clone();
        Box::pin(async move { self.post(&plugin, message).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ATTRIBUTE_CREATE_CLIENT, ANONYMOUS_ORIGIN};

    #[test]
    fn url_joins_address_and_path() {
        let plugin = PluginInfo {
            service_id: "s1".to_owned(),
            name: String::new(),
            address: "http://127.0.0.1:4035/".to_owned(),
            profiles: vec![],
        };
        let msg = PluginMessage::authorization(
            "s1",
            ANONYMOUS_ORIGIN,
            ATTRIBUTE_CREATE_CLIENT,
            serde_json::Map::new(),
        );
        assert_eq!(
            HttpChannel::url(&plugin, &msg),
            "http://127.0.0.1:4035/gotapi/authorization/createClient"
        );
    }
}
