// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process plugin double for tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth::{
    HandshakeCoordinator, HandshakeSettings, TokenStore, DEFAULT_IGNORED_PROFILES,
};
use crate::dispatch::{DispatchSettings, Dispatcher, RequestExecutor};
use crate::error::ErrorCode;
use crate::message::{
    PluginMessage, Response, ATTRIBUTE_CREATE_CLIENT, ATTRIBUTE_REQUEST_ACCESS_TOKEN,
};
use crate::plugin::{PluginChannel, PluginInfo, PluginTable};

/// Service id of the plugin every [`TestGateway`] starts with.
pub const LIGHT: &str = "light.host";

/// What the scripted plugin does with one message.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(Response),
    /// Transport failure.
    Fail(String),
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn ok(fields: &[(&str, &str)]) -> Self {
        Self::Respond(ok_response(fields))
    }

    pub fn error(code: ErrorCode) -> Self {
        Self::Respond(Response::error(code, code.as_str()))
    }
}

/// Success response carrying the given string fields.
pub fn ok_response(fields: &[(&str, &str)]) -> Response {
    let payload: Map<String, Value> =
        fields.iter().map(|(k, v)| ((*k).to_owned(), Value::from(*v))).collect();
    Response::ok(payload)
}

/// Plugin metadata for tests.
pub fn plugin_info(service_id: &str, profiles: &[&str]) -> PluginInfo {
    PluginInfo {
        service_id: service_id.to_owned(),
        name: service_id.to_owned(),
        address: "http://127.0.0.1:9".to_owned(),
        profiles: profiles.iter().map(|p| (*p).to_owned()).collect(),
    }
}

/// Queued replies, then a fallback repeated forever.
struct Script {
    queue: VecDeque<Reply>,
    fallback: Reply,
}

impl Script {
    fn new(fallback: Reply) -> Self {
        Self { queue: VecDeque::new(), fallback }
    }

    fn next(&mut self) -> Reply {
        self.queue.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

type Observer = Box<dyn Fn(&PluginMessage) + Send + Sync>;

/// A [`PluginChannel`] answering from scripts and recording every message.
///
/// By default `createClient` answers `clientId=c1`, `requestAccessToken`
/// answers `accessToken=t1`, and forwarded requests succeed with an empty
/// payload.
pub struct ScriptedPlugin {
    create_client: Mutex<Script>,
    request_token: Mutex<Script>,
    forward: Mutex<Script>,
    delay: Duration,
    observer: Option<Observer>,
    sent: Mutex<Vec<PluginMessage>>,
}

impl Default for ScriptedPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPlugin {
    pub fn new() -> Self {
        Self {
            create_client: Mutex::new(Script::new(Reply::ok(&[("clientId", "c1")]))),
            request_token: Mutex::new(Script::new(Reply::ok(&[("accessToken", "t1")]))),
            forward: Mutex::new(Script::new(Reply::Respond(Response::ok(Map::new())))),
            delay: Duration::ZERO,
            observer: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn on_create_client(self, reply: Reply) -> Self {
        self.create_client.lock().fallback = reply;
        self
    }

    pub fn on_request_token(self, reply: Reply) -> Self {
        self.request_token.lock().fallback = reply;
        self
    }

    pub fn on_forward(self, reply: Reply) -> Self {
        self.forward.lock().fallback = reply;
        self
    }

    /// Answer the next `createClient` with `reply`, ahead of the fallback.
    pub fn queue_create_client(self, reply: Reply) -> Self {
        self.create_client.lock().queue.push_back(reply);
        self
    }

    pub fn queue_request_token(self, reply: Reply) -> Self {
        self.request_token.lock().queue.push_back(reply);
        self
    }

    pub fn queue_forward(self, reply: Reply) -> Self {
        self.forward.lock().queue.push_back(reply);
        self
    }

    /// Sleep this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Call `f` with every message as it arrives.
    pub fn on_message(mut self, f: impl Fn(&PluginMessage) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    pub fn sent(&self) -> Vec<PluginMessage> {
        self.sent.lock().clone()
    }

    pub fn create_client_count(&self) -> usize {
        self.count(|m| m.is_authorization(ATTRIBUTE_CREATE_CLIENT))
    }

    pub fn request_token_count(&self) -> usize {
        self.count(|m| m.is_authorization(ATTRIBUTE_REQUEST_ACCESS_TOKEN))
    }

    /// Messages that were not part of a handshake.
    pub fn forwarded(&self) -> Vec<PluginMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| {
                !m.is_authorization(ATTRIBUTE_CREATE_CLIENT)
                    && !m.is_authorization(ATTRIBUTE_REQUEST_ACCESS_TOKEN)
            })
            .cloned()
            .collect()
    }

    fn count(&self, f: impl Fn(&PluginMessage) -> bool) -> usize {
        self.sent.lock().iter().filter(|m| f(m)).count()
    }

    fn script_for(&self, message: &PluginMessage) -> &Mutex<Script> {
        if message.is_authorization(ATTRIBUTE_CREATE_CLIENT) {
            &self.create_client
        } else if message.is_authorization(ATTRIBUTE_REQUEST_ACCESS_TOKEN) {
            &self.request_token
        } else {
            &self.forward
        }
    }
}

impl PluginChannel for ScriptedPlugin {
    fn send(
        &self,
        _plugin: &PluginInfo,
        message: PluginMessage,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Response>> + Send + '_>> {
        Box::pin(async move {
            if let Some(ref observer) = self.observer {
                observer(&message);
            }
            let reply = self.script_for(&message).lock().next();
            self.sent.lock().push(message);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match reply {
                Reply::Respond(response) => Ok(response),
                Reply::Fail(e) => anyhow::bail!(e),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

/// Dispatcher wired to one [`ScriptedPlugin`] registered as [`LIGHT`]
/// with the `light`, `battery` and `system` profiles.
pub struct TestGateway {
    pub plugin: Arc<ScriptedPlugin>,
    pub plugins: Arc<PluginTable>,
    pub store: Arc<TokenStore>,
    pub coordinator: Arc<HandshakeCoordinator>,
    pub executor: Arc<RequestExecutor>,
    pub dispatcher: Dispatcher,
    pub shutdown: CancellationToken,
}

impl TestGateway {
    pub fn new(plugin: ScriptedPlugin) -> Self {
        Self::with_settings(plugin, DispatchSettings::default())
    }

    pub fn with_settings(plugin: ScriptedPlugin, settings: DispatchSettings) -> Self {
        let plugin = Arc::new(plugin);
        let plugins =
            Arc::new(PluginTable::from_plugins([plugin_info(LIGHT, &["light", "battery", "system"])]));
        let store = Arc::new(TokenStore::new());
        let shutdown = CancellationToken::new();
        let (events, _) = broadcast::channel(64);
        let channel: Arc<dyn PluginChannel> = plugin.clone();
        let coordinator = HandshakeCoordinator::spawn(
            Arc::clone(&store),
            Arc::clone(&channel),
            HandshakeSettings::default(),
            events,
            shutdown.clone(),
        );
        let ignored = DEFAULT_IGNORED_PROFILES.iter().map(|p| (*p).to_owned()).collect();
        let executor = Arc::new(RequestExecutor::new(Arc::clone(&coordinator), channel, ignored));
        let dispatcher = Dispatcher::new(plugins.clone(), Arc::clone(&executor), settings);
        Self { plugin, plugins, store, coordinator, executor, dispatcher, shutdown }
    }
}
