// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handshake coordinator: client registration and token issuance.
//!
//! One worker task drains a FIFO of handshake jobs, so at most one
//! handshake is in flight across all plugins. Callers wait on a oneshot
//! with a deadline. A job whose caller gave up still runs to completion and
//! its result stays in the [`TokenStore`] for whoever asks next.

use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{persist, AuthEvent, TokenEntry, TokenKey, TokenStore};
use crate::error::ErrorCode;
use crate::message::{
    PluginMessage, Response, ATTRIBUTE_CREATE_CLIENT, ATTRIBUTE_REQUEST_ACCESS_TOKEN,
};
use crate::plugin::{PluginChannel, PluginInfo};

/// How a handshake ended.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeOutcome {
    /// The store now holds a token for the key.
    TokenReady,
    /// The plugin does not implement authorization.
    NoAuthRequired,
    /// The handshake failed; this is the final response for the request
    /// that triggered it.
    Rejected(Response),
}

/// Why a caller got no outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// The caller's deadline passed first. The job keeps running.
    TimedOut,
    /// The coordinator task is gone.
    Stopped,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => f.write_str("handshake timed out"),
            Self::Stopped => f.write_str("handshake coordinator stopped"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    /// Sent as `applicationName` when requesting a token.
    pub application_name: String,
    /// Token snapshot rewritten after every change, if set.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self { application_name: "plugmux".to_owned(), snapshot_path: None }
    }
}

struct HandshakeJob {
    key: TokenKey,
    plugin: PluginInfo,
    /// Bound on each plugin round trip of this job.
    timeout: Duration,
    reply: oneshot::Sender<HandshakeOutcome>,
}

/// State shared between the coordinator handle and its worker.
struct Shared {
    store: Arc<TokenStore>,
    events: broadcast::Sender<AuthEvent>,
    snapshot_path: Option<PathBuf>,
    /// Held from snapshot to rename so an older snapshot never lands last.
    persist_lock: Mutex<()>,
}

impl Shared {
    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn persist(&self) {
        let Some(ref path) = self.snapshot_path else {
            return;
        };
        let _guard = self.persist_lock.lock();
        if let Err(e) = persist::save(path, &self.store.snapshot()) {
            warn!(path = %path.display(), err = %e, "failed to persist token snapshot");
        }
    }
}

/// Handle to the handshake worker. The only writer of the [`TokenStore`].
pub struct HandshakeCoordinator {
    jobs: mpsc::UnboundedSender<HandshakeJob>,
    shared: Arc<Shared>,
}

impl HandshakeCoordinator {
    /// Start the worker task. It exits when `shutdown` fires.
    pub fn spawn(
        store: Arc<TokenStore>,
        channel: Arc<dyn PluginChannel>,
        settings: HandshakeSettings,
        events: broadcast::Sender<AuthEvent>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (jobs, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            store,
            events,
            snapshot_path: settings.snapshot_path,
            persist_lock: Mutex::new(()),
        });
        let worker = HandshakeWorker {
            shared: Arc::clone(&shared),
            channel,
            application_name: settings.application_name,
        };
        tokio::spawn(worker.run(rx, shutdown));
        Arc::new(Self { jobs, shared })
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.shared.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.shared.events.subscribe()
    }

    /// Queue a handshake for `key` and wait up to `wait` for its outcome.
    pub async fn perform_handshake(
        &self,
        key: TokenKey,
        plugin: &PluginInfo,
        wait: Duration,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let (reply, rx) = oneshot::channel();
        let job = HandshakeJob { key, plugin: plugin.clone(), timeout: wait, reply };
        if self.jobs.send(job).is_err() {
            return Err(HandshakeError::Stopped);
        }
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(HandshakeError::Stopped),
            Err(_) => Err(HandshakeError::TimedOut),
        }
    }

    /// Drop the entry for `key` if it still holds `rejected` as its token.
    ///
    /// Called when a plugin refuses a token. A newer token written by a
    /// handshake that finished in the meantime is left alone.
    pub fn revoke(&self, key: &TokenKey, rejected: Option<&str>) -> bool {
        let removed = self.shared.store.invalidate_if(key, rejected);
        if removed {
            debug!(origin = %key.origin, service_id = %key.service_id, "token revoked");
            self.shared.emit(AuthEvent::TokenRevoked { key: key.clone() });
            self.shared.persist();
        }
        removed
    }

    /// Drop the entry for `key` unconditionally.
    pub fn forget(&self, key: &TokenKey) -> bool {
        let removed = self.shared.store.invalidate(key);
        if removed {
            info!(origin = %key.origin, service_id = %key.service_id, "token entry removed");
            self.shared.emit(AuthEvent::TokenRevoked { key: key.clone() });
            self.shared.persist();
        }
        removed
    }
}

struct HandshakeWorker {
    shared: Arc<Shared>,
    channel: Arc<dyn PluginChannel>,
    application_name: String,
}

impl HandshakeWorker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<HandshakeJob>, shutdown: CancellationToken) {
        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let outcome = self.handshake(&job).await;
            if job.reply.send(outcome).is_err() {
                debug!(
                    origin = %job.key.origin,
                    service_id = %job.key.service_id,
                    "handshake finished after its caller gave up"
                );
            }
        }
        debug!("handshake coordinator stopped");
    }

    async fn handshake(&self, job: &HandshakeJob) -> HandshakeOutcome {
        // A job queued behind another one for the same key usually finds
        // the work already done.
        let client_id = match self.shared.store.lookup(&job.key) {
            Some(TokenEntry::NoAuthRequired) => return HandshakeOutcome::NoAuthRequired,
            Some(TokenEntry::Client(record)) if record.access_token.is_some() => {
                return HandshakeOutcome::TokenReady;
            }
            Some(TokenEntry::Client(record)) => record.client_id,
            None => match self.create_client(job).await {
                ControlFlow::Continue(client_id) => client_id,
                ControlFlow::Break(outcome) => return self.finish(job, outcome),
            },
        };

        let outcome = self.request_access_token(job, &client_id).await;
        self.finish(job, outcome)
    }

    fn finish(&self, job: &HandshakeJob, outcome: HandshakeOutcome) -> HandshakeOutcome {
        if let HandshakeOutcome::Rejected(ref response) = outcome {
            let error = response.error_code().unwrap_or(ErrorCode::Unknown);
            warn!(
                origin = %job.key.origin,
                service_id = %job.key.service_id,
                %error,
                detail = response.error_message.as_deref().unwrap_or_default(),
                "handshake failed"
            );
            self.shared.emit(AuthEvent::HandshakeFailed { key: job.key.clone(), error });
        }
        outcome
    }

    /// Register a client for the job's origin. Continues with the new
    /// client id, or breaks with the outcome that ends the handshake.
    async fn create_client(&self, job: &HandshakeJob) -> ControlFlow<HandshakeOutcome, String> {
        let mut params = Map::new();
        params.insert("serviceId".to_owned(), Value::from(job.key.service_id.as_str()));
        params.insert("package".to_owned(), Value::from(job.key.origin.as_str()));
        let message = PluginMessage::authorization(
            &job.key.service_id,
            &job.key.origin,
            ATTRIBUTE_CREATE_CLIENT,
            params,
        );
        let reply = match self.round_trip(job, message).await {
            ControlFlow::Continue(reply) => reply,
            ControlFlow::Break(outcome) => return ControlFlow::Break(outcome),
        };

        if reply.is_ok() {
            let Some(client_id) = reply.str_field("clientId").map(str::to_owned) else {
                return ControlFlow::Break(HandshakeOutcome::Rejected(Response::error(
                    ErrorCode::Authorization,
                    "Cannot create client data.",
                )));
            };
            self.shared.store.put(&job.key, client_id.clone(), None);
            self.shared.emit(AuthEvent::ClientRegistered {
                key: job.key.clone(),
                client_id: client_id.clone(),
            });
            self.shared.persist();
            debug!(origin = %job.key.origin, service_id = %job.key.service_id, "client registered");
            return ControlFlow::Continue(client_id);
        }

        if reply.error_code() == Some(ErrorCode::NotSupportProfile) {
            info!(
                service_id = %job.key.service_id,
                "plugin does not support the authorization profile"
            );
            self.shared.store.mark_no_auth_required(&job.key);
            self.shared.emit(AuthEvent::NoAuthRequired { key: job.key.clone() });
            self.shared.persist();
            return ControlFlow::Break(HandshakeOutcome::NoAuthRequired);
        }

        ControlFlow::Break(HandshakeOutcome::Rejected(reply))
    }

    async fn request_access_token(&self, job: &HandshakeJob, client_id: &str) -> HandshakeOutcome {
        let mut params = Map::new();
        params.insert("clientId".to_owned(), Value::from(client_id));
        params.insert("applicationName".to_owned(), Value::from(self.application_name.as_str()));
        params.insert("scope".to_owned(), Value::from(job.plugin.scope()));
        let message = PluginMessage::authorization(
            &job.key.service_id,
            &job.key.origin,
            ATTRIBUTE_REQUEST_ACCESS_TOKEN,
            params,
        );
        let reply = match self.round_trip(job, message).await {
            ControlFlow::Continue(reply) => reply,
            ControlFlow::Break(outcome) => return outcome,
        };

        if reply.is_ok() {
            let Some(token) = reply.str_field("accessToken").map(str::to_owned) else {
                return HandshakeOutcome::Rejected(Response::error(
                    ErrorCode::Authorization,
                    "Cannot create access token.",
                ));
            };
            self.shared.store.put(&job.key, client_id.to_owned(), Some(token));
            self.shared.emit(AuthEvent::TokenIssued { key: job.key.clone() });
            self.shared.persist();
            debug!(origin = %job.key.origin, service_id = %job.key.service_id, "access token issued");
            return HandshakeOutcome::TokenReady;
        }

        // The client registration is stale; the next request starts over.
        if matches!(
            reply.error_code(),
            Some(ErrorCode::NotFoundClientId) | Some(ErrorCode::Authorization)
        ) && self.shared.store.invalidate(&job.key)
        {
            self.shared.emit(AuthEvent::TokenRevoked { key: job.key.clone() });
            self.shared.persist();
        }
        HandshakeOutcome::Rejected(reply)
    }

    /// One plugin round trip bounded by the job's timeout.
    async fn round_trip(
        &self,
        job: &HandshakeJob,
        message: PluginMessage,
    ) -> ControlFlow<HandshakeOutcome, Response> {
        match tokio::time::timeout(job.timeout, self.channel.send(&job.plugin, message)).await {
            Ok(Ok(reply)) => ControlFlow::Continue(reply),
            Ok(Err(e)) => ControlFlow::Break(HandshakeOutcome::Rejected(Response::error(
                ErrorCode::Unknown,
                format!("plugin request failed: {e}"),
            ))),
            Err(_) => ControlFlow::Break(HandshakeOutcome::Rejected(Response::timeout())),
        }
    }
}

#[cfg(test)]
#[path = "handshake_tests.rs"]
mod tests;
