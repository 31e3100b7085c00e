// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher front: validates inbound requests and runs each one on its
//! own task under a hard deadline.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::dispatch::RequestExecutor;
use crate::error::ErrorCode;
use crate::message::{InboundRequest, Request, Response, ANONYMOUS_ORIGIN};
use crate::plugin::{PluginInfo, PluginRegistry};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Per-request timeout when the caller sets none.
    pub default_timeout: Duration,
    /// Wall-clock bound on a whole dispatch, retries and handshakes included.
    pub dispatch_timeout: Duration,
    /// Attach access tokens to forwarded requests.
    pub use_access_token: bool,
    /// Reject requests without an origin instead of using the anonymous one.
    pub require_origin: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            dispatch_timeout: Duration::from_secs(180),
            use_access_token: true,
            require_origin: false,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<dyn PluginRegistry>,
    executor: Arc<RequestExecutor>,
    settings: DispatchSettings,
    in_flight: Arc<AtomicUsize>,
    dispatched: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn PluginRegistry>,
        executor: Arc<RequestExecutor>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            executor,
            settings,
            in_flight: Arc::new(AtomicUsize::new(0)),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Resolve `inbound` to exactly one response.
    ///
    /// Validation failures answer immediately. Otherwise the request runs on
    /// a spawned task; if the dispatch deadline passes first the caller gets
    /// a timeout and the task is left to finish in the background.
    pub async fn dispatch(&self, inbound: InboundRequest) -> Response {
        let (request, plugin) = match self.admit(inbound) {
            Ok(admitted) => admitted,
            Err(response) => return response,
        };
        let correlation_id = request.correlation_id;
        debug!(
            %correlation_id,
            service_id = %request.service_id,
            method = %request.method,
            path = %request.path,
            origin = %request.origin,
            "dispatching"
        );

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        let in_flight = Arc::clone(&self.in_flight);
        let executor = Arc::clone(&self.executor);
        let task = tokio::spawn(async move {
            let response = executor.execute(request, &plugin).await;
            in_flight.fetch_sub(1, Ordering::Relaxed);
            response
        });

        match tokio::time::timeout(self.settings.dispatch_timeout, task).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                // The counter decrement was lost with the task.
                self.in_flight.fetch_sub(1, Ordering::Relaxed);
                error!(%correlation_id, err = %e, "request task failed");
                Response::error(ErrorCode::Unknown, "request task failed")
            }
            Err(_) => {
                warn!(%correlation_id, "dispatch deadline passed");
                Response::timeout()
            }
        }
    }

    /// Validate and build the owned request.
    fn admit(&self, inbound: InboundRequest) -> Result<(Request, PluginInfo), Response> {
        let service_id = inbound
            .service_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Response::error(ErrorCode::EmptyServiceId, "serviceId is empty."))?;

        let plugin = self.registry.find(&service_id).ok_or_else(|| {
            Response::error(ErrorCode::NotFoundService, format!("Service not found: {service_id}"))
        })?;

        let origin = match inbound.origin.filter(|o| !o.trim().is_empty()) {
            Some(origin) => origin,
            None if self.settings.require_origin => {
                return Err(Response::error(ErrorCode::InvalidOrigin, "Origin is not specified."));
            }
            None => ANONYMOUS_ORIGIN.to_owned(),
        };

        if !plugin.supports(&inbound.path.profile) {
            return Err(Response::error(
                ErrorCode::NotSupportProfile,
                format!("Profile is not supported: {}", inbound.path.profile),
            ));
        }

        let request = Request {
            correlation_id: Uuid::new_v4(),
            service_id,
            path: inbound.path,
            method: inbound.method,
            origin,
            params: inbound.params,
            requires_token: self.settings.use_access_token,
            require_origin: self.settings.require_origin,
            timeout: inbound.timeout.unwrap_or(self.settings.default_timeout),
            retry_count: 0,
        };
        Ok((request, plugin))
    }

    /// Requests currently executing, including ones whose caller already
    /// got a timeout.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Requests that passed validation since startup.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "front_tests.rs"]
mod tests;
