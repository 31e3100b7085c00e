// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::TokenKey;
use crate::error::ErrorCode;
use crate::message::{CapabilityPath, InboundRequest, Method, Response};
use crate::plugin::PluginInfo;
use crate::state::GatewayState;

/// Caller identity. Falls back to the standard `Origin` header.
pub const ORIGIN_HEADER: &str = "x-gotapi-origin";
/// Per-request timeout in milliseconds.
pub const TIMEOUT_HEADER: &str = "x-gotapi-timeout-ms";

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub plugin_count: usize,
    pub token_count: usize,
    pub in_flight: usize,
    pub dispatched: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub service_id: String,
    pub registered: bool,
    /// False when an existing entry was replaced.
    pub new: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeregisterResponse {
    pub service_id: String,
    pub removed: bool,
}

/// One token cache entry, without secrets.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub origin: String,
    pub service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub has_access_token: bool,
    pub no_auth_required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuery {
    pub origin: String,
    pub service_id: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub removed: bool,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        plugin_count: s.plugins.len(),
        token_count: s.tokens.len(),
        in_flight: s.dispatcher.in_flight(),
        dispatched: s.dispatcher.dispatched(),
    })
}

/// `ANY /gotapi/{profile}[/{interface}][/{attribute}]`: dispatch a request
/// to the plugin named by `serviceId`.
pub async fn gotapi(
    State(s): State<Arc<GatewayState>>,
    method: axum::http::Method,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let inbound = match inbound_request(&method, &path, query, &headers, &body) {
        Ok(inbound) => inbound,
        Err(response) => return reply(response),
    };
    reply(s.dispatcher.dispatch(inbound).await)
}

/// `GET /api/v1/plugins`
pub async fn list_plugins(State(s): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(s.plugins.list())
}

/// `POST /api/v1/plugins`: register or replace a plugin.
pub async fn register_plugin(
    State(s): State<Arc<GatewayState>>,
    Json(plugin): Json<PluginInfo>,
) -> impl IntoResponse {
    if plugin.service_id.trim().is_empty() {
        return ErrorCode::EmptyServiceId.to_http_response("serviceId is empty.").into_response();
    }
    if plugin.address.trim().is_empty() {
        return ErrorCode::InvalidRequestParameter
            .to_http_response("address is empty.")
            .into_response();
    }

    let service_id = plugin.service_id.clone();
    let new = s.plugins.register(plugin);
    if new {
        tracing::info!(service_id = %service_id, "plugin registered");
    } else {
        tracing::debug!(service_id = %service_id, "plugin re-registered");
    }
    Json(RegisterResponse { service_id, registered: true, new }).into_response()
}

/// `DELETE /api/v1/plugins/{service_id}`
pub async fn deregister_plugin(
    State(s): State<Arc<GatewayState>>,
    Path(service_id): Path<String>,
) -> impl IntoResponse {
    if s.plugins.deregister(&service_id) {
        tracing::info!(service_id = %service_id, "plugin deregistered");
        Json(DeregisterResponse { service_id, removed: true }).into_response()
    } else {
        ErrorCode::NotFoundService.to_http_response("service not found").into_response()
    }
}

/// `GET /api/v1/tokens`: token cache entries, sorted by key.
pub async fn list_tokens(State(s): State<Arc<GatewayState>>) -> impl IntoResponse {
    let snapshot = s.tokens.snapshot();
    let mut list: Vec<TokenInfo> = snapshot
        .clients
        .into_iter()
        .map(|record| TokenInfo {
            origin: record.origin,
            service_id: record.service_id,
            client_id: Some(record.client_id),
            has_access_token: record.access_token.is_some(),
            no_auth_required: false,
        })
        .chain(snapshot.no_auth.into_iter().map(|key| TokenInfo {
            origin: key.origin,
            service_id: key.service_id,
            client_id: None,
            has_access_token: false,
            no_auth_required: true,
        }))
        .collect();
    list.sort_by(|a, b| (&a.origin, &a.service_id).cmp(&(&b.origin, &b.service_id)));
    Json(list)
}

/// `DELETE /api/v1/tokens?origin=…&serviceId=…`: drop a cached entry so the
/// next request performs a fresh handshake.
pub async fn revoke_token(
    State(s): State<Arc<GatewayState>>,
    Query(q): Query<TokenQuery>,
) -> impl IntoResponse {
    let removed = s.coordinator.forget(&TokenKey::new(q.origin, q.service_id));
    Json(RevokeResponse { removed })
}

// -- Helpers ------------------------------------------------------------------

fn reply(response: Response) -> axum::response::Response {
    let status =
        StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

/// Build an [`InboundRequest`] from the HTTP pieces. Parameters come from
/// a JSON object body and the query string; the query wins on conflicts.
fn inbound_request(
    method: &axum::http::Method,
    path: &str,
    query: HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<InboundRequest, Response> {
    let method = Method::try_from(method)
        .map_err(|e| Response::error(ErrorCode::NotSupportAction, e.to_string()))?;
    let path = CapabilityPath::parse(path)
        .map_err(|e| Response::error(ErrorCode::InvalidRequestParameter, e.to_string()))?;

    let mut params = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(Response::error(
                    ErrorCode::InvalidRequestParameter,
                    "request body must be a JSON object",
                ));
            }
            Err(e) => {
                return Err(Response::error(
                    ErrorCode::InvalidRequestParameter,
                    format!("invalid request body: {e}"),
                ));
            }
        }
    };
    for (key, value) in query {
        params.insert(key, Value::String(value));
    }

    let service_id = match params.remove("serviceId") {
        Some(Value::String(id)) => Some(id),
        _ => None,
    };
    let origin = header_str(headers, ORIGIN_HEADER)
        .or_else(|| header_str(headers, header::ORIGIN.as_str()))
        .map(str::to_owned);
    let timeout = match header_str(headers, TIMEOUT_HEADER) {
        Some(raw) => {
            let ms = raw.parse::<u64>().ok().filter(|ms| *ms > 0).ok_or_else(|| {
                Response::error(
                    ErrorCode::InvalidRequestParameter,
                    format!("invalid {TIMEOUT_HEADER}: {raw}"),
                )
            })?;
            Some(Duration::from_millis(ms))
        }
        None => None,
    };

    Ok(InboundRequest { service_id, path, method, origin, params, timeout })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}
