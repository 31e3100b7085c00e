// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Map;
use uuid::Uuid;

use super::*;
use crate::auth::TokenKey;
use crate::message::{CapabilityPath, Method};
use crate::test_support::{ok_response, Reply, ScriptedPlugin, TestGateway, LIGHT};

const ORIGIN: &str = "app.example";

fn request(profile: &str) -> Request {
    Request {
        correlation_id: Uuid::new_v4(),
        service_id: LIGHT.to_owned(),
        path: CapabilityPath::new(profile).with_attribute("on"),
        method: Method::Get,
        origin: ORIGIN.to_owned(),
        params: Map::new(),
        requires_token: true,
        require_origin: false,
        timeout: Duration::from_secs(2),
        retry_count: 0,
    }
}

fn key() -> TokenKey {
    TokenKey::new(ORIGIN, LIGHT)
}

async fn execute(gw: &TestGateway, request: Request) -> anyhow::Result<Response> {
    let Some(plugin) = gw.plugins.list().into_iter().next() else {
        anyhow::bail!("no plugin registered");
    };
    Ok(gw.executor.execute(request, &plugin).await)
}

fn forwarded_tokens(plugin: &ScriptedPlugin) -> Vec<Option<String>> {
    plugin.forwarded().into_iter().map(|m| m.access_token).collect()
}

// ── token path ────────────────────────────────────────────────────────

#[tokio::test]
async fn first_request_obtains_token() -> anyhow::Result<()> {
    let gw = TestGateway::new(
        ScriptedPlugin::new().on_forward(Reply::Respond(ok_response(&[("state", "on")]))),
    );

    let response = execute(&gw, request("light")).await?;
    assert!(response.is_ok());
    assert_eq!(response.str_field("state"), Some("on"));
    assert_eq!(gw.plugin.create_client_count(), 1);
    assert_eq!(gw.plugin.request_token_count(), 1);
    assert_eq!(forwarded_tokens(&gw.plugin), vec![Some("t1".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn cached_token_skips_handshake() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new());

    execute(&gw, request("light")).await?;
    execute(&gw, request("battery")).await?;
    assert_eq!(gw.plugin.create_client_count(), 1);
    assert_eq!(
        forwarded_tokens(&gw.plugin),
        vec![Some("t1".to_owned()), Some("t1".to_owned())]
    );
    Ok(())
}

#[yare::parameterized(
    system = { "system" },
    service_discovery = { "serviceDiscovery" },
    authorization = { "authorization" },
)]
#[test_macro(tokio::test)]
async fn ignored_profile_goes_without_token(profile: &str) -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new());

    let response = execute(&gw, request(profile)).await?;
    assert!(response.is_ok());
    assert_eq!(gw.plugin.create_client_count(), 0);
    assert_eq!(forwarded_tokens(&gw.plugin), vec![None]);
    assert!(gw.store.is_empty());
    Ok(())
}

#[tokio::test]
async fn tokens_disabled_goes_without_token() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new());
    let mut req = request("light");
    req.requires_token = false;

    let response = execute(&gw, req).await?;
    assert!(response.is_ok());
    assert!(gw.plugin.sent().iter().all(|m| m.access_token.is_none()));
    assert_eq!(gw.plugin.create_client_count(), 0);
    assert_eq!(gw.store.lookup_count(), 0);
    Ok(())
}

#[tokio::test]
async fn plugin_without_authorization_is_called_bare() -> anyhow::Result<()> {
    let gw = TestGateway::new(
        ScriptedPlugin::new().on_create_client(Reply::error(ErrorCode::NotSupportProfile)),
    );

    assert!(execute(&gw, request("light")).await?.is_ok());
    assert!(execute(&gw, request("light")).await?.is_ok());
    assert_eq!(gw.plugin.create_client_count(), 1);
    assert_eq!(gw.plugin.request_token_count(), 0);
    assert_eq!(forwarded_tokens(&gw.plugin), vec![None, None]);
    Ok(())
}

#[yare::parameterized(
    authorization = { ErrorCode::Authorization },
    expired = { ErrorCode::ExpiredAccessToken },
    lost_client = { ErrorCode::NotFoundClientId },
)]
#[test_macro(tokio::test)]
async fn bare_request_error_keeps_sentinel(code: ErrorCode) -> anyhow::Result<()> {
    let gw = TestGateway::new(
        ScriptedPlugin::new()
            .on_create_client(Reply::error(ErrorCode::NotSupportProfile))
            .queue_forward(Reply::Respond(Response::ok(Map::new())))
            .on_forward(Reply::error(code)),
    );

    assert!(execute(&gw, request("light")).await?.is_ok());
    let response = execute(&gw, request("light")).await?;
    assert_eq!(response.error_code(), Some(code));

    // No token was sent, so the plugin's error is final and nothing is revoked.
    assert_eq!(gw.plugin.create_client_count(), 1);
    assert_eq!(forwarded_tokens(&gw.plugin), vec![None, None]);
    assert_eq!(gw.store.lookup(&key()), Some(TokenEntry::NoAuthRequired));
    Ok(())
}

#[tokio::test]
async fn handshake_rejection_is_final() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new().on_request_token(Reply::error(ErrorCode::Scope)));

    let response = execute(&gw, request("light")).await?;
    assert_eq!(response.error_code(), Some(ErrorCode::Scope));
    assert!(gw.plugin.forwarded().is_empty());
    Ok(())
}

#[tokio::test]
async fn handshake_timeout_answers_timeout() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new().on_create_client(Reply::Hang));
    let mut req = request("light");
    req.timeout = Duration::from_millis(30);

    let response = execute(&gw, req).await?;
    assert_eq!(response.error_code(), Some(ErrorCode::Timeout));
    assert!(gw.plugin.forwarded().is_empty());
    Ok(())
}

// ── rejection and retry ───────────────────────────────────────────────

#[yare::parameterized(
    authorization = { ErrorCode::Authorization },
    expired = { ErrorCode::ExpiredAccessToken },
    empty = { ErrorCode::EmptyAccessToken },
)]
#[test_macro(tokio::test)]
async fn rejected_token_is_replaced(code: ErrorCode) -> anyhow::Result<()> {
    let gw = TestGateway::new(
        ScriptedPlugin::new()
            .queue_request_token(Reply::ok(&[("accessToken", "t1")]))
            .on_request_token(Reply::ok(&[("accessToken", "t2")]))
            .queue_forward(Reply::error(code)),
    );

    let response = execute(&gw, request("light")).await?;
    assert!(response.is_ok());
    // The second registration only happens if the rejected entry was dropped.
    assert_eq!(gw.plugin.create_client_count(), 2);
    assert_eq!(
        forwarded_tokens(&gw.plugin),
        vec![Some("t1".to_owned()), Some("t2".to_owned())]
    );
    assert_eq!(gw.store.lookup(&key()).as_ref().and_then(TokenEntry::access_token), Some("t2"));
    Ok(())
}

#[tokio::test]
async fn store_is_cleared_before_reregistration() -> anyhow::Result<()> {
    // Filled in once the gateway exists; the observer reads the store as
    // each createClient arrives.
    let store_slot: Arc<Mutex<Option<Arc<TokenStore>>>> = Arc::new(Mutex::new(None));
    let entries_seen: Arc<Mutex<Vec<Option<TokenEntry>>>> = Arc::new(Mutex::new(Vec::new()));
    let plugin = {
        let store_slot = Arc::clone(&store_slot);
        let entries_seen = Arc::clone(&entries_seen);
        ScriptedPlugin::new()
            .queue_request_token(Reply::ok(&[("accessToken", "t1")]))
            .on_request_token(Reply::ok(&[("accessToken", "t2")]))
            .queue_forward(Reply::error(ErrorCode::ExpiredAccessToken))
            .on_message(move |m| {
                if m.is_authorization(crate::message::ATTRIBUTE_CREATE_CLIENT) {
                    if let Some(ref store) = *store_slot.lock() {
                        entries_seen.lock().push(store.lookup(&key()));
                    }
                }
            })
    };
    let gw = TestGateway::new(plugin);
    *store_slot.lock() = Some(Arc::clone(&gw.store));

    assert!(execute(&gw, request("light")).await?.is_ok());
    // The second registration found the rejected token already gone.
    assert_eq!(*entries_seen.lock(), vec![None, None]);
    assert_eq!(gw.store.lookup(&key()).as_ref().and_then(TokenEntry::access_token), Some("t2"));
    Ok(())
}

#[tokio::test]
async fn retries_are_bounded() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new().on_forward(Reply::error(ErrorCode::Authorization)));

    let response = execute(&gw, request("light")).await?;
    assert_eq!(response.error_code(), Some(ErrorCode::Authorization));
    let attempts = (MAX_RETRY_COUNT + 1) as usize;
    assert_eq!(gw.plugin.forwarded().len(), attempts);
    assert_eq!(gw.plugin.create_client_count(), attempts);
    Ok(())
}

#[tokio::test]
async fn lost_client_is_forgotten_without_retry() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new().queue_forward(Reply::error(ErrorCode::NotFoundClientId)));

    let response = execute(&gw, request("light")).await?;
    assert_eq!(response.error_code(), Some(ErrorCode::NotFoundClientId));
    assert_eq!(gw.plugin.forwarded().len(), 1);
    assert!(gw.store.lookup(&key()).is_none());

    // The next request starts from a fresh registration.
    assert!(execute(&gw, request("light")).await?.is_ok());
    assert_eq!(gw.plugin.create_client_count(), 2);
    Ok(())
}

#[yare::parameterized(
    scope = { ErrorCode::Scope },
    not_support_action = { ErrorCode::NotSupportAction },
    unknown = { ErrorCode::Unknown },
)]
#[test_macro(tokio::test)]
async fn other_errors_pass_through(code: ErrorCode) -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new().on_forward(Reply::error(code)));

    let response = execute(&gw, request("light")).await?;
    assert_eq!(response.error_code(), Some(code));
    assert_eq!(gw.plugin.forwarded().len(), 1);
    assert!(gw.store.lookup(&key()).is_some());
    Ok(())
}

#[tokio::test]
async fn concurrent_rejections_reregister_once() -> anyhow::Result<()> {
    let gw = TestGateway::new(
        ScriptedPlugin::new()
            .queue_request_token(Reply::ok(&[("accessToken", "t1")]))
            .on_request_token(Reply::ok(&[("accessToken", "t2")]))
            .queue_forward(Reply::error(ErrorCode::ExpiredAccessToken))
            .queue_forward(Reply::error(ErrorCode::ExpiredAccessToken))
            .with_delay(Duration::from_millis(10)),
    );

    let (a, b) = tokio::join!(execute(&gw, request("light")), execute(&gw, request("light")));
    assert!(a?.is_ok());
    assert!(b?.is_ok());
    assert_eq!(gw.plugin.create_client_count(), 2);
    assert_eq!(gw.plugin.request_token_count(), 2);
    Ok(())
}

// ── transport ─────────────────────────────────────────────────────────

#[tokio::test]
async fn plugin_timeout_answers_timeout() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new().on_forward(Reply::Hang));
    let mut req = request("light");
    req.timeout = Duration::from_millis(30);

    let response = execute(&gw, req).await?;
    assert_eq!(response.error_code(), Some(ErrorCode::Timeout));
    assert_eq!(response.error_message.as_deref(), Some("Response timeout."));
    Ok(())
}

#[tokio::test]
async fn transport_failure_answers_unknown() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new().on_forward(Reply::Fail("reset by peer".into())));

    let response = execute(&gw, request("light")).await?;
    assert_eq!(response.error_code(), Some(ErrorCode::Unknown));
    assert_eq!(gw.plugin.forwarded().len(), 1);
    Ok(())
}

#[tokio::test]
async fn forwarded_message_carries_request() -> anyhow::Result<()> {
    let gw = TestGateway::new(ScriptedPlugin::new());
    let mut req = request("light");
    req.method = Method::Put;
    req.params.insert("brightness".to_owned(), serde_json::Value::from(80));

    execute(&gw, req).await?;
    let forwarded = gw.plugin.forwarded();
    let [message] = forwarded.as_slice() else {
        anyhow::bail!("expected one forwarded message, got {}", forwarded.len());
    };
    assert_eq!(message.method, Method::Put);
    assert_eq!(message.service_id, LIGHT);
    assert_eq!(message.origin, ORIGIN);
    assert_eq!(message.path().to_string(), "light/on");
    assert_eq!(message.params.get("brightness"), Some(&serde_json::Value::from(80)));
    Ok(())
}
