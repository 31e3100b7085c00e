// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

// ── CapabilityPath ────────────────────────────────────────────────────

#[yare::parameterized(
    profile_only = { "battery", "battery", None, None },
    profile_attribute = { "vibration/vibrate", "vibration", None, Some("vibrate") },
    full = { "/light/group/on", "light", Some("group"), Some("on") },
    doubled_slashes = { "light//on/", "light", None, Some("on") },
)]
fn parse_capability_path(
    input: &str,
    profile: &str,
    interface: Option<&str>,
    attribute: Option<&str>,
) -> anyhow::Result<()> {
    let path = CapabilityPath::parse(input)?;
    assert_eq!(path.profile, profile);
    assert_eq!(path.interface.as_deref(), interface);
    assert_eq!(path.attribute.as_deref(), attribute);
    Ok(())
}

#[test]
fn parse_rejects_empty_and_overlong_paths() {
    assert!(CapabilityPath::parse("").is_err());
    assert!(CapabilityPath::parse("///").is_err());
    assert!(CapabilityPath::parse("a/b/c/d").is_err());
}

#[test]
fn display_skips_missing_segments() {
    assert_eq!(CapabilityPath::new("battery").to_string(), "battery");
    assert_eq!(
        CapabilityPath::new("light").with_interface("group").with_attribute("on").to_string(),
        "light/group/on"
    );
    assert_eq!(
        CapabilityPath::authorization(ATTRIBUTE_CREATE_CLIENT).to_string(),
        "authorization/createClient"
    );
}

// ── Response ──────────────────────────────────────────────────────────

#[test]
fn plugin_reply_parses_result_code_and_fields() -> anyhow::Result<()> {
    let reply: Response =
        serde_json::from_str(r#"{"result":0,"clientId":"c1","level":0.5}"#)?;
    assert!(reply.is_ok());
    assert_eq!(reply.error_code(), None);
    assert_eq!(reply.str_field("clientId"), Some("c1"));
    assert_eq!(reply.payload["level"], 0.5);
    Ok(())
}

#[test]
fn error_reply_without_code_reads_as_unknown() -> anyhow::Result<()> {
    let reply: Response = serde_json::from_str(r#"{"result":1}"#)?;
    assert!(!reply.is_ok());
    assert_eq!(reply.error_code(), Some(ErrorCode::Unknown));
    assert_eq!(reply.http_status(), 500);
    Ok(())
}

#[test]
fn missing_result_is_an_error() -> anyhow::Result<()> {
    let reply: Response = serde_json::from_str(r#"{"accessToken":"t1"}"#)?;
    assert!(!reply.is_ok());
    Ok(())
}

#[test]
fn empty_string_field_is_absent() {
    let mut payload = Map::new();
    payload.insert("clientId".to_owned(), Value::from(""));
    let reply = Response::ok(payload);
    assert_eq!(reply.str_field("clientId"), None);
}

#[test]
fn error_response_serializes_flat() -> anyhow::Result<()> {
    let value = serde_json::to_value(Response::error(ErrorCode::EmptyServiceId, "no id"))?;
    assert_eq!(value["result"], 1);
    assert_eq!(value["errorCode"], 5);
    assert_eq!(value["errorMessage"], "no id");
    Ok(())
}

// ── PluginMessage ─────────────────────────────────────────────────────

#[test]
fn forward_copies_request_and_token() {
    let request = Request {
        correlation_id: Uuid::new_v4(),
        service_id: "host.test".to_owned(),
        path: CapabilityPath::new("light").with_attribute("on"),
        method: Method::Put,
        origin: "app.example".to_owned(),
        params: Map::new(),
        requires_token: true,
        require_origin: false,
        timeout: Duration::from_secs(1),
        retry_count: 0,
    };
    let msg = PluginMessage::forward(&request, Some("t1"));
    assert_eq!(msg.method, Method::Put);
    assert_eq!(msg.path(), request.path);
    assert_eq!(msg.access_token.as_deref(), Some("t1"));
    assert!(!msg.is_authorization(ATTRIBUTE_CREATE_CLIENT));

    let key = request.token_key();
    assert_eq!(key.origin, "app.example");
    assert_eq!(key.service_id, "host.test");
}

#[test]
fn authorization_message_targets_profile() -> anyhow::Result<()> {
    let msg = PluginMessage::authorization("s1", "app", ATTRIBUTE_REQUEST_ACCESS_TOKEN, Map::new());
    assert!(msg.is_authorization(ATTRIBUTE_REQUEST_ACCESS_TOKEN));
    assert_eq!(msg.method, Method::Get);
    let value = serde_json::to_value(&msg)?;
    assert_eq!(value["profile"], "authorization");
    assert_eq!(value["attribute"], "requestAccessToken");
    assert!(value.get("accessToken").is_none());
    Ok(())
}
