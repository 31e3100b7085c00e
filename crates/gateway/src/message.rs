// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request and response model shared by the dispatcher, the handshake
//! coordinator and the plugin channel.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::TokenKey;
use crate::error::ErrorCode;

/// Origin used as the token cache key when a caller does not identify itself.
pub const ANONYMOUS_ORIGIN: &str = "<anonymous>";

/// Profile every plugin exposes for the client/token handshake.
pub const AUTHORIZATION_PROFILE: &str = "authorization";
pub const ATTRIBUTE_CREATE_CLIENT: &str = "createClient";
pub const ATTRIBUTE_REQUEST_ACCESS_TOKEN: &str = "requestAccessToken";

// -- Capability path ----------------------------------------------------------

/// The `profile[/interface][/attribute]` triple naming a plugin operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPath {
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl CapabilityPath {
    pub fn new(profile: impl Into<String>) -> Self {
        Self { profile: profile.into(), interface: None, attribute: None }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Parse `profile`, `profile/attribute` or `profile/interface/attribute`.
    /// Leading, trailing and doubled slashes are ignored.
    pub fn parse(path: &str) -> anyhow::Result<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [profile] => Ok(Self::new(*profile)),
            [profile, attribute] => Ok(Self::new(*profile).with_attribute(*attribute)),
            [profile, interface, attribute] => {
                Ok(Self::new(*profile).with_interface(*interface).with_attribute(*attribute))
            }
            [] => anyhow::bail!("empty capability path"),
            _ => anyhow::bail!("capability path has too many segments: {path}"),
        }
    }

    /// Path addressing one attribute of the authorization profile.
    pub fn authorization(attribute: &str) -> Self {
        Self::new(AUTHORIZATION_PROFILE).with_attribute(attribute)
    }
}

impl fmt::Display for CapabilityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.profile)?;
        if let Some(ref interface) = self.interface {
            write!(f, "/{interface}")?;
        }
        if let Some(ref attribute) = self.attribute {
            write!(f, "/{attribute}")?;
        }
        Ok(())
    }
}

/// Request method. GET/POST/PUT/DELETE map to read/create/update/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&axum::http::Method> for Method {
    type Error = anyhow::Error;

    fn try_from(method: &axum::http::Method) -> Result<Self, Self::Error> {
        match *method {
            axum::http::Method::GET => Ok(Self::Get),
            axum::http::Method::POST => Ok(Self::Post),
            axum::http::Method::PUT => Ok(Self::Put),
            axum::http::Method::DELETE => Ok(Self::Delete),
            ref other => anyhow::bail!("unsupported method: {other}"),
        }
    }
}

// -- Requests -----------------------------------------------------------------

/// A command as submitted by a caller, before validation.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub service_id: Option<String>,
    pub path: CapabilityPath,
    pub method: Method,
    pub origin: Option<String>,
    pub params: Map<String, Value>,
    /// Per-request timeout; the dispatcher default applies when unset.
    pub timeout: Option<Duration>,
}

impl InboundRequest {
    pub fn new(service_id: impl Into<String>, method: Method, path: CapabilityPath) -> Self {
        Self {
            service_id: Some(service_id.into()),
            path,
            method,
            origin: None,
            params: Map::new(),
            timeout: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A validated request owned by one executor until it resolves.
#[derive(Debug, Clone)]
pub struct Request {
    pub correlation_id: Uuid,
    pub service_id: String,
    pub path: CapabilityPath,
    pub method: Method,
    pub origin: String,
    pub params: Map<String, Value>,
    pub requires_token: bool,
    /// Informational: whether the dispatcher demanded an origin. The check
    /// itself runs before the request is admitted.
    pub require_origin: bool,
    pub timeout: Duration,
    pub retry_count: u32,
}

impl Request {
    /// Token cache key this request is authorized under.
    pub fn token_key(&self) -> TokenKey {
        TokenKey::new(self.origin.as_str(), self.service_id.as_str())
    }
}

/// Message delivered to a plugin over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMessage {
    pub request_code: Uuid,
    pub method: Method,
    pub service_id: String,
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl PluginMessage {
    /// Build the forwarded form of a client request.
    pub fn forward(request: &Request, access_token: Option<&str>) -> Self {
        Self {
            request_code: Uuid::new_v4(),
            method: request.method,
            service_id: request.service_id.clone(),
            profile: request.path.profile.clone(),
            interface: request.path.interface.clone(),
            attribute: request.path.attribute.clone(),
            origin: request.origin.clone(),
            access_token: access_token.map(str::to_owned),
            params: request.params.clone(),
        }
    }

    /// Build a GET against the plugin's authorization profile.
    pub fn authorization(
        service_id: &str,
        origin: &str,
        attribute: &str,
        params: Map<String, Value>,
    ) -> Self {
        let path = CapabilityPath::authorization(attribute);
        Self {
            request_code: Uuid::new_v4(),
            method: Method::Get,
            service_id: service_id.to_owned(),
            profile: path.profile,
            interface: None,
            attribute: path.attribute,
            origin: origin.to_owned(),
            access_token: None,
            params,
        }
    }

    pub fn path(&self) -> CapabilityPath {
        CapabilityPath {
            profile: self.profile.clone(),
            interface: self.interface.clone(),
            attribute: self.attribute.clone(),
        }
    }

    /// Whether this message is the given step of the authorization handshake.
    pub fn is_authorization(&self, attribute: &str) -> bool {
        self.profile.eq_ignore_ascii_case(AUTHORIZATION_PROFILE)
            && self.attribute.as_deref() == Some(attribute)
    }
}

// -- Responses ----------------------------------------------------------------

/// `result` field of a response: `0` for success, anything else is an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ResultCode {
    Ok,
    #[default]
    Error,
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        if value == 0 {
            Self::Ok
        } else {
            Self::Error
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(value: ResultCode) -> Self {
        match value {
            ResultCode::Ok => 0,
            ResultCode::Error => 1,
        }
    }
}

/// Response envelope, used both for plugin replies and for what the
/// gateway hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default)]
    pub result: ResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Response {
    pub fn ok(payload: Map<String, Value>) -> Self {
        Self { result: ResultCode::Ok, error_code: None, error_message: None, payload }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            result: ResultCode::Error,
            error_code: Some(code),
            error_message: Some(message.into()),
            payload: Map::new(),
        }
    }

    pub fn timeout() -> Self {
        Self::error(ErrorCode::Timeout, "Response timeout.")
    }

    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok
    }

    /// Error code of an error response. An error without a code reads as
    /// [`ErrorCode::Unknown`]; a success has none.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self.result {
            ResultCode::Ok => None,
            ResultCode::Error => Some(self.error_code.unwrap_or(ErrorCode::Unknown)),
        }
    }

    /// A non-empty string field from the payload.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn http_status(&self) -> u16 {
        self.error_code().map_or(200, |code| code.http_status())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
