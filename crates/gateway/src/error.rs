// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::message::Response;

/// Error codes carried in gateway and plugin responses.
///
/// On the wire an error code is its numeric value. Numbers a plugin sends
/// that the gateway does not know collapse to [`ErrorCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum ErrorCode {
    Unknown,
    NotSupportProfile,
    NotSupportAction,
    EmptyServiceId,
    NotFoundService,
    Timeout,
    InvalidRequestParameter,
    Authorization,
    ExpiredAccessToken,
    EmptyAccessToken,
    Scope,
    NotFoundClientId,
    InvalidOrigin,
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        match self {
            Self::Unknown => 1,
            Self::NotSupportProfile => 2,
            Self::NotSupportAction => 3,
            Self::EmptyServiceId => 5,
            Self::NotFoundService => 6,
            Self::Timeout => 7,
            Self::InvalidRequestParameter => 10,
            Self::Authorization => 11,
            Self::ExpiredAccessToken => 12,
            Self::EmptyAccessToken => 13,
            Self::Scope => 14,
            Self::NotFoundClientId => 15,
            Self::InvalidOrigin => 18,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotSupportProfile => "NOT_SUPPORT_PROFILE",
            Self::NotSupportAction => "NOT_SUPPORT_ACTION",
            Self::EmptyServiceId => "EMPTY_SERVICE_ID",
            Self::NotFoundService => "NOT_FOUND_SERVICE",
            Self::Timeout => "TIMEOUT",
            Self::InvalidRequestParameter => "INVALID_REQUEST_PARAMETER",
            Self::Authorization => "AUTHORIZATION",
            Self::ExpiredAccessToken => "EXPIRED_ACCESS_TOKEN",
            Self::EmptyAccessToken => "EMPTY_ACCESS_TOKEN",
            Self::Scope => "SCOPE",
            Self::NotFoundClientId => "NOT_FOUND_CLIENT_ID",
            Self::InvalidOrigin => "INVALID_ORIGIN",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unknown => 500,
            Self::NotSupportProfile => 404,
            Self::NotSupportAction => 405,
            Self::EmptyServiceId => 400,
            Self::NotFoundService => 404,
            Self::Timeout => 504,
            Self::InvalidRequestParameter => 400,
            Self::Authorization => 401,
            Self::ExpiredAccessToken => 401,
            Self::EmptyAccessToken => 401,
            Self::Scope => 403,
            Self::NotFoundClientId => 401,
            Self::InvalidOrigin => 400,
        }
    }

    /// Whether a plugin answering with this code has rejected the access
    /// token it was given. Such responses invalidate the cached token and are
    /// retried. [`ErrorCode::NotFoundClientId`] is not one of them.
    pub fn is_token_rejection(&self) -> bool {
        matches!(self, Self::Authorization | Self::ExpiredAccessToken | Self::EmptyAccessToken)
    }

    pub fn to_http_response(&self, message: impl Into<String>) -> (StatusCode, Json<Response>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(Response::error(*self, message)))
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        match code {
            2 => Self::NotSupportProfile,
            3 => Self::NotSupportAction,
            5 => Self::EmptyServiceId,
            6 => Self::NotFoundService,
            7 => Self::Timeout,
            10 => Self::InvalidRequestParameter,
            11 => Self::Authorization,
            12 => Self::ExpiredAccessToken,
            13 => Self::EmptyAccessToken,
            14 => Self::Scope,
            15 => Self::NotFoundClientId,
            18 => Self::InvalidOrigin,
            _ => Self::Unknown,
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
