// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local authorization: per-(origin, service) tokens obtained from plugins.
//!
//! The gateway registers itself as a client with each plugin on behalf of a
//! calling origin, requests an access token scoped to the plugin's profiles,
//! and attaches that token to every request it forwards. Handshakes run on a
//! single coordinator task so two callers never register duplicate clients.

pub mod handshake;
pub mod persist;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

pub use handshake::{HandshakeCoordinator, HandshakeError, HandshakeOutcome, HandshakeSettings};
pub use store::{OAuthRecord, TokenEntry, TokenSnapshot, TokenStore};

/// Times a request is re-sent after a plugin rejects its token.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Profiles forwarded without a token even when tokens are in use.
pub const DEFAULT_IGNORED_PROFILES: &[&str] = &["authorization", "servicediscovery", "system"];

/// Token cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenKey {
    pub origin: String,
    pub service_id: String,
}

impl TokenKey {
    pub fn new(origin: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self { origin: origin.into(), service_id: service_id.into() }
    }
}

/// Changes to the token cache, broadcast by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    ClientRegistered { key: TokenKey, client_id: String },
    TokenIssued { key: TokenKey },
    TokenRevoked { key: TokenKey },
    NoAuthRequired { key: TokenKey },
    HandshakeFailed { key: TokenKey, error: ErrorCode },
}

impl AuthEvent {
    pub fn key(&self) -> &TokenKey {
        match self {
            Self::ClientRegistered { key, .. }
            | Self::TokenIssued { key }
            | Self::TokenRevoked { key }
            | Self::NoAuthRequired { key }
            | Self::HandshakeFailed { key, .. } => key,
        }
    }
}
