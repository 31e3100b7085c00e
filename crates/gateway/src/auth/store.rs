// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token cache keyed by (origin, service id).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::auth::TokenKey;

/// Client registration and token held for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthRecord {
    pub origin: String,
    pub service_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// What the cache knows about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEntry {
    /// A registered client, with a token once one was issued.
    Client(OAuthRecord),
    /// The plugin does not implement authorization; forward without a token.
    NoAuthRequired,
}

impl TokenEntry {
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Client(record) => record.access_token.as_deref(),
            Self::NoAuthRequired => None,
        }
    }
}

/// Serializable copy of the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSnapshot {
    #[serde(default)]
    pub clients: Vec<OAuthRecord>,
    #[serde(default)]
    pub no_auth: Vec<TokenKey>,
}

/// Pure in-memory store. Every operation takes the lock once; no lock is
/// ever held across an await.
#[derive(Default)]
pub struct TokenStore {
    entries: RwLock<HashMap<TokenKey, TokenEntry>>,
    lookups: AtomicU64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &TokenKey) -> Option<TokenEntry> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.entries.read().get(key).cloned()
    }

    /// Create or overwrite the client record for `key`.
    pub(crate) fn put(&self, key: &TokenKey, client_id: String, access_token: Option<String>) {
        let record = OAuthRecord {
            origin: key.origin.clone(),
            service_id: key.service_id.clone(),
            client_id,
            client_secret: None,
            access_token,
        };
        self.entries.write().insert(key.clone(), TokenEntry::Client(record));
    }

    /// Remove whatever is stored for `key`.
    pub(crate) fn invalidate(&self, key: &TokenKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove the entry only if it still carries `rejected` as its token
    /// (`None` matches a sentinel or a client without a token).
    pub(crate) fn invalidate_if(&self, key: &TokenKey, rejected: Option<&str>) -> bool {
        let mut entries = self.entries.write();
        let matches = entries.get(key).is_some_and(|entry| entry.access_token() == rejected);
        if matches {
            entries.remove(key);
        }
        matches
    }

    pub(crate) fn mark_no_auth_required(&self, key: &TokenKey) {
        self.entries.write().insert(key.clone(), TokenEntry::NoAuthRequired);
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        let entries = self.entries.read();
        let mut snapshot = TokenSnapshot::default();
        for (key, entry) in entries.iter() {
            match entry {
                TokenEntry::Client(record) => snapshot.clients.push(record.clone()),
                TokenEntry::NoAuthRequired => snapshot.no_auth.push(key.clone()),
            }
        }
        snapshot.clients.sort_by(|a, b| {
            (&a.origin, &a.service_id).cmp(&(&b.origin, &b.service_id))
        });
        snapshot.no_auth.sort();
        snapshot
    }

    /// Load a snapshot on top of the current content.
    pub(crate) fn restore(&self, snapshot: TokenSnapshot) {
        let mut entries = self.entries.write();
        for record in snapshot.clients {
            let key = TokenKey::new(record.origin.clone(), record.service_id.clone());
            entries.insert(key, TokenEntry::Client(record));
        }
        for key in snapshot.no_auth {
            entries.insert(key, TokenEntry::NoAuthRequired);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `lookup` calls since creation.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
