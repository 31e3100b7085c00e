// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugins: where they live, what they support, and how to reach them.

pub mod channel;
pub mod registry;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use channel::{HttpChannel, PluginChannel};
pub use registry::PluginTable;

/// Address and capabilities of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    /// Service identifier clients address requests to.
    pub service_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Base URL of the plugin's message endpoint.
    pub address: String,
    /// Profiles the plugin implements. Also the scope requested at token issuance.
    #[serde(default)]
    pub profiles: Vec<String>,
}

impl PluginInfo {
    pub fn supports(&self, profile: &str) -> bool {
        self.profiles.iter().any(|p| p.trim().eq_ignore_ascii_case(profile))
    }

    /// Comma-joined profile list sent as the `scope` of a token request.
    pub fn scope(&self) -> String {
        self.profiles.iter().map(|p| p.trim()).collect::<Vec<_>>().join(",")
    }
}

/// Read-only plugin lookup used by the dispatcher.
pub trait PluginRegistry: Send + Sync + 'static {
    fn find(&self, service_id: &str) -> Option<PluginInfo>;
}

/// Plugin list file loaded with `--plugins`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    pub plugins: Vec<PluginInfo>,
}

impl PluginConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PluginConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }
}
