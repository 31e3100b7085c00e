// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::auth::{HandshakeSettings, DEFAULT_IGNORED_PROFILES};
use crate::dispatch::DispatchSettings;

/// Local request-routing gateway for device plugins.
#[derive(Debug, Clone, Parser)]
#[command(name = "plugmux", version, about)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "PLUGMUX_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 4035, env = "PLUGMUX_PORT")]
    pub port: u16,

    /// Path to the plugin list JSON file.
    #[arg(long, env = "PLUGMUX_PLUGINS")]
    pub plugins: Option<PathBuf>,

    /// Per-request timeout in milliseconds, when the caller sets none.
    /// Also bounds each handshake round trip.
    #[arg(long, default_value_t = 60_000, env = "PLUGMUX_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Hard limit on a whole dispatch in milliseconds, retries included.
    #[arg(long, default_value_t = 180_000, env = "PLUGMUX_DISPATCH_TIMEOUT_MS")]
    pub dispatch_timeout_ms: u64,

    /// Application name sent when requesting access tokens.
    #[arg(long, default_value = "plugmux", env = "PLUGMUX_APP_NAME")]
    pub app_name: String,

    /// Forward requests without access tokens.
    #[arg(long, env = "PLUGMUX_NO_ACCESS_TOKEN")]
    pub no_access_token: bool,

    /// Reject requests that carry no origin.
    #[arg(long, env = "PLUGMUX_REQUIRE_ORIGIN")]
    pub require_origin: bool,

    /// Profiles forwarded without a token (comma-separated).
    #[arg(
        long = "ignore-profile",
        value_delimiter = ',',
        default_values_t = DEFAULT_IGNORED_PROFILES.iter().map(|p| (*p).to_owned()).collect::<Vec<_>>(),
        env = "PLUGMUX_IGNORE_PROFILES"
    )]
    pub ignored_profiles: Vec<String>,

    /// Persist issued tokens to this JSON file and reload them at startup.
    #[arg(long, env = "PLUGMUX_TOKEN_SNAPSHOT")]
    pub token_snapshot: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "PLUGMUX_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PLUGMUX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl GatewayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_ms == 0 {
            anyhow::bail!("--request-timeout-ms must be positive");
        }
        if self.dispatch_timeout_ms == 0 {
            anyhow::bail!("--dispatch-timeout-ms must be positive");
        }
        if self.app_name.trim().is_empty() {
            anyhow::bail!("--app-name must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn use_access_token(&self) -> bool {
        !self.no_access_token
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            default_timeout: self.request_timeout(),
            dispatch_timeout: self.dispatch_timeout(),
            use_access_token: self.use_access_token(),
            require_origin: self.require_origin,
        }
    }

    pub fn handshake_settings(&self) -> HandshakeSettings {
        HandshakeSettings {
            application_name: self.app_name.clone(),
            snapshot_path: self.token_snapshot.clone(),
        }
    }

    /// Ignored profiles, trimmed and without empty entries.
    pub fn ignored_profiles(&self) -> Vec<String> {
        self.ignored_profiles
            .iter()
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
