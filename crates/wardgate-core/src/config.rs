//! `wardgate.toml` configuration.
//!
//! Every section is optional; a missing file section falls back to its
//! defaults so that a minimal config only needs the secrets it uses.

use crate::{WardgateError, WardgateResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether the client talks to a gateway on this machine or a remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Gateway runs locally; `gateway.auth` holds the secrets.
    #[default]
    Local,
    /// Gateway is remote; `gateway.remote` overrides the local secrets.
    Remote,
}

/// Which shared secret the gateway verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Clients present a token.
    #[default]
    Token,
    /// Clients present a password.
    Password,
}

/// `[gateway.auth]`: local-mode secrets and server verification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayAuthConfig {
    /// Secret the server verifies.
    #[serde(default)]
    pub mode: AuthMode,
    /// Shared token.
    #[serde(default)]
    pub token: Option<String>,
    /// Shared password.
    #[serde(default)]
    pub password: Option<String>,
    /// Trust connections that arrive over the private overlay network.
    #[serde(default)]
    pub allow_private_network: bool,
}

/// `[gateway.remote]`: remote-mode destination and secret overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayRemoteConfig {
    /// Remote gateway WebSocket URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Token for the remote gateway.
    #[serde(default)]
    pub token: Option<String>,
    /// Password for the remote gateway.
    #[serde(default)]
    pub password: Option<String>,
}

/// `[gateway.rate_limit]`: failed-attempt throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Failures tolerated inside one window before the key is locked.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sliding window for counting failures.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// How long a locked key stays locked.
    #[serde(default = "default_lockout_ms")]
    pub lockout_ms: u64,
    /// Never throttle 127.0.0.0/8 and ::1.
    #[serde(default = "default_true")]
    pub exempt_loopback: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_ms: default_window_ms(),
            lockout_ms: default_lockout_ms(),
            exempt_loopback: true,
        }
    }
}

/// `[[gateway.devices]]`: a paired device and its token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTokenConfig {
    /// Device id sent in the connect frame.
    pub id: String,
    /// Token issued at pairing.
    pub token: String,
}

/// `[gateway]`: the policy both the client and the server read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayPolicyConfig {
    /// Local or remote gateway.
    #[serde(default)]
    pub mode: GatewayMode,
    /// Local secrets and verification settings.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
    /// Remote destination and secrets.
    #[serde(default)]
    pub remote: GatewayRemoteConfig,
    /// Failed-attempt throttling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Paired devices.
    #[serde(default)]
    pub devices: Vec<DeviceTokenConfig>,
}

/// `[server]`: listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long a socket may stay open without sending its connect frame.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// The `ws://` URL a local client uses to reach this server.
    pub fn local_ws_url(&self) -> String {
        let host = if self.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("ws://{host}:{}/ws", self.port)
    }
}

/// `[audit]`: where handshake decisions are recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Write decisions to disk.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory holding `audit.jsonl`.
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_audit_dir(),
        }
    }
}

/// Top-level `wardgate.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardgateConfig {
    /// `[gateway]`
    #[serde(default)]
    pub gateway: GatewayPolicyConfig,
    /// `[server]`
    #[serde(default)]
    pub server: ServerConfig,
    /// `[audit]`
    #[serde(default)]
    pub audit: AuditConfig,
}

impl WardgateConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> WardgateResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub async fn load(path: &Path) -> WardgateResult<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            WardgateError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> WardgateResult<()> {
        let limits = &self.gateway.rate_limit;
        if limits.max_attempts == 0 {
            return Err(WardgateError::Config(
                "gateway.rate_limit.max_attempts must be at least 1".to_string(),
            ));
        }
        if limits.window_ms == 0 {
            return Err(WardgateError::Config(
                "gateway.rate_limit.window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    10
}
fn default_window_ms() -> u64 {
    60_000
}
fn default_lockout_ms() -> u64 {
    300_000
}
fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    18789
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_audit_dir() -> PathBuf {
    PathBuf::from("./data/audit")
}
