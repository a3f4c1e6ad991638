//! Handshake frames exchanged on the `/ws` socket.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Raw credentials a client presents when connecting. Values are trimmed by
/// the receiver; blank values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeCredentials {
    /// Shared token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Token issued to a paired device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    /// Shared password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Device identity declared by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Paired device id.
    #[serde(default)]
    pub id: Option<String>,
}

/// How a connection was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Shared token.
    Token,
    /// Shared password.
    Password,
    /// Paired device token.
    Device,
    /// Private-network bypass.
    Bypass,
}

impl AuthMethod {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Password => "password",
            Self::Device => "device",
            Self::Bypass => "bypass",
        }
    }

    /// True for token and password, the two shared-secret methods.
    pub fn is_shared_secret(&self) -> bool {
        matches!(self, Self::Token | Self::Password)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// A secret was presented and did not match.
    InvalidCredentials,
    /// Too many recent failures from this client.
    RateLimited,
    /// Nothing usable was presented.
    MissingAuth,
}

impl FailReason {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::RateLimited => "rate_limited",
            Self::MissingAuth => "missing_auth",
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Must be the first frame on a new socket.
    Connect {
        /// Presented secrets.
        #[serde(default)]
        auth: HandshakeCredentials,
        /// Declared device identity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device: Option<DeviceInfo>,
    },
    /// Liveness check; answered with `pong`.
    Ping,
}

/// Frames sent by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted.
    Hello {
        /// Id assigned to the socket.
        connection_id: Uuid,
        /// How the socket was authorized.
        auth_method: AuthMethod,
        /// Whether the presented token/password is valid on its own.
        shared_auth_ok: bool,
    },
    /// Handshake refused; the socket is closed right after.
    Error {
        /// Why the handshake was refused.
        reason: FailReason,
        /// Set when rate limited.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    /// Reply to `ping`.
    Pong,
}
