//! Verdict types, the server-side auth policy, and the
//! [`AuthorizationStrategy`] seam the handshake orchestrator delegates to.

use async_trait::async_trait;
use std::net::IpAddr;
use wardgate_core::{
    normalize, AuthMethod, AuthMode, FailReason, GatewayAuthConfig, WardgateError,
    WardgateResult,
};
use wardgate_security::{RateLimitScope, RateLimiter};

/// Outcome of one authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    /// Accepted.
    Ok {
        /// How the client was authorized.
        method: AuthMethod,
    },
    /// Refused.
    Fail {
        /// Why the client was refused.
        reason: FailReason,
        /// Only set for [`FailReason::RateLimited`].
        retry_after_ms: Option<u64>,
    },
}

impl AuthVerdict {
    /// Accepted with `method`.
    pub fn ok(method: AuthMethod) -> Self {
        Self::Ok { method }
    }

    /// Refused without a retry hint.
    pub fn fail(reason: FailReason) -> Self {
        Self::Fail {
            reason,
            retry_after_ms: None,
        }
    }

    /// Refused because the client is locked out.
    pub fn rate_limited(retry_after_ms: Option<u64>) -> Self {
        Self::Fail {
            reason: FailReason::RateLimited,
            retry_after_ms,
        }
    }

    /// True when accepted.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// The successful method, if any.
    pub fn method(&self) -> Option<AuthMethod> {
        match self {
            Self::Ok { method } => Some(*method),
            Self::Fail { .. } => None,
        }
    }

    /// The failure reason, if any.
    pub fn reason(&self) -> Option<FailReason> {
        match self {
            Self::Ok { .. } => None,
            Self::Fail { reason, .. } => Some(*reason),
        }
    }
}

/// Token and/or password presented directly by a client.
///
/// Only exists when at least one of the two is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedConnectAuth {
    token: Option<String>,
    password: Option<String>,
}

impl SharedConnectAuth {
    /// Normalizes both values; returns `None` when both are blank.
    pub fn from_parts(token: Option<&str>, password: Option<&str>) -> Option<Self> {
        let token = normalize(token);
        let password = normalize(password);
        if token.is_none() && password.is_none() {
            return None;
        }
        Some(Self { token, password })
    }

    /// Presented token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Presented password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Facts about the inbound request that are not credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequestContext {
    /// Peer address, if known.
    pub client_ip: Option<IpAddr>,
    /// Identity asserted by a private-overlay proxy.
    pub overlay_user: Option<String>,
    /// Device identity declared in the handshake.
    pub device_id: Option<String>,
}

/// Server-side auth policy with secrets already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthPolicy {
    /// Which secret is compared.
    pub mode: AuthMode,
    /// Expected token.
    pub token: Option<String>,
    /// Expected password.
    pub password: Option<String>,
    /// Accept overlay peers without a secret.
    pub allow_private_network: bool,
}

impl ResolvedAuthPolicy {
    /// Build from `[gateway.auth]`, failing if the mode's secret is missing.
    pub fn from_config(config: &GatewayAuthConfig) -> WardgateResult<Self> {
        let policy = Self {
            mode: config.mode,
            token: normalize(config.token.as_deref()),
            password: normalize(config.password.as_deref()),
            allow_private_network: config.allow_private_network,
        };
        match policy.mode {
            AuthMode::Token if policy.token.is_none() => Err(WardgateError::Config(
                "gateway.auth.mode is \"token\" but gateway.auth.token is not set".to_string(),
            )),
            AuthMode::Password if policy.password.is_none() => Err(WardgateError::Config(
                "gateway.auth.mode is \"password\" but gateway.auth.password is not set"
                    .to_string(),
            )),
            _ => Ok(policy),
        }
    }

    /// Token-mode policy with no bypass.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            mode: AuthMode::Token,
            token: Some(token.into()),
            password: None,
            allow_private_network: false,
        }
    }

    /// Password-mode policy with no bypass.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            mode: AuthMode::Password,
            token: None,
            password: Some(password.into()),
            allow_private_network: false,
        }
    }

    /// Toggle the private-network bypass.
    pub fn allow_private_network(mut self, allow: bool) -> Self {
        self.allow_private_network = allow;
        self
    }

    /// The method a shared-secret success is reported as.
    pub fn shared_method(&self) -> AuthMethod {
        match self.mode {
            AuthMode::Token => AuthMethod::Token,
            AuthMode::Password => AuthMethod::Password,
        }
    }
}

/// Performs the actual credential checks for the two connect surfaces.
#[async_trait]
pub trait AuthorizationStrategy: Send + Sync {
    /// Authorize a WebSocket control-channel handshake.
    ///
    /// `device_token` is the candidate to verify against the device-token
    /// store when the handshake declared a device identity.
    async fn authorize_control_channel_connect(
        &self,
        policy: &ResolvedAuthPolicy,
        shared: Option<&SharedConnectAuth>,
        device_token: Option<&str>,
        ctx: &ConnectRequestContext,
        rate_limiter: Option<&dyn RateLimiter>,
        scope: &RateLimitScope,
    ) -> AuthVerdict;

    /// Authorize a plain HTTP request with shared-secret credentials.
    async fn authorize_http_connect(
        &self,
        policy: &ResolvedAuthPolicy,
        shared: Option<&SharedConnectAuth>,
        ctx: &ConnectRequestContext,
        rate_limiter: Option<&dyn RateLimiter>,
        scope: &RateLimitScope,
    ) -> AuthVerdict;
}
