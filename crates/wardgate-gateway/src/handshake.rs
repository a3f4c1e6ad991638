//! Connection-level authorization for `/ws` handshakes.
//!
//! [`ConnectionAuthOrchestrator`] combines three checks into one
//! [`ConnectAuthState`]:
//!
//! 1. the primary control-channel verdict (bypass, device token, or shared
//!    secret), which decides accept or reject;
//! 2. a shared-secret rate check when a device-token attempt was actually
//!    satisfied by the shared secret, so that guesses cannot dodge the
//!    shared-secret budget by posing as device tokens;
//! 3. an independent check of the shared secret alone, reported as
//!    `shared_auth_ok`.

use crate::auth::{
    AuthVerdict, AuthorizationStrategy, ConnectRequestContext, ResolvedAuthPolicy,
    SharedConnectAuth,
};
use std::sync::Arc;
use tracing::warn;
use wardgate_core::{normalize, AuthMethod, HandshakeCredentials};
use wardgate_security::{RateLimitScope, RateLimiter};

/// Aggregate authorization result for one handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAuthState {
    auth_result: AuthVerdict,
    auth_method: AuthMethod,
    shared_auth_ok: bool,
    shared_auth_provided: bool,
    device_token_candidate: Option<String>,
}

impl ConnectAuthState {
    /// The verdict that decides accept or reject.
    pub fn auth_result(&self) -> AuthVerdict {
        self.auth_result
    }

    /// True when the handshake is accepted.
    pub fn auth_ok(&self) -> bool {
        self.auth_result.is_ok()
    }

    /// The verdict's method, or the policy's shared-secret method on failure.
    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// The presented token/password is valid on its own (never set by
    /// device or bypass success).
    pub fn shared_auth_ok(&self) -> bool {
        self.shared_auth_ok
    }

    /// A non-blank token or password was presented.
    pub fn shared_auth_provided(&self) -> bool {
        self.shared_auth_provided
    }

    /// Device token tried, falling back to the shared token.
    pub fn device_token_candidate(&self) -> Option<&str> {
        self.device_token_candidate.as_deref()
    }
}

/// Stateless handshake authorizer; safe to share across connections.
pub struct ConnectionAuthOrchestrator {
    strategy: Arc<dyn AuthorizationStrategy>,
}

impl ConnectionAuthOrchestrator {
    /// Orchestrator delegating to `strategy`.
    pub fn new(strategy: Arc<dyn AuthorizationStrategy>) -> Self {
        Self { strategy }
    }

    /// The strategy verdicts come from.
    pub fn strategy(&self) -> &Arc<dyn AuthorizationStrategy> {
        &self.strategy
    }

    /// Authorize one handshake. Never fails; refusals are [`AuthVerdict::Fail`].
    pub async fn resolve_connect_auth_state(
        &self,
        policy: &ResolvedAuthPolicy,
        handshake: &HandshakeCredentials,
        has_device_identity: bool,
        ctx: &ConnectRequestContext,
        rate_limiter: Option<&dyn RateLimiter>,
    ) -> ConnectAuthState {
        let token = normalize(handshake.token.as_deref());
        let device_token = normalize(handshake.device_token.as_deref());
        let shared = SharedConnectAuth::from_parts(token.as_deref(), handshake.password.as_deref());
        let shared_auth_provided = shared.is_some();

        let device_token_candidate = if has_device_identity {
            device_token.or(token)
        } else {
            None
        };

        let scope = RateLimitScope::SHARED_SECRET;
        // Device verification has its own gate; a device attempt must not
        // also count against the shared-secret budget here.
        let primary_limiter = if device_token_candidate.is_some() {
            None
        } else {
            rate_limiter
        };

        let mut auth_result = self
            .strategy
            .authorize_control_channel_connect(
                policy,
                shared.as_ref(),
                device_token_candidate.as_deref(),
                ctx,
                primary_limiter,
                &scope,
            )
            .await;

        if device_token_candidate.is_some() {
            if let (Some(limiter), Some(method)) = (rate_limiter, auth_result.method()) {
                if method.is_shared_secret() {
                    let check = limiter.check(ctx.client_ip, &scope).await;
                    if check.allowed {
                        limiter.reset(ctx.client_ip, &scope).await;
                    } else {
                        warn!(
                            client_ip = ?ctx.client_ip,
                            "Shared-secret success via device path refused: client is rate limited"
                        );
                        auth_result = AuthVerdict::rate_limited(check.retry_after_ms);
                    }
                }
            }
        }

        let shared_auth_ok = match &shared {
            Some(shared) => {
                let shared_only_policy = ResolvedAuthPolicy {
                    allow_private_network: false,
                    ..policy.clone()
                };
                self.strategy
                    .authorize_http_connect(&shared_only_policy, Some(shared), ctx, None, &scope)
                    .await
                    .method()
                    .is_some_and(|method| method.is_shared_secret())
            }
            None => false,
        };

        let auth_method = auth_result
            .method()
            .unwrap_or_else(|| policy.shared_method());

        ConnectAuthState {
            auth_result,
            auth_method,
            shared_auth_ok,
            shared_auth_provided,
            device_token_candidate,
        }
    }
}
