//! Default [`AuthorizationStrategy`]: private-network bypass, device tokens,
//! and constant-time shared-secret comparison.

use crate::auth::{
    AuthVerdict, AuthorizationStrategy, ConnectRequestContext, ResolvedAuthPolicy,
    SharedConnectAuth,
};
use crate::device::DeviceTokenStore;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use wardgate_core::{AuthMethod, AuthMode, FailReason, RateLimitConfig};
use wardgate_security::{safe_equal, InMemoryRateLimiter, RateLimitScope, RateLimiter};

enum DeviceOutcome {
    Accepted,
    Rejected,
    Locked(Option<u64>),
}

/// Verifies handshakes against the configured policy and device store.
pub struct GatewayAuthorizer {
    devices: Arc<dyn DeviceTokenStore>,
    /// Throttles device-token guesses under [`RateLimitScope::DEVICE_TOKEN`].
    device_gate: Arc<dyn RateLimiter>,
}

impl GatewayAuthorizer {
    /// Authorizer with its own device gate using the default limits.
    pub fn new(devices: Arc<dyn DeviceTokenStore>) -> Self {
        Self {
            devices,
            device_gate: Arc::new(InMemoryRateLimiter::from_config(&RateLimitConfig::default())),
        }
    }

    /// Replace the device gate, e.g. with the gateway's shared limiter.
    pub fn with_device_gate(mut self, gate: Arc<dyn RateLimiter>) -> Self {
        self.device_gate = gate;
        self
    }

    async fn authorize_device(
        &self,
        device_id: &str,
        candidate: &str,
        client_ip: Option<IpAddr>,
    ) -> DeviceOutcome {
        let scope = RateLimitScope::DEVICE_TOKEN;
        let attempt = self.device_gate.try_attempt(client_ip, &scope).await;
        if !attempt.allowed {
            return DeviceOutcome::Locked(attempt.retry_after_ms);
        }

        // The attempt already counts as a failure unless it is reset here.
        if self.devices.verify(device_id, candidate).await {
            self.device_gate.reset(client_ip, &scope).await;
            DeviceOutcome::Accepted
        } else {
            DeviceOutcome::Rejected
        }
    }
}

#[async_trait]
impl AuthorizationStrategy for GatewayAuthorizer {
    async fn authorize_control_channel_connect(
        &self,
        policy: &ResolvedAuthPolicy,
        shared: Option<&SharedConnectAuth>,
        device_token: Option<&str>,
        ctx: &ConnectRequestContext,
        rate_limiter: Option<&dyn RateLimiter>,
        scope: &RateLimitScope,
    ) -> AuthVerdict {
        if private_network_bypass(policy, ctx) {
            return AuthVerdict::ok(AuthMethod::Bypass);
        }

        let mut device_rejected = false;
        if let (Some(candidate), Some(device_id)) = (device_token, ctx.device_id.as_deref()) {
            match self.authorize_device(device_id, candidate, ctx.client_ip).await {
                DeviceOutcome::Accepted => return AuthVerdict::ok(AuthMethod::Device),
                DeviceOutcome::Locked(retry_after_ms) => {
                    return AuthVerdict::rate_limited(retry_after_ms)
                }
                DeviceOutcome::Rejected => {
                    debug!(device_id, "Device token rejected, trying shared secret");
                    device_rejected = true;
                }
            }
        }

        if shared.is_none() && device_rejected {
            return AuthVerdict::fail(FailReason::InvalidCredentials);
        }
        authorize_shared_secret(policy, shared, ctx, rate_limiter, scope).await
    }

    async fn authorize_http_connect(
        &self,
        policy: &ResolvedAuthPolicy,
        shared: Option<&SharedConnectAuth>,
        ctx: &ConnectRequestContext,
        rate_limiter: Option<&dyn RateLimiter>,
        scope: &RateLimitScope,
    ) -> AuthVerdict {
        if private_network_bypass(policy, ctx) {
            return AuthVerdict::ok(AuthMethod::Bypass);
        }
        authorize_shared_secret(policy, shared, ctx, rate_limiter, scope).await
    }
}

async fn authorize_shared_secret(
    policy: &ResolvedAuthPolicy,
    shared: Option<&SharedConnectAuth>,
    ctx: &ConnectRequestContext,
    rate_limiter: Option<&dyn RateLimiter>,
    scope: &RateLimitScope,
) -> AuthVerdict {
    let (provided, expected) = match policy.mode {
        AuthMode::Token => (shared.and_then(SharedConnectAuth::token), policy.token.as_deref()),
        AuthMode::Password => (
            shared.and_then(SharedConnectAuth::password),
            policy.password.as_deref(),
        ),
    };
    let Some(provided) = provided else {
        return AuthVerdict::fail(FailReason::MissingAuth);
    };

    // The attempt is counted before the compare so concurrent guesses cannot
    // outrun the budget; a match releases it again.
    if let Some(limiter) = rate_limiter {
        let attempt = limiter.try_attempt(ctx.client_ip, scope).await;
        if !attempt.allowed {
            return AuthVerdict::rate_limited(attempt.retry_after_ms);
        }
    }

    // A policy without its mode's secret can only come from a hand-built
    // value; it accepts nothing.
    let matched = expected.is_some_and(|expected| safe_equal(provided, expected));
    if matched {
        if let Some(limiter) = rate_limiter {
            limiter.reset(ctx.client_ip, scope).await;
        }
    }

    if matched {
        AuthVerdict::ok(policy.shared_method())
    } else {
        warn!(
            client_ip = ?ctx.client_ip,
            mode = ?policy.mode,
            "Shared secret mismatch"
        );
        AuthVerdict::fail(FailReason::InvalidCredentials)
    }
}

/// The overlay bypass applies only when the policy allows it, the peer sits
/// in the overlay address range, and the overlay proxy named a user.
fn private_network_bypass(policy: &ResolvedAuthPolicy, ctx: &ConnectRequestContext) -> bool {
    policy.allow_private_network
        && ctx.overlay_user.is_some()
        && ctx.client_ip.is_some_and(is_overlay_address)
}

/// 100.64.0.0/10 and fd7a:115c:a1e0::/48.
pub fn is_overlay_address(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            a == 100 && (b & 0xc0) == 64
        }
        IpAddr::V6(v6) => {
            let [a, b, c, ..] = v6.segments();
            a == 0xfd7a && b == 0x115c && c == 0xa1e0
        }
    }
}
