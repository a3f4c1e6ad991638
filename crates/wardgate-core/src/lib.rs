//! Core types shared across the Wardgate crates.
//!
//! # Main types
//!
//! - [`WardgateError`]: Error enum for config, server and client failures.
//! - [`WardgateResult`]: Convenience alias for `Result<T, WardgateError>`.
//! - [`WardgateConfig`]: Parsed `wardgate.toml`.
//! - [`GatewayPolicyConfig`]: The `[gateway]` policy read by client and server.
//! - [`ClientFrame`] / [`ServerFrame`]: Handshake frames on the `/ws` socket.

/// `wardgate.toml` configuration types.
pub mod config;
/// Credential value normalization.
pub mod credentials;
mod error;
/// WebSocket handshake frames.
pub mod protocol;

pub use config::{
    AuditConfig, AuthMode, DeviceTokenConfig, GatewayAuthConfig, GatewayMode,
    GatewayPolicyConfig, GatewayRemoteConfig, RateLimitConfig, ServerConfig, WardgateConfig,
};
pub use credentials::normalize;
pub use error::{WardgateError, WardgateResult};
pub use protocol::{
    AuthMethod, ClientFrame, DeviceInfo, FailReason, HandshakeCredentials, ServerFrame,
};
