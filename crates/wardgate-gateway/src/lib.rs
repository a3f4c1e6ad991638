//! Connection authorization for the Wardgate gateway.
//!
//! # Main types
//!
//! - [`ConnectionAuthOrchestrator`]: Turns one handshake into a [`ConnectAuthState`].
//! - [`AuthorizationStrategy`]: The credential-checking seam.
//!   [`GatewayAuthorizer`] is the default.
//! - [`AuthVerdict`]: `Ok { method }` or `Fail { reason, retry_after_ms }`.
//! - [`GatewayServer`]: axum router serving `/ws`, `/health` and `/v1/status`.

/// Verdicts, policy and the strategy trait.
pub mod auth;
/// Default authorization strategy.
pub mod authorizer;
/// Live connection tracking.
pub mod connection;
/// Device-token store.
pub mod device;
/// Handshake orchestration.
pub mod handshake;
/// HTTP auth middleware.
pub mod middleware;
/// Router and WebSocket acceptor.
pub mod server;

pub use auth::{
    AuthVerdict, AuthorizationStrategy, ConnectRequestContext, ResolvedAuthPolicy,
    SharedConnectAuth,
};
pub use authorizer::GatewayAuthorizer;
pub use device::{DeviceTokenStore, InMemoryDeviceTokens};
pub use handshake::{ConnectAuthState, ConnectionAuthOrchestrator};
pub use server::{GatewayServer, GatewayState};
