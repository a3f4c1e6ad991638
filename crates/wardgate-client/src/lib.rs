//! Client side of the Wardgate gateway: credential resolution and the
//! outbound WebSocket handshake.

/// Outbound WebSocket client.
pub mod client;
/// Environment lookup for gateway secrets.
pub mod env;
/// Credential precedence rules.
pub mod resolver;

pub use client::{
    resolve_gateway_url, ConnectOptions, DeviceIdentity, GatewayClient, GatewaySession, Hello,
};
pub use env::{EnvSource, ProcessEnv};
pub use resolver::{
    resolve_gateway_credentials, ExplicitCredentials, RemotePasswordPrecedence,
    ResolvedCredentials,
};
