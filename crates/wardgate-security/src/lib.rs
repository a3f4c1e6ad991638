//! Security primitives for the Wardgate gateway.
//!
//! # Main types
//!
//! - [`RateLimiter`]: Failed-attempt limiter keyed by client IP and scope.
//! - [`InMemoryRateLimiter`]: Sharded in-process implementation with lockout.
//! - [`RateLimitScope`]: Named partition of limiter counters.
//! - [`AuditLog`]: Append-only trail of authorization decisions.

/// Authorization audit logging.
pub mod audit;
/// Failed-attempt rate limiting.
pub mod rate_limit;
/// Constant-time secret comparison.
pub mod secret;

pub use audit::{AuditEntry, AuditLog, AuditOutcome};
pub use rate_limit::{InMemoryRateLimiter, RateLimitCheck, RateLimitScope, RateLimiter};
pub use secret::{fingerprint, safe_equal};
