use thiserror::Error;

/// Convenience alias for `Result<T, WardgateError>`.
pub type WardgateResult<T> = Result<T, WardgateError>;

/// Errors raised by the outer layers (config, server, client).
///
/// Authorization outcomes are never errors: they travel as verdict values.
#[derive(Error, Debug)]
pub enum WardgateError {
    /// Invalid or incomplete configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Failure while running the gateway server.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Failure in the outbound client (connect, protocol).
    #[error("Client error: {0}")]
    Client(String),

    /// The gateway refused the handshake.
    #[error("Connection rejected: {reason}")]
    Rejected {
        /// Failure reason reported by the gateway.
        reason: String,
        /// Milliseconds to wait before retrying, when throttled.
        retry_after_ms: Option<u64>,
    },

    /// A JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML decoding error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
