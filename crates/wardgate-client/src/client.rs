//! Outbound WebSocket client for the gateway.

use crate::env::EnvSource;
use crate::resolver::{
    resolve_gateway_credentials, ExplicitCredentials, RemotePasswordPrecedence,
    ResolvedCredentials,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wardgate_core::{
    normalize, AuthMethod, ClientFrame, DeviceInfo, GatewayMode, HandshakeCredentials,
    ServerFrame, WardgateConfig, WardgateError, WardgateResult,
};

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// A paired device identity presented alongside the shared credentials.
#[derive(Clone)]
pub struct DeviceIdentity {
    /// Id the device was paired under.
    pub id: String,
    /// Device token; the shared token is offered when absent.
    pub token: Option<String>,
}

/// Per-call options for [`GatewayClient::from_config`].
#[derive(Default)]
pub struct ConnectOptions {
    /// Destination that replaces the configured one. Disables configured
    /// and environment credentials.
    pub url: Option<String>,
    /// Caller-supplied credentials; beat config and environment.
    pub explicit: Option<ExplicitCredentials>,
    /// Remote-mode password order.
    pub password_precedence: RemotePasswordPrecedence,
    /// Paired device to present.
    pub device: Option<DeviceIdentity>,
}

/// Accepted handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Id the gateway assigned.
    pub connection_id: Uuid,
    /// How the gateway authorized the socket.
    pub auth_method: AuthMethod,
    /// Whether the token or password alone was valid.
    pub shared_auth_ok: bool,
}

/// Destination URL: the override, else `gateway.remote.url` in remote mode,
/// else the local server address.
pub fn resolve_gateway_url(config: &WardgateConfig, url_override: Option<&str>) -> String {
    if let Some(url) = normalize(url_override) {
        return url;
    }
    if config.gateway.mode == GatewayMode::Remote {
        if let Some(url) = normalize(config.gateway.remote.url.as_deref()) {
            return url;
        }
    }
    config.server.local_ws_url()
}

/// Connects to a gateway with resolved credentials.
pub struct GatewayClient {
    url: String,
    credentials: ResolvedCredentials,
    device: Option<DeviceIdentity>,
    reply_timeout: Duration,
}

impl GatewayClient {
    /// Client for an explicit URL and credential pair.
    pub fn new(url: impl Into<String>, credentials: ResolvedCredentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            device: None,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// Resolve destination and credentials from config, environment and
    /// `options`.
    pub fn from_config<E: EnvSource + ?Sized>(
        config: &WardgateConfig,
        env: &E,
        options: ConnectOptions,
    ) -> Self {
        let url = resolve_gateway_url(config, options.url.as_deref());
        let credentials = resolve_gateway_credentials(
            &config.gateway,
            env,
            options.explicit.as_ref(),
            options.url.as_deref(),
            options.password_precedence,
        );
        let mut client = Self::new(url, credentials);
        client.device = options.device;
        client
    }

    /// Present a paired device identity.
    pub fn with_device(mut self, device: DeviceIdentity) -> Self {
        self.device = Some(device);
        self
    }

    /// How long to wait for each gateway reply.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Destination URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Credentials that will be sent.
    pub fn credentials(&self) -> &ResolvedCredentials {
        &self.credentials
    }

    /// The `connect` frame this client sends first.
    pub fn connect_frame(&self) -> ClientFrame {
        ClientFrame::Connect {
            auth: HandshakeCredentials {
                token: self.credentials.token.clone(),
                device_token: self.device.as_ref().and_then(|d| d.token.clone()),
                password: self.credentials.password.clone(),
            },
            device: self.device.as_ref().map(|d| DeviceInfo {
                id: Some(d.id.clone()),
            }),
        }
    }

    /// Open the socket and complete the handshake.
    ///
    /// A refused handshake is returned as [`WardgateError::Rejected`].
    pub async fn connect(&self) -> WardgateResult<GatewaySession> {
        if self.credentials.is_empty() && self.device.is_none() {
            debug!(url = %self.url, "Connecting without credentials");
        }

        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| WardgateError::Client(format!("Gateway connect error: {e}")))?;
        let mut session = GatewaySession {
            ws,
            reply_timeout: self.reply_timeout,
            hello: None,
        };

        session.send(&self.connect_frame()).await?;
        match session.next_frame().await? {
            ServerFrame::Hello {
                connection_id,
                auth_method,
                shared_auth_ok,
            } => {
                info!(
                    url = %self.url,
                    connection_id = %connection_id,
                    method = %auth_method,
                    "Connected to gateway"
                );
                session.hello = Some(Hello {
                    connection_id,
                    auth_method,
                    shared_auth_ok,
                });
                Ok(session)
            }
            ServerFrame::Error {
                reason,
                retry_after_ms,
            } => {
                warn!(url = %self.url, reason = %reason, "Gateway refused handshake");
                Err(WardgateError::Rejected {
                    reason: reason.to_string(),
                    retry_after_ms,
                })
            }
            ServerFrame::Pong => Err(WardgateError::Client(
                "Unexpected pong before hello".to_string(),
            )),
        }
    }
}

/// An authenticated socket.
pub struct GatewaySession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    reply_timeout: Duration,
    hello: Option<Hello>,
}

impl GatewaySession {
    /// The server's `hello`.
    pub fn hello(&self) -> Option<&Hello> {
        self.hello.as_ref()
    }

    /// Round-trip a `ping`.
    pub async fn ping(&mut self) -> WardgateResult<()> {
        self.send(&ClientFrame::Ping).await?;
        match self.next_frame().await? {
            ServerFrame::Pong => Ok(()),
            other => Err(WardgateError::Client(format!(
                "Expected pong, got {other:?}"
            ))),
        }
    }

    /// Send a close frame.
    pub async fn close(mut self) -> WardgateResult<()> {
        self.ws
            .close(None)
            .await
            .map_err(|e| WardgateError::Client(format!("Gateway close error: {e}")))
    }

    async fn send(&mut self, frame: &ClientFrame) -> WardgateResult<()> {
        let json = serde_json::to_string(frame)?;
        self.ws
            .send(Message::Text(json))
            .await
            .map_err(|e| WardgateError::Client(format!("Gateway send error: {e}")))
    }

    async fn next_frame(&mut self) -> WardgateResult<ServerFrame> {
        let reply_timeout = self.reply_timeout;
        tokio::time::timeout(reply_timeout, self.read_frame())
            .await
            .map_err(|_| {
                WardgateError::Client(format!(
                    "No reply from gateway within {}ms",
                    reply_timeout.as_millis()
                ))
            })?
    }

    async fn read_frame(&mut self) -> WardgateResult<ServerFrame> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(serde_json::from_str(&text)?),
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_default();
                    return Err(WardgateError::Client(format!(
                        "Gateway closed the connection: {reason}"
                    )));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(WardgateError::Client(format!("Gateway read error: {e}")));
                }
            }
        }
        Err(WardgateError::Client(
            "Gateway closed the connection".to_string(),
        ))
    }
}
