use crate::auth::{AuthVerdict, AuthorizationStrategy, ConnectRequestContext, ResolvedAuthPolicy};
use crate::authorizer::GatewayAuthorizer;
use crate::connection::{Connection, ConnectionManager};
use crate::device::{DeviceTokenStore, InMemoryDeviceTokens};
use crate::handshake::ConnectionAuthOrchestrator;
use crate::middleware::{http_auth_middleware, OVERLAY_USER_HEADER};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    middleware as axum_mw,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wardgate_core::{
    normalize, ClientFrame, DeviceInfo, HandshakeCredentials, ServerFrame, WardgateConfig,
    WardgateError, WardgateResult,
};
use wardgate_security::{AuditEntry, AuditLog, AuditOutcome, InMemoryRateLimiter, RateLimiter};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state.
pub struct GatewayState {
    /// Auth policy applied to every handshake.
    pub policy: ResolvedAuthPolicy,
    /// Runs the handshake decision.
    pub orchestrator: ConnectionAuthOrchestrator,
    /// Shared-secret limiter; `None` disables throttling.
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    /// Background pruning of a config-built limiter. Ends with the limiter.
    pub limiter_pruner: Option<JoinHandle<()>>,
    /// Authenticated WebSocket connections.
    pub connections: Arc<ConnectionManager>,
    /// Decision trail; `None` when auditing is off.
    pub audit: Option<Arc<AuditLog>>,
    /// How long a socket may wait before sending its connect frame.
    pub handshake_timeout: Duration,
}

impl GatewayState {
    /// State with no limiter, no audit log and the default timeout.
    pub fn new(policy: ResolvedAuthPolicy, strategy: Arc<dyn AuthorizationStrategy>) -> Self {
        Self {
            policy,
            orchestrator: ConnectionAuthOrchestrator::new(strategy),
            rate_limiter: None,
            limiter_pruner: None,
            connections: ConnectionManager::new(),
            audit: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Throttle shared-secret guesses with `limiter`.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Record every handshake decision in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Override the connect-frame timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Wire up policy, limiter, device store and audit log from config.
    ///
    /// One limiter instance backs both the shared-secret and the device-token
    /// scopes; idle keys are pruned once per window. Must be called inside a
    /// Tokio runtime.
    pub fn from_config(config: &WardgateConfig) -> WardgateResult<Self> {
        let policy = ResolvedAuthPolicy::from_config(&config.gateway.auth)?;
        let limits = &config.gateway.rate_limit;
        let in_memory = Arc::new(InMemoryRateLimiter::from_config(limits));
        let pruner = in_memory.start_prune_loop(Duration::from_millis(limits.window_ms));
        let limiter: Arc<dyn RateLimiter> = in_memory;
        let devices: Arc<dyn DeviceTokenStore> =
            Arc::new(InMemoryDeviceTokens::from_config(&config.gateway.devices));
        let strategy = GatewayAuthorizer::new(devices).with_device_gate(limiter.clone());

        let mut state = Self::new(policy, Arc::new(strategy))
            .with_rate_limiter(limiter)
            .with_handshake_timeout(Duration::from_millis(config.server.handshake_timeout_ms));
        state.limiter_pruner = Some(pruner);
        if config.audit.enabled {
            state = state.with_audit(Arc::new(AuditLog::new(config.audit.dir.clone())));
        }
        Ok(state)
    }

    /// Audit one authorization decision.
    pub fn record_decision(
        &self,
        connection_id: Uuid,
        action: &str,
        ctx: &ConnectRequestContext,
        verdict: &AuthVerdict,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        let (method, reason, outcome) = match verdict {
            AuthVerdict::Ok { method } => {
                (Some(method.to_string()), None, AuditOutcome::Success)
            }
            AuthVerdict::Fail { reason, .. } => {
                (None, Some(reason.to_string()), AuditOutcome::Denied)
            }
        };
        audit.log(AuditEntry {
            timestamp: chrono::Utc::now(),
            connection_id,
            client_ip: ctx.client_ip.map(|ip| ip.to_string()),
            action: action.to_string(),
            method,
            reason,
            outcome,
        });
    }
}

/// The gateway HTTP/WebSocket server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router: `/health`, `/ws`, and the protected `/v1/status`.
    pub fn build(state: Arc<GatewayState>) -> Router {
        let protected = Router::new()
            .route("/v1/status", get(status_handler))
            .route_layer(axum_mw::from_fn_with_state(
                state.clone(),
                http_auth_middleware,
            ));

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .merge(protected)
            .with_state(state)
    }

    /// Serve on `listener` until the task is dropped. Peer addresses are
    /// made available to handlers for rate limiting.
    pub async fn serve(listener: TcpListener, state: Arc<GatewayState>) -> WardgateResult<()> {
        let app = Self::build(state);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| WardgateError::Gateway(format!("Server error: {e}")))
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "wardgate"}))
}

async fn status_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let by_method: serde_json::Map<String, serde_json::Value> = state
        .connections
        .count_by_method()
        .await
        .into_iter()
        .map(|(method, count)| (method.to_string(), count.into()))
        .collect();
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.connections.connection_count().await,
        "connections_by_method": by_method,
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    let overlay_user = normalize(
        headers
            .get(OVERLAY_USER_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer.ip(), overlay_user))
}

/// Wait for the first frame, which must be `connect`.
async fn read_connect_frame(
    socket: &mut WebSocket,
) -> Option<(HandshakeCredentials, Option<DeviceInfo>)> {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                return match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(ClientFrame::Connect { auth, device }) => Some((auth, device)),
                    Ok(other) => {
                        debug!(frame = ?other, "Expected connect frame");
                        None
                    }
                    Err(e) => {
                        debug!(error = %e, "Malformed connect frame");
                        None
                    }
                };
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!(error = %e, "Failed to encode frame");
            false
        }
    }
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<GatewayState>,
    client_ip: IpAddr,
    overlay_user: Option<String>,
) {
    let connection_id = Uuid::new_v4();

    let (credentials, device) =
        match tokio::time::timeout(state.handshake_timeout, read_connect_frame(&mut socket)).await
        {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                close_with(&mut socket, close_code::PROTOCOL, "connect frame required").await;
                return;
            }
            Err(_) => {
                warn!(client_ip = %client_ip, "Handshake timed out");
                close_with(&mut socket, close_code::POLICY, "handshake timeout").await;
                return;
            }
        };

    let ctx = ConnectRequestContext {
        client_ip: Some(client_ip),
        overlay_user,
        device_id: device.and_then(|d| normalize(d.id.as_deref())),
    };
    let has_device_identity = ctx.device_id.is_some();

    let auth = state
        .orchestrator
        .resolve_connect_auth_state(
            &state.policy,
            &credentials,
            has_device_identity,
            &ctx,
            state.rate_limiter.as_deref(),
        )
        .await;
    state.record_decision(connection_id, "ws_connect", &ctx, &auth.auth_result());

    if let AuthVerdict::Fail {
        reason,
        retry_after_ms,
    } = auth.auth_result()
    {
        warn!(
            connection_id = %connection_id,
            client_ip = %client_ip,
            reason = %reason,
            "Handshake rejected"
        );
        send_frame(
            &mut socket,
            &ServerFrame::Error {
                reason,
                retry_after_ms,
            },
        )
        .await;
        close_with(&mut socket, close_code::POLICY, reason.as_str()).await;
        return;
    }

    let hello = ServerFrame::Hello {
        connection_id,
        auth_method: auth.auth_method(),
        shared_auth_ok: auth.shared_auth_ok(),
    };
    if !send_frame(&mut socket, &hello).await {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state
        .connections
        .add(Connection {
            id: connection_id,
            client_ip: Some(client_ip),
            auth_method: auth.auth_method(),
            tx,
        })
        .await;
    info!(
        connection_id = %connection_id,
        client_ip = %client_ip,
        method = %auth.auth_method(),
        shared_auth_ok = auth.shared_auth_ok(),
        "WebSocket connected"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task: forward queued messages to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Task: answer client frames
    let connections = state.connections.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(ClientFrame::Ping) => {
                        if let Ok(pong) = serde_json::to_string(&ServerFrame::Pong) {
                            connections.send_to(connection_id, &pong).await;
                        }
                    }
                    Ok(ClientFrame::Connect { .. }) => {
                        debug!(connection_id = %connection_id, "Ignoring repeated connect frame");
                    }
                    Err(e) => {
                        debug!(connection_id = %connection_id, error = %e, "Unrecognized frame");
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.connections.remove(connection_id).await;
    info!(connection_id = %connection_id, "WebSocket disconnected");
}
