use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use wardgate_core::AuthMethod;

/// An authenticated WebSocket client.
#[derive(Debug)]
pub struct Connection {
    /// Id sent in `hello`.
    pub id: Uuid,
    /// Peer address.
    pub client_ip: Option<IpAddr>,
    /// How the socket was authorized.
    pub auth_method: AuthMethod,
    /// Outbound text frames.
    pub tx: mpsc::UnboundedSender<String>,
}

/// Tracks sockets that passed the handshake.
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl ConnectionManager {
    /// Empty, shareable manager.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Track an accepted socket.
    pub async fn add(&self, conn: Connection) {
        let id = conn.id;
        let method = conn.auth_method;
        self.connections.write().await.insert(id, conn);
        tracing::info!(connection_id = %id, method = %method, "Connection added");
    }

    /// Stop tracking a closed socket.
    pub async fn remove(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
        tracing::info!(connection_id = %id, "Connection removed");
    }

    /// Queue a message for one connection. Returns false if it is gone.
    pub async fn send_to(&self, id: Uuid, message: &str) -> bool {
        let conns = self.connections.read().await;
        conns
            .get(&id)
            .is_some_and(|conn| conn.tx.send(message.to_string()).is_ok())
    }

    /// Live connection count.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Count of live connections per auth method.
    pub async fn count_by_method(&self) -> HashMap<AuthMethod, usize> {
        let conns = self.connections.read().await;
        let mut counts = HashMap::new();
        for conn in conns.values() {
            *counts.entry(conn.auth_method).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }
}
