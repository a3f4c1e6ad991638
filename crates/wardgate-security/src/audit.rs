use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// One recorded authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Id of the socket or request.
    pub connection_id: Uuid,
    /// Peer address, if known.
    pub client_ip: Option<String>,
    /// Which surface was hit, e.g. `ws_connect` or `http_connect`.
    pub action: String,
    /// Auth method on success (`token`, `password`, `device`, `bypass`).
    pub method: Option<String>,
    /// Failure reason on denial.
    pub reason: Option<String>,
    /// Accepted or refused.
    pub outcome: AuditOutcome,
}

/// Final decision of an audited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Accepted.
    Success,
    /// Refused.
    Denied,
}

/// Append-only audit log of authorization decisions.
pub struct AuditLog {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditLog {
    /// Create a new AuditLog. Spawns a background task that appends entries
    /// to `audit.jsonl` under `log_dir`.
    pub fn new(log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();

        tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
                warn!(error = %e, dir = %log_dir.display(), "Failed to create audit dir");
            }
            let log_file = log_dir.join("audit.jsonl");

            while let Some(entry) = rx.recv().await {
                let Ok(line) = serde_json::to_string(&entry) else {
                    continue;
                };
                let opened = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&log_file)
                    .await;
                match opened {
                    Ok(mut file) => {
                        if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                            warn!(error = %e, "Failed to append audit entry");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to open audit log"),
                }
            }
        });

        Self { tx }
    }

    /// Mirror `entry` to tracing and queue it for disk.
    pub fn log(&self, entry: AuditEntry) {
        info!(
            connection_id = %entry.connection_id,
            client_ip = entry.client_ip.as_deref().unwrap_or("unknown"),
            action = %entry.action,
            method = entry.method.as_deref(),
            reason = entry.reason.as_deref(),
            outcome = ?entry.outcome,
            "audit"
        );
        let _ = self.tx.send(entry);
    }
}
