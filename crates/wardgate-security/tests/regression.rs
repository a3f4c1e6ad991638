#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Regression tests for wardgate-security: AuditLog, RateLimiter behind a
//! trait object, secret comparison.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wardgate_core::RateLimitConfig;
use wardgate_security::{
    safe_equal, AuditEntry, AuditLog, AuditOutcome, InMemoryRateLimiter, RateLimitScope,
    RateLimiter,
};

fn entry(outcome: AuditOutcome, method: Option<&str>, reason: Option<&str>) -> AuditEntry {
    AuditEntry {
        timestamp: chrono::Utc::now(),
        connection_id: Uuid::new_v4(),
        client_ip: Some("203.0.113.5".to_string()),
        action: "ws_connect".to_string(),
        method: method.map(ToString::to_string),
        reason: reason.map(ToString::to_string),
        outcome,
    }
}

// --- AuditLog ---

#[tokio::test]
async fn test_audit_log_writes_entries_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("audit");
    let audit = AuditLog::new(log_dir.clone());

    audit.log(entry(AuditOutcome::Success, Some("token"), None));
    audit.log(entry(AuditOutcome::Denied, None, Some("rate_limited")));
    audit.log(entry(AuditOutcome::Denied, None, Some("invalid_credentials")));

    tokio::time::sleep(Duration::from_millis(200)).await;

    let contents = tokio::fs::read_to_string(log_dir.join("audit.jsonl"))
        .await
        .unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["outcome"], "success");
    assert_eq!(lines[0]["method"], "token");
    assert_eq!(lines[1]["reason"], "rate_limited");
    assert_eq!(lines[2]["reason"], "invalid_credentials");
    assert_eq!(lines[2]["client_ip"], "203.0.113.5");
}

#[test]
fn test_audit_entry_serialization() {
    let json = serde_json::to_string(&entry(AuditOutcome::Denied, None, Some("missing_auth")))
        .unwrap();
    assert!(json.contains("\"outcome\":\"denied\""));
    assert!(json.contains("\"action\":\"ws_connect\""));
    assert!(json.contains("\"method\":null"));
}

// --- RateLimiter ---

#[tokio::test]
async fn test_limiter_as_trait_object() {
    let config = RateLimitConfig {
        max_attempts: 2,
        window_ms: 60_000,
        lockout_ms: 60_000,
        exempt_loopback: true,
    };
    let limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::from_config(&config));
    let client: Option<IpAddr> = Some("198.51.100.20".parse().unwrap());
    let scope = RateLimitScope::SHARED_SECRET;

    limiter.record_failure(client, &scope).await;
    limiter.record_failure(client, &scope).await;
    let check = limiter.check(client, &scope).await;
    assert!(!check.allowed);
    assert!(check.retry_after_ms.unwrap() > 59_000);

    limiter.reset(client, &scope).await;
    assert!(limiter.check(client, &scope).await.allowed);
}

#[tokio::test]
async fn test_limiter_distinct_keys_do_not_block_each_other() {
    let limiter = Arc::new(InMemoryRateLimiter::new(
        1_000,
        Duration::from_secs(60),
        Duration::from_secs(60),
    ));
    let scope = RateLimitScope::SHARED_SECRET;

    let mut handles = Vec::new();
    for i in 0..64u8 {
        let limiter = limiter.clone();
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            let client: Option<IpAddr> = Some(IpAddr::from([10, 0, 0, i]));
            for _ in 0..5 {
                limiter.record_failure(client, &scope).await;
            }
            limiter.check(client, &scope).await.remaining
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 995);
    }
    assert_eq!(limiter.len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_limiter_concurrent_attempts_respect_budget() {
    let limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::new(
        3,
        Duration::from_secs(60),
        Duration::from_secs(60),
    ));
    let barrier = Arc::new(tokio::sync::Barrier::new(64));
    let client: Option<IpAddr> = Some("198.51.100.30".parse().unwrap());

    let mut handles = Vec::new();
    for _ in 0..64 {
        let limiter = limiter.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            limiter
                .try_attempt(client, &RateLimitScope::SHARED_SECRET)
                .await
        }));
    }

    let mut allowed = 0;
    let mut refused = 0;
    for handle in handles {
        let attempt = handle.await.unwrap();
        if attempt.allowed {
            allowed += 1;
        } else {
            assert!(attempt.retry_after_ms.unwrap() > 0);
            refused += 1;
        }
    }
    assert_eq!(allowed, 3);
    assert_eq!(refused, 61);

    let check = limiter.check(client, &RateLimitScope::SHARED_SECRET).await;
    assert!(!check.allowed);
}

#[test]
fn test_scope_names() {
    assert_eq!(RateLimitScope::SHARED_SECRET.as_str(), "shared-secret");
    assert_eq!(RateLimitScope::DEVICE_TOKEN.to_string(), "device-token");
    assert_eq!(RateLimitScope::new("default"), RateLimitScope::DEFAULT);
}

// --- Secrets ---

#[test]
fn test_safe_equal_rejects_prefix() {
    assert!(!safe_equal("tok", "token"));
    assert!(safe_equal("token", "token"));
}
