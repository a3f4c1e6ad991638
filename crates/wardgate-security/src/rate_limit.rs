use async_trait::async_trait;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::{BuildHasher, RandomState};
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wardgate_core::RateLimitConfig;

const SHARD_COUNT: usize = 16;
const UNKNOWN_CLIENT: &str = "unknown";

/// A named partition of the limiter's counters.
///
/// Two scopes never share a budget, even for the same client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitScope(Cow<'static, str>);

impl RateLimitScope {
    /// Catch-all scope.
    pub const DEFAULT: Self = Self(Cow::Borrowed("default"));
    /// Token and password guesses.
    pub const SHARED_SECRET: Self = Self(Cow::Borrowed("shared-secret"));
    /// Device-token guesses.
    pub const DEVICE_TOKEN: Self = Self(Cow::Borrowed("device-token"));

    /// A custom scope, e.g. for a hook endpoint.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Scope name as it appears in logs.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`RateLimiter::check`] and [`RateLimiter::try_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCheck {
    /// Whether the attempt may proceed.
    pub allowed: bool,
    /// Failures still tolerated before the key locks.
    pub remaining: u32,
    /// Set while the key is locked out.
    pub retry_after_ms: Option<u64>,
}

impl RateLimitCheck {
    fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_ms: None,
        }
    }

    fn locked(until: Instant, now: Instant) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_ms: Some(ceil_millis(until.duration_since(now))),
        }
    }
}

/// Failed-attempt limiter keyed by `(client ip, scope)`.
///
/// Implementations must make `try_attempt` and `record_failure` atomic per
/// key and must not serialize callers that use different keys.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Whether another attempt from this client is allowed. Does not count.
    async fn check(&self, ip: Option<IpAddr>, scope: &RateLimitScope) -> RateLimitCheck;

    /// Check the key and, if allowed, count the attempt in the same step.
    ///
    /// The attempt stays counted as a failure unless the caller `reset`s the
    /// key after a success, so concurrent callers can never evaluate more
    /// than `max_attempts` guesses per window.
    async fn try_attempt(&self, ip: Option<IpAddr>, scope: &RateLimitScope) -> RateLimitCheck;

    /// Count a failed attempt, locking the key once the limit is reached.
    async fn record_failure(&self, ip: Option<IpAddr>, scope: &RateLimitScope);

    /// Forget all failures for this key.
    async fn reset(&self, ip: Option<IpAddr>, scope: &RateLimitScope);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    scope: RateLimitScope,
    client: String,
}

#[derive(Default)]
struct Entry {
    attempts: VecDeque<Instant>,
    locked_until: Option<Instant>,
}

impl Entry {
    /// Drop attempts that left the window and an expired lock.
    fn slide(&mut self, now: Instant, window: Duration) {
        while let Some(first) = self.attempts.front() {
            if now.duration_since(*first) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
        if self.locked_until.is_some_and(|until| until <= now) {
            self.locked_until = None;
            self.attempts.clear();
        }
    }

    fn is_idle(&self) -> bool {
        self.attempts.is_empty() && self.locked_until.is_none()
    }
}

/// In-process sliding-window limiter with lockout.
///
/// Keys are spread over a fixed set of shards, each behind its own mutex.
/// Expired attempts are dropped lazily when a key is touched; call
/// [`InMemoryRateLimiter::prune`] periodically to release idle keys.
pub struct InMemoryRateLimiter {
    max_attempts: u32,
    window: Duration,
    lockout: Duration,
    exempt_loopback: bool,
    hasher: RandomState,
    shards: Box<[Mutex<HashMap<BucketKey, Entry>>]>,
}

impl InMemoryRateLimiter {
    /// Create a limiter.
    /// - `max_attempts`: failures tolerated within `window` before locking
    /// - `lockout`: how long a locked key stays locked
    pub fn new(max_attempts: u32, window: Duration, lockout: Duration) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            max_attempts: max_attempts.max(1),
            window,
            lockout,
            exempt_loopback: true,
            hasher: RandomState::new(),
            shards,
        }
    }

    /// Create a limiter from `[gateway.rate_limit]`.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.window_ms),
            Duration::from_millis(config.lockout_ms),
        )
        .with_loopback_exempt(config.exempt_loopback)
    }

    /// Toggle the loopback exemption (on by default).
    pub fn with_loopback_exempt(mut self, exempt: bool) -> Self {
        self.exempt_loopback = exempt;
        self
    }

    /// Remove keys with no attempts in the window and no active lock.
    pub fn prune(&self) {
        let now = Instant::now();
        for shard in self.shards.iter() {
            let mut entries = shard.lock();
            entries.retain(|_, entry| {
                entry.slide(now, self.window);
                !entry.is_idle()
            });
        }
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prune every `interval` in the background.
    ///
    /// The task holds only a weak reference and exits once the limiter is
    /// dropped. Must be called inside a Tokio runtime.
    pub fn start_prune_loop(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let interval = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick completes immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let before = limiter.len();
                limiter.prune();
                let pruned = before.saturating_sub(limiter.len());
                if pruned > 0 {
                    debug!(pruned, "Pruned idle rate limit keys");
                }
            }
        })
    }

    fn is_exempt(&self, ip: Option<IpAddr>) -> bool {
        self.exempt_loopback && ip.is_some_and(|ip| ip.to_canonical().is_loopback())
    }

    fn key(ip: Option<IpAddr>, scope: &RateLimitScope) -> BucketKey {
        BucketKey {
            scope: scope.clone(),
            client: ip.map_or_else(
                || UNKNOWN_CLIENT.to_string(),
                |ip| ip.to_canonical().to_string(),
            ),
        }
    }

    fn shard(&self, key: &BucketKey) -> &Mutex<HashMap<BucketKey, Entry>> {
        let index = (self.hasher.hash_one(key) as usize) % self.shards.len();
        &self.shards[index]
    }

    fn check_now(
        &self,
        ip: Option<IpAddr>,
        scope: &RateLimitScope,
        now: Instant,
    ) -> RateLimitCheck {
        if self.is_exempt(ip) {
            return RateLimitCheck::allowed(self.max_attempts);
        }
        let key = Self::key(ip, scope);
        let mut entries = self.shard(&key).lock();
        let Some(entry) = entries.get_mut(&key) else {
            return RateLimitCheck::allowed(self.max_attempts);
        };
        entry.slide(now, self.window);

        match entry.locked_until {
            Some(until) => RateLimitCheck::locked(until, now),
            None => {
                let used = u32::try_from(entry.attempts.len()).unwrap_or(u32::MAX);
                RateLimitCheck::allowed(self.max_attempts.saturating_sub(used))
            }
        }
    }

    /// Count one attempt under the shard lock unless the key is locked.
    fn try_attempt_now(
        &self,
        ip: Option<IpAddr>,
        scope: &RateLimitScope,
        now: Instant,
    ) -> RateLimitCheck {
        if self.is_exempt(ip) {
            return RateLimitCheck::allowed(self.max_attempts);
        }
        let key = Self::key(ip, scope);
        let mut entries = self.shard(&key).lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.slide(now, self.window);

        // A locked key stays locked until the original lockout expires.
        if let Some(until) = entry.locked_until {
            return RateLimitCheck::locked(until, now);
        }

        entry.attempts.push_back(now);
        let used = u32::try_from(entry.attempts.len()).unwrap_or(u32::MAX);
        if used >= self.max_attempts {
            entry.locked_until = Some(now + self.lockout);
            warn!(
                client_ip = %key.client,
                scope = %key.scope,
                lockout_ms = self.lockout.as_millis() as u64,
                "Client locked out after repeated auth failures"
            );
        }
        RateLimitCheck::allowed(self.max_attempts.saturating_sub(used))
    }

    fn record_failure_now(&self, ip: Option<IpAddr>, scope: &RateLimitScope, now: Instant) {
        self.try_attempt_now(ip, scope, now);
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, ip: Option<IpAddr>, scope: &RateLimitScope) -> RateLimitCheck {
        self.check_now(ip, scope, Instant::now())
    }

    async fn try_attempt(&self, ip: Option<IpAddr>, scope: &RateLimitScope) -> RateLimitCheck {
        self.try_attempt_now(ip, scope, Instant::now())
    }

    async fn record_failure(&self, ip: Option<IpAddr>, scope: &RateLimitScope) {
        self.record_failure_now(ip, scope, Instant::now());
    }

    async fn reset(&self, ip: Option<IpAddr>, scope: &RateLimitScope) {
        let key = Self::key(ip, scope);
        self.shard(&key).lock().remove(&key);
    }
}

fn ceil_millis(d: Duration) -> u64 {
    let millis = d.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}
