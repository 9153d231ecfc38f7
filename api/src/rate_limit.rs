use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use shared::DependencyError;

/// Actions guarded by an attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    Register,
    PasswordReset,
}

impl RateLimitAction {
    pub const ALL: [RateLimitAction; 3] = [
        RateLimitAction::Login,
        RateLimitAction::Register,
        RateLimitAction::PasswordReset,
    ];

    /// Prefix of the counter key, `"<prefix>.<caller ip>"`.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            RateLimitAction::Login => "login",
            RateLimitAction::Register => "register",
            RateLimitAction::PasswordReset => "password-reset",
        }
    }

    /// Fragment used in `RATE_LIMIT_<NAME>_*` environment variables.
    pub fn env_name(&self) -> &'static str {
        match self {
            RateLimitAction::Login => "LOGIN",
            RateLimitAction::Register => "REGISTER",
            RateLimitAction::PasswordReset => "PASSWORD_RESET",
        }
    }

    pub fn default_limit(&self) -> AttemptLimit {
        match self {
            RateLimitAction::Login => AttemptLimit::new(5, Duration::from_secs(300)),
            RateLimitAction::Register => AttemptLimit::new(10, Duration::from_secs(900)),
            RateLimitAction::PasswordReset => AttemptLimit::new(3, Duration::from_secs(3600)),
        }
    }

    pub fn rejection_message(&self, seconds: u64) -> String {
        let what = match self {
            RateLimitAction::Login => "login",
            RateLimitAction::Register => "registration",
            RateLimitAction::PasswordReset => "password reset",
        };
        format!("Too many {what} attempts. Please try again in {seconds} seconds.")
    }

    pub fn counter_key(&self, identifier: &str) -> String {
        format!("{}.{}", self.key_prefix(), identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptLimit {
    pub max_attempts: u32,
    pub window: Duration,
}

impl AttemptLimit {
    pub const fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

/// Limits per action; starts from the built-in table and can be overridden
/// from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limits: HashMap<RateLimitAction, AttemptLimit>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limits: RateLimitAction::ALL
                .iter()
                .map(|action| (*action, action.default_limit()))
                .collect(),
        }
    }
}

impl RateLimitPolicy {
    pub fn with_limit(mut self, action: RateLimitAction, limit: AttemptLimit) -> Self {
        self.limits.insert(action, limit);
        self
    }

    pub fn limit_for(&self, action: RateLimitAction) -> AttemptLimit {
        self.limits
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.default_limit())
    }
}

/// Result of an atomic check-and-hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Admitted { attempts: u32, remaining: u32 },
    Limited { retry_after: u64 },
}

/// Attempt counters shared by every request. A deployment with several
/// instances needs an implementation backed by a shared key-value store.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increment the counter for `key`, opening a `ttl` window on first use.
    async fn hit(&self, key: &str, ttl: Duration) -> Result<u32, DependencyError>;

    async fn too_many_attempts(&self, key: &str, max_attempts: u32) -> Result<bool, DependencyError>;

    /// Seconds until the window for `key` closes, 0 when there is none.
    async fn available_in(&self, key: &str) -> Result<u64, DependencyError>;

    /// Check the threshold and count the attempt as one step.
    ///
    /// The default composes the three calls above and is only as atomic as
    /// the store behind them; implementations should override it.
    async fn attempt(
        &self,
        key: &str,
        max_attempts: u32,
        ttl: Duration,
    ) -> Result<Attempt, DependencyError> {
        if self.too_many_attempts(key, max_attempts).await? {
            return Ok(Attempt::Limited {
                retry_after: self.available_in(key).await?.max(1),
            });
        }
        let attempts = self.hit(key, ttl).await?;
        Ok(Attempt::Admitted {
            attempts,
            remaining: max_attempts.saturating_sub(attempts),
        })
    }
}

struct BucketState {
    window_start: Instant,
    window: Duration,
    count: u32,
}

impl BucketState {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.duration_since(self.window_start))
    }
}

/// Process-local counters behind one mutex.
#[derive(Clone, Default)]
pub struct InMemoryRateLimitStore {
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BucketState>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop counters whose window has closed; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_expired(now));
        before - buckets.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    fn hit_locked(
        buckets: &mut HashMap<String, BucketState>,
        key: &str,
        ttl: Duration,
        now: Instant,
    ) -> u32 {
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| BucketState {
                window_start: now,
                window: ttl,
                count: 0,
            });

        if bucket.is_expired(now) {
            bucket.window_start = now;
            bucket.window = ttl;
            bucket.count = 0;
        }

        bucket.count += 1;
        bucket.count
    }

    fn count_locked(buckets: &HashMap<String, BucketState>, key: &str, now: Instant) -> u32 {
        buckets
            .get(key)
            .filter(|bucket| !bucket.is_expired(now))
            .map(|bucket| bucket.count)
            .unwrap_or(0)
    }

    fn available_in_locked(buckets: &HashMap<String, BucketState>, key: &str, now: Instant) -> u64 {
        buckets
            .get(key)
            .filter(|bucket| !bucket.is_expired(now))
            .map(|bucket| ceil_duration_to_seconds(bucket.remaining(now)))
            .unwrap_or(0)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, ttl: Duration) -> Result<u32, DependencyError> {
        let mut buckets = self.lock();
        Ok(Self::hit_locked(&mut buckets, key, ttl, Instant::now()))
    }

    async fn too_many_attempts(&self, key: &str, max_attempts: u32) -> Result<bool, DependencyError> {
        let buckets = self.lock();
        Ok(Self::count_locked(&buckets, key, Instant::now()) >= max_attempts)
    }

    async fn available_in(&self, key: &str) -> Result<u64, DependencyError> {
        let buckets = self.lock();
        Ok(Self::available_in_locked(&buckets, key, Instant::now()))
    }

    async fn attempt(
        &self,
        key: &str,
        max_attempts: u32,
        ttl: Duration,
    ) -> Result<Attempt, DependencyError> {
        let now = Instant::now();
        let mut buckets = self.lock();

        if Self::count_locked(&buckets, key, now) >= max_attempts {
            let retry_after = Self::available_in_locked(&buckets, key, now).max(1);
            return Ok(Attempt::Limited { retry_after });
        }

        let attempts = Self::hit_locked(&mut buckets, key, ttl, now);
        Ok(Attempt::Admitted {
            attempts,
            remaining: max_attempts.saturating_sub(attempts),
        })
    }
}

/// Periodically drop closed windows so idle callers do not pile up.
pub fn spawn_purge_task(store: InMemoryRateLimitStore, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = store.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "purged expired rate limit windows");
            }
        }
    });
}

fn ceil_duration_to_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
