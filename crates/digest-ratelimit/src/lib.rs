//! Token bucket limiting for authentication attempts.
//!
//! Digest authentication lets a client test one password guess per request,
//! so a server that exposes it needs a per-client brake. This crate keeps one
//! bucket per key (usually the peer IP), refilled continuously at
//! `max_attempts / window` tokens per second, capped at `burst`.
//!
//! # Example
//!
//! ```
//! use digest_ratelimit::{RateLimitConfig, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(
//!     RateLimitConfig::new(10, Duration::from_secs(60)).with_burst(2),
//! );
//! assert!(limiter.check("203.0.113.7"));
//! assert!(limiter.check("203.0.113.7"));
//! assert!(!limiter.check("203.0.113.7"));
//! ```

use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Attempts granted per `window`.
    pub max_attempts: u32,
    pub window: Duration,
    /// Tokens a fresh or idle bucket may hold.
    pub burst: u32,
    /// Buckets untouched for this long are dropped by [`RateLimiter::cleanup_idle`].
    pub idle_timeout: Duration,
    pub enabled: bool,
}

impl RateLimitConfig {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            burst: max_attempts,
            idle_timeout: Duration::from_secs(300),
            enabled: true,
        }
    }

    /// Allows everything.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO).with_enabled(false)
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 10 attempts per 5 minutes with a burst of 3.
    pub fn auth_preset() -> Self {
        Self::new(10, Duration::from_secs(300))
            .with_burst(3)
            .with_idle_timeout(Duration::from_secs(600))
    }

    /// For requests that only ask for a challenge: 120 per minute, burst 30.
    pub fn challenge_preset() -> Self {
        Self::new(120, Duration::from_secs(60)).with_burst(30)
    }

    fn tokens_per_sec(&self) -> f64 {
        if self.window.is_zero() {
            0.0
        } else {
            f64::from(self.max_attempts) / self.window.as_secs_f64()
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::auth_preset()
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    updated: Instant,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig) -> Self {
        Self {
            tokens: f64::from(config.burst),
            updated: Instant::now(),
        }
    }

    fn try_take(&mut self, config: &RateLimitConfig) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.tokens_per_sec()).min(f64::from(config.burst));
        self.updated = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Concurrent per-key limiter. Cloning shares the underlying buckets.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    buckets: Arc<DashMap<String, Mutex<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Consumes one token for `key`. Returns `false` when the key is out of tokens.
    pub fn check(&self, key: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| Mutex::new(TokenBucket::full(&self.config)));
        let allowed = bucket.lock().try_take(&self.config);

        if !allowed {
            debug!(key, "authentication rate limit exceeded");
        }
        allowed
    }

    pub fn check_ip(&self, ip: IpAddr) -> bool {
        self.check(&ip.to_string())
    }

    /// Drops buckets idle past the configured timeout; returns how many went.
    pub fn cleanup_idle(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.lock().updated.elapsed() <= timeout);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "cleaned up idle rate limit buckets");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.buckets.len()
    }

    /// Whole tokens left for `key`, `None` if the key has no bucket yet.
    pub fn remaining(&self, key: &str) -> Option<u32> {
        self.buckets
            .get(key)
            .map(|bucket| bucket.lock().tokens as u32)
    }

    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
