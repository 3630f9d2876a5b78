//! Rate limiter for login attempts
//!
//! Provides protection against credential stuffing by:
//! - Limiting failed login attempts per email (5 attempts per 15 minutes)
//! - Limiting login requests per IP address (10 requests per minute)
//!
//! When a key is limited the caller gets the number of seconds until the
//! oldest attempt leaves the window, which the API reports as `retry_after`.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Failed logins allowed per email inside [`EMAIL_WINDOW_MINUTES`]
pub const EMAIL_ATTEMPT_LIMIT: usize = 5;
pub const EMAIL_WINDOW_MINUTES: i64 = 15;

/// Login requests allowed per IP inside [`IP_WINDOW_MINUTES`]
pub const IP_REQUEST_LIMIT: usize = 10;
pub const IP_WINDOW_MINUTES: i64 = 1;

/// Sliding-window log of attempt timestamps per key
struct AttemptLog<K> {
    limit: usize,
    window: Duration,
    attempts: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> AttemptLog<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            attempts: RwLock::new(HashMap::new()),
        }
    }

    /// `Some(seconds)` until the key may try again, `None` when allowed
    async fn retry_after(&self, key: K, now: DateTime<Utc>) -> Option<i64> {
        let cutoff = now - self.window;
        let mut attempts = self.attempts.write().await;
        let log = attempts.entry(key).or_default();
        log.retain(|time| *time > cutoff);

        if log.len() < self.limit {
            return None;
        }
        let oldest = log.iter().min().copied().unwrap_or(now);
        Some(((oldest + self.window) - now).num_seconds().max(1))
    }

    async fn record(&self, key: K, now: DateTime<Utc>) {
        self.attempts.write().await.entry(key).or_default().push(now);
    }

    async fn clear(&self, key: &K) {
        self.attempts.write().await.remove(key);
    }

    async fn cleanup(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.attempts.write().await.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    emails: AttemptLog<String>,
    ips: AttemptLog<IpAddr>,
}

impl LoginRateLimiter {
    /// Create a limiter with the default windows
    pub fn new() -> Self {
        Self {
            emails: AttemptLog::new(EMAIL_ATTEMPT_LIMIT, Duration::minutes(EMAIL_WINDOW_MINUTES)),
            ips: AttemptLog::new(IP_REQUEST_LIMIT, Duration::minutes(IP_WINDOW_MINUTES)),
        }
    }

    /// Seconds to wait before this email may try again, if it is limited
    pub async fn email_retry_after(&self, email: &str) -> Option<i64> {
        self.emails.retry_after(normalize(email), Utc::now()).await
    }

    /// Record a failed login for an email
    pub async fn record_failed_attempt(&self, email: &str) {
        self.emails.record(normalize(email), Utc::now()).await;
    }

    /// Forget failed attempts after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        self.emails.clear(&normalize(email)).await;
    }

    /// Seconds to wait before this IP may try again, if it is limited
    pub async fn ip_retry_after(&self, ip: IpAddr) -> Option<i64> {
        self.ips.retry_after(ip, Utc::now()).await
    }

    /// Record a login request from an IP
    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip, Utc::now()).await;
    }

    /// Drop entries whose attempts all left their window
    pub async fn cleanup(&self) {
        let now = Utc::now();
        self.emails.cleanup(now).await;
        self.ips.cleanup(now).await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
