//! Login attempt rate limiting
//!
//! State lives in this process only. A horizontally scaled control plane
//! needs a shared counter with TTL instead.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::errors::ControlError;

#[derive(Debug, Clone, Copy)]
struct Attempts {
    count: u32,
    reset_at: Instant,
}

/// Fixed-budget attempts per IP within a trailing window.
///
/// Expired entries are evicted when their key is next looked up; there is no
/// background sweep.
pub struct LoginRateLimiter {
    max_attempts: u32,
    window: Duration,
    entries: Mutex<HashMap<IpAddr, Attempts>>,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt from `ip`, failing once the budget is spent
    pub fn check(&self, ip: IpAddr) -> Result<(), ControlError> {
        self.check_at(ip, Instant::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), ControlError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if entries.get(&ip).is_some_and(|a| now > a.reset_at) {
            entries.remove(&ip);
        }

        let entry = entries.entry(ip).or_insert(Attempts {
            count: 0,
            reset_at: now + self.window,
        });
        if entry.count >= self.max_attempts {
            let retry_in = entry.reset_at.saturating_duration_since(now);
            return Err(ControlError::TooManyRequests(format!(
                "Too many login attempts, retry in {}s",
                retry_in.as_secs().max(1)
            )));
        }
        entry.count += 1;
        Ok(())
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_then_reject() {
        let limiter = LoginRateLimiter::new(2, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let now = Instant::now();

        assert!(limiter.check_at(ip, now).is_ok());
        assert!(limiter.check_at(ip, now).is_ok());
        assert!(matches!(
            limiter.check_at(ip, now),
            Err(ControlError::TooManyRequests(_))
        ));

        // Other clients are unaffected
        assert!(limiter.check_at("10.0.0.2".parse().unwrap(), now).is_ok());
    }

    #[test]
    fn test_expired_entry_evicted_on_lookup() {
        let limiter = LoginRateLimiter::new(1, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let start = Instant::now();

        assert!(limiter.check_at(ip, start).is_ok());
        assert!(limiter.check_at(ip, start).is_err());

        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at(ip, later).is_ok());
        assert_eq!(limiter.len(), 1);
    }
}
