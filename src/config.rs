//! Configuration Module
//!
//! Handles loading server, store and lock settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::lock::RetryPolicy;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of keys the in-memory store can hold
    pub max_entries: usize,
    /// Default TTL in seconds for cached values
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Expiry sweeper interval in seconds
    pub cleanup_interval: u64,
    /// Lifetime of a lock record in milliseconds
    pub lock_ttl_ms: u64,
    /// First backoff between lock attempts in milliseconds
    pub lock_base_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    pub lock_max_backoff_ms: u64,
    /// Attempts before giving up on a contended lock
    pub lock_max_attempts: u32,
    /// Total time a caller may wait for a contended lock in milliseconds
    pub lock_wait_deadline_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum store keys (default: 10000)
    /// - `DEFAULT_TTL` - Default cache TTL in seconds (default: 1800)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweeper frequency in seconds (default: 1)
    /// - `LOCK_TTL_MS` - Lock record lifetime (default: 10000)
    /// - `LOCK_BASE_BACKOFF_MS` - First retry backoff (default: 100)
    /// - `LOCK_MAX_BACKOFF_MS` - Backoff ceiling (default: 800)
    /// - `LOCK_MAX_ATTEMPTS` - Attempt bound (default: 50)
    /// - `LOCK_WAIT_DEADLINE_MS` - Overall wait deadline (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            lock_ttl_ms: env_or("LOCK_TTL_MS", defaults.lock_ttl_ms),
            lock_base_backoff_ms: env_or("LOCK_BASE_BACKOFF_MS", defaults.lock_base_backoff_ms),
            lock_max_backoff_ms: env_or("LOCK_MAX_BACKOFF_MS", defaults.lock_max_backoff_ms),
            lock_max_attempts: env_or("LOCK_MAX_ATTEMPTS", defaults.lock_max_attempts),
            lock_wait_deadline_ms: env_or("LOCK_WAIT_DEADLINE_MS", defaults.lock_wait_deadline_ms),
        }
    }

    /// Lock record lifetime.
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    /// Default TTL for cached values.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    /// Retry policy for contended cache locks.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.lock_max_attempts,
            base_backoff: Duration::from_millis(self.lock_base_backoff_ms),
            max_backoff: Duration::from_millis(self.lock_max_backoff_ms),
            deadline: Duration::from_millis(self.lock_wait_deadline_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: 1800,
            server_port: 3000,
            cleanup_interval: 1,
            lock_ttl_ms: 10_000,
            lock_base_backoff_ms: 100,
            lock_max_backoff_ms: 800,
            lock_max_attempts: 50,
            lock_wait_deadline_ms: 5_000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.default_ttl, 1800);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.lock_ttl(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "MAX_ENTRIES",
            "DEFAULT_TTL",
            "SERVER_PORT",
            "CLEANUP_INTERVAL",
            "LOCK_TTL_MS",
            "LOCK_MAX_ATTEMPTS",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.lock_ttl_ms, 10_000);
        assert_eq!(config.lock_max_attempts, 50);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = Config::default().retry_policy();
        assert_eq!(policy.max_attempts, 50);
        assert_eq!(policy.base_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_millis(800));
        assert_eq!(policy.deadline, Duration::from_secs(5));
    }

    #[test]
    fn test_env_or_ignores_garbage() {
        env::set_var("SEATGUARD_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("SEATGUARD_TEST_GARBAGE", 7u32), 7);
        env::remove_var("SEATGUARD_TEST_GARBAGE");
    }
}
