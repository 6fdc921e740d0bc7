//! Environment-driven configuration.
//!
//! All knobs are `FDK_*` environment variables. Parsing goes through
//! [`Settings::from_lookup`] so tests exercise it with a plain map instead
//! of mutating the process environment. Binaries call
//! `dotenvy::from_filename(".env.local")` before [`Settings::from_env`];
//! production injects real environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use fdk_schemas::QuotaShares;

pub const ENV_DATABASE_URL: &str = "FDK_DATABASE_URL";
pub const ENV_DAEMON_ADDR: &str = "FDK_DAEMON_ADDR";
pub const ENV_RESPONSE_TIMEOUT_MINUTES: &str = "FDK_RESPONSE_TIMEOUT_MINUTES";
pub const ENV_WORKER_TICK_SECS: &str = "FDK_WORKER_TICK_SECS";
pub const ENV_QUOTA_SHARES: &str = "FDK_QUOTA_SHARES";
pub const ENV_FCM_SERVER_KEY: &str = "FDK_FCM_SERVER_KEY";
pub const ENV_FCM_ENDPOINT: &str = "FDK_FCM_ENDPOINT";

pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8088";
pub const DEFAULT_RESPONSE_TIMEOUT_MINUTES: i64 = 30;
pub const DEFAULT_WORKER_TICK_SECS: u64 = 60;
pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Absent is allowed here; binaries that need the database call
    /// [`Settings::require_database_url`].
    pub database_url: Option<String>,
    pub daemon_addr: SocketAddr,
    /// `T_resp`: how long an offered grade (or an open broadcast) may sit
    /// unanswered before the worker escalates.
    pub response_timeout_minutes: i64,
    pub worker_tick_secs: u64,
    pub quota_shares: QuotaShares,
    /// Unset means push notifications are disabled (no-op notifier).
    pub fcm_server_key: Option<String>,
    pub fcm_endpoint: String,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let daemon_addr: SocketAddr = get(ENV_DAEMON_ADDR)
            .unwrap_or_else(|| DEFAULT_DAEMON_ADDR.to_string())
            .parse()
            .with_context(|| format!("invalid {ENV_DAEMON_ADDR}"))?;

        let response_timeout_minutes: i64 = match get(ENV_RESPONSE_TIMEOUT_MINUTES) {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid {ENV_RESPONSE_TIMEOUT_MINUTES}: '{v}'"))?,
            None => DEFAULT_RESPONSE_TIMEOUT_MINUTES,
        };
        if response_timeout_minutes <= 0 {
            anyhow::bail!("{ENV_RESPONSE_TIMEOUT_MINUTES} must be positive");
        }

        let worker_tick_secs: u64 = match get(ENV_WORKER_TICK_SECS) {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid {ENV_WORKER_TICK_SECS}: '{v}'"))?,
            None => DEFAULT_WORKER_TICK_SECS,
        };
        if worker_tick_secs == 0 {
            anyhow::bail!("{ENV_WORKER_TICK_SECS} must be positive");
        }

        let quota_shares = match get(ENV_QUOTA_SHARES) {
            Some(v) => QuotaShares::parse(&v)
                .with_context(|| format!("invalid {ENV_QUOTA_SHARES}: '{v}'"))?,
            None => QuotaShares::default(),
        };

        Ok(Self {
            database_url: get(ENV_DATABASE_URL),
            daemon_addr,
            response_timeout_minutes,
            worker_tick_secs,
            quota_shares,
            fcm_server_key: get(ENV_FCM_SERVER_KEY),
            fcm_endpoint: get(ENV_FCM_ENDPOINT)
                .unwrap_or_else(|| DEFAULT_FCM_ENDPOINT.to_string()),
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .with_context(|| format!("missing env var {ENV_DATABASE_URL}"))
    }

    /// `T_resp` as a chrono duration for cutoff arithmetic.
    pub fn response_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.response_timeout_minutes)
    }

    /// Worker tick interval as a std duration for `tokio::time::interval`.
    pub fn worker_tick(&self) -> Duration {
        Duration::from_secs(self.worker_tick_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let map = HashMap::new();
        let s = Settings::from_lookup(lookup(&map)).unwrap();
        assert!(s.database_url.is_none());
        assert_eq!(s.daemon_addr.to_string(), DEFAULT_DAEMON_ADDR);
        assert_eq!(s.response_timeout_minutes, 30);
        assert_eq!(s.worker_tick_secs, 60);
        assert_eq!(s.quota_shares, QuotaShares::default());
        assert!(s.fcm_server_key.is_none());
        assert_eq!(s.fcm_endpoint, DEFAULT_FCM_ENDPOINT);
        assert!(s.require_database_url().is_err());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let mut map = HashMap::new();
        map.insert(ENV_DATABASE_URL, "postgres://localhost/freightdesk");
        map.insert(ENV_DAEMON_ADDR, "0.0.0.0:9000");
        map.insert(ENV_RESPONSE_TIMEOUT_MINUTES, "15");
        map.insert(ENV_WORKER_TICK_SECS, "5");
        map.insert(ENV_QUOTA_SHARES, "0.50,0.25,0.15");
        map.insert(ENV_FCM_SERVER_KEY, "key-123");

        let s = Settings::from_lookup(lookup(&map)).unwrap();
        assert_eq!(
            s.require_database_url().unwrap(),
            "postgres://localhost/freightdesk"
        );
        assert_eq!(s.daemon_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(s.response_timeout(), chrono::Duration::minutes(15));
        assert_eq!(s.worker_tick(), Duration::from_secs(5));
        assert_eq!(s.quota_shares.a, 0.50);
        assert_eq!(s.fcm_server_key.as_deref(), Some("key-123"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (key, val) in [
            (ENV_DAEMON_ADDR, "not-an-addr"),
            (ENV_RESPONSE_TIMEOUT_MINUTES, "soon"),
            (ENV_RESPONSE_TIMEOUT_MINUTES, "0"),
            (ENV_WORKER_TICK_SECS, "-1"),
            (ENV_WORKER_TICK_SECS, "0"),
            (ENV_QUOTA_SHARES, "0.9,0.9,0.9"),
        ] {
            let mut map = HashMap::new();
            map.insert(key, val);
            assert!(
                Settings::from_lookup(lookup(&map)).is_err(),
                "{key}={val} should be rejected"
            );
        }
    }
}
