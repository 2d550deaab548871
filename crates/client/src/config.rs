use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Client configuration loaded from environment variables.
///
/// Every field has a default suitable for running against the services on
/// localhost.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the identity service (default: `http://localhost:3001`).
    pub user_api_url: String,
    /// Base URL of the job service REST API (default: `http://localhost:8000`).
    pub job_api_url: String,
    /// Base URL of the job service push channel (default: `ws://localhost:8000`).
    pub job_ws_url: String,
    /// Delay between poll ticks while any job is active.
    pub poll_interval: Duration,
    /// Upper bound on a token verification round trip.
    pub verify_timeout: Duration,
    /// Default timeout for every other HTTP request.
    pub request_timeout: Duration,
    /// Push channel retry policy.
    pub reconnect: ReconnectConfig,
    /// Directory holding the persisted session file.
    pub session_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_api_url: "http://localhost:3001".into(),
            job_api_url: "http://localhost:8000".into(),
            job_ws_url: "ws://localhost:8000".into(),
            poll_interval: Duration::from_millis(1000),
            verify_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            session_dir: PathBuf::from(".stockdash"),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `USER_API_URL`           | `http://localhost:3001`  |
    /// | `JOB_API_URL`            | `http://localhost:8000`  |
    /// | `JOB_WS_URL`             | `ws://localhost:8000`    |
    /// | `POLL_INTERVAL_MS`       | `1000`                   |
    /// | `VERIFY_TIMEOUT_SECS`    | `5`                      |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                     |
    /// | `MAX_RECONNECT_ATTEMPTS` | `5`                      |
    /// | `RECONNECT_DELAY_MS`     | `1000`                   |
    /// | `SESSION_DIR`            | `.stockdash`             |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let user_api_url = env_url("USER_API_URL", defaults.user_api_url);
        let job_api_url = env_url("JOB_API_URL", defaults.job_api_url);
        let job_ws_url = env_url("JOB_WS_URL", defaults.job_ws_url);

        let poll_interval = poll_interval_from_millis(env_number("POLL_INTERVAL_MS", 1000u64));
        let verify_timeout = Duration::from_secs(env_number("VERIFY_TIMEOUT_SECS", 5));
        let request_timeout = Duration::from_secs(env_number("REQUEST_TIMEOUT_SECS", 30));

        let reconnect = ReconnectConfig {
            max_attempts: env_number("MAX_RECONNECT_ATTEMPTS", 5u32),
            delay: Duration::from_millis(env_number("RECONNECT_DELAY_MS", 1000)),
        };

        let session_dir = std::env::var("SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.session_dir);

        Self {
            user_api_url,
            job_api_url,
            job_ws_url,
            poll_interval,
            verify_timeout,
            request_timeout,
            reconnect,
            session_dir,
        }
    }
}

/// Read a base URL, dropping any trailing slash so paths can be appended.
fn env_url(key: &str, default: String) -> String {
    std::env::var(key)
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

fn env_number<T: FromStr>(key: &str, default: T) -> T {
    parse_number(key, std::env::var(key).ok(), default)
}

fn parse_number<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a non-negative integer in range")),
        None => default,
    }
}

/// A zero interval would make the poller spin.
fn poll_interval_from_millis(millis: u64) -> Duration {
    assert!(millis > 0, "POLL_INTERVAL_MS must be greater than zero");
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.verify_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay, Duration::from_secs(1));
        assert_eq!(config.session_dir, PathBuf::from(".stockdash"));
    }

    #[test]
    fn numbers_parse_into_target_type() {
        assert_eq!(parse_number("MAX_RECONNECT_ATTEMPTS", Some(" 7 ".into()), 5u32), 7);
        assert_eq!(parse_number("MAX_RECONNECT_ATTEMPTS", None, 5u32), 5);
        assert_eq!(poll_interval_from_millis(250), Duration::from_millis(250));
    }

    #[test]
    #[should_panic(expected = "MAX_RECONNECT_ATTEMPTS")]
    fn reconnect_attempts_beyond_u32_are_rejected() {
        parse_number("MAX_RECONNECT_ATTEMPTS", Some("4294967296".into()), 5u32);
    }

    #[test]
    #[should_panic(expected = "POLL_INTERVAL_MS must be greater than zero")]
    fn zero_poll_interval_is_rejected() {
        poll_interval_from_millis(0);
    }
}
