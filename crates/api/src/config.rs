use std::time::Duration;

use costkeeper_core::assignment::condition::CaseMode;
use costkeeper_core::assignment::reapply::DEFAULT_POOL_BATCH_SIZE;
use costkeeper_core::assignment::retry::{RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    /// Assignment-rule engine tuning.
    pub assignment: AssignmentConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            assignment: AssignmentConfig::from_env(),
        }
    }
}

/// Tuning for rule matching, priority writes and bulk re-application.
#[derive(Debug, Clone)]
pub struct AssignmentConfig {
    /// Fold case when comparing names, attributes and tags.
    pub case_insensitive: bool,
    /// Attempts per priority write before answering 503.
    pub retry_attempts: u32,
    /// Pause between priority write attempts.
    pub retry_backoff_ms: u64,
    /// Pools whose resources are listed per inventory query during reapply.
    pub reapply_pool_batch_size: usize,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_BACKOFF.as_millis() as u64,
            reapply_pool_batch_size: DEFAULT_POOL_BATCH_SIZE,
        }
    }
}

impl AssignmentConfig {
    /// Load from environment variables, falling back to [`Default`].
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `ASSIGNMENT_CASE_INSENSITIVE` | `false` |
    /// | `PRIORITY_RETRY_ATTEMPTS`     | `3`     |
    /// | `PRIORITY_RETRY_BACKOFF_MS`   | `25`    |
    /// | `REAPPLY_POOL_BATCH_SIZE`     | `50`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let case_insensitive = std::env::var("ASSIGNMENT_CASE_INSENSITIVE")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.case_insensitive);

        let retry_attempts: u32 = std::env::var("PRIORITY_RETRY_ATTEMPTS")
            .map(|v| v.parse().expect("PRIORITY_RETRY_ATTEMPTS must be a valid u32"))
            .unwrap_or(defaults.retry_attempts);

        let retry_backoff_ms: u64 = std::env::var("PRIORITY_RETRY_BACKOFF_MS")
            .map(|v| v.parse().expect("PRIORITY_RETRY_BACKOFF_MS must be a valid u64"))
            .unwrap_or(defaults.retry_backoff_ms);

        let reapply_pool_batch_size: usize = std::env::var("REAPPLY_POOL_BATCH_SIZE")
            .map(|v| v.parse().expect("REAPPLY_POOL_BATCH_SIZE must be a valid usize"))
            .unwrap_or(defaults.reapply_pool_batch_size);

        Self {
            case_insensitive,
            retry_attempts,
            retry_backoff_ms,
            reapply_pool_batch_size,
        }
    }

    pub fn case_mode(&self) -> CaseMode {
        if self.case_insensitive {
            CaseMode::Insensitive
        } else {
            CaseMode::Sensitive
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
