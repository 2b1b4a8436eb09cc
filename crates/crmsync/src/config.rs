//! Engine configuration
//!
//! Configuration is environment-driven: the scheduler that launches a run
//! decides the mode and overlap through variables, nothing is read from
//! disk. Secrets (the credentialed source URL, the destination DSN) are
//! wrapped in [`SensitiveString`] so they cannot leak through logs or
//! config dumps.

use std::str::FromStr;

use validator::Validate;

use crate::error::SyncError;
use crate::retry::RetryConfig;
use crate::types::SensitiveString;

/// Sync mode for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Backfill every record regardless of modification time
    Full,
    /// Select only records modified after the per-kind watermark, minus
    /// the configured look-back overlap
    Incremental,
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(SyncError::config(format!(
                "unknown SYNC_MODE '{other}', expected 'full' or 'incremental'"
            ))),
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

/// Resolved engine configuration
#[derive(Debug, Clone, Validate)]
pub struct SyncConfig {
    /// Credentialed base URL of the source API
    pub source_endpoint: SensitiveString,

    /// Destination store connection string
    pub destination_connection: SensitiveString,

    /// Run mode
    pub sync_mode: SyncMode,

    /// Incremental safety overlap in hours, subtracted from the watermark
    /// to tolerate clock skew and late-visible edits
    #[validate(range(max = 720))]
    pub lookback_hours: u32,

    /// Source request ceiling in requests per second; 0 disables limiting
    #[validate(range(max = 100))]
    pub requests_per_second: u32,

    /// Retry attempts for a failed page request, on top of the initial one
    #[validate(range(max = 10))]
    pub max_retries: u32,
}

impl SyncConfig {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let source_endpoint = require(&lookup, "SOURCE_ENDPOINT")?;
        if !source_endpoint.starts_with("http://") && !source_endpoint.starts_with("https://") {
            return Err(SyncError::config(
                "SOURCE_ENDPOINT must be an http(s) URL",
            ));
        }
        let destination_connection = require(&lookup, "DESTINATION_CONNECTION")?;

        let sync_mode = match lookup("SYNC_MODE") {
            Some(raw) => raw.parse()?,
            None => SyncMode::Full,
        };

        let config = Self {
            source_endpoint: SensitiveString::new(source_endpoint),
            destination_connection: SensitiveString::new(destination_connection),
            sync_mode,
            lookback_hours: parse_or(&lookup, "LOOKBACK_HOURS", 24)?,
            requests_per_second: parse_or(&lookup, "SYNC_RATE_LIMIT_RPS", 2)?,
            max_retries: parse_or(&lookup, "SYNC_MAX_RETRIES", 3)?,
        };

        config
            .validate()
            .map_err(|e| SyncError::config(e.to_string()))?;
        Ok(config)
    }

    /// Incremental selection overlap as a duration
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lookback_hours))
    }

    /// Retry policy for page requests
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_retries(self.max_retries)
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, SyncError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SyncError::config(format!("{name} is not set"))),
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, SyncError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SyncError::config(format!("{name} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |name| map.get(name).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_env_with(env(&[
            ("SOURCE_ENDPOINT", "https://portal.example/rest/1/token"),
            ("DESTINATION_CONNECTION", "postgres://localhost/analytics"),
        ]))
        .unwrap();

        assert_eq!(config.sync_mode, SyncMode::Full);
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.requests_per_second, 2);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_incremental_mode_and_overrides() {
        let config = SyncConfig::from_env_with(env(&[
            ("SOURCE_ENDPOINT", "https://portal.example/rest/1/token"),
            ("DESTINATION_CONNECTION", "postgres://localhost/analytics"),
            ("SYNC_MODE", "incremental"),
            ("LOOKBACK_HOURS", "48"),
            ("SYNC_RATE_LIMIT_RPS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.sync_mode, SyncMode::Incremental);
        assert_eq!(config.lookback_hours, 48);
        assert_eq!(config.lookback(), chrono::Duration::hours(48));
        assert_eq!(config.requests_per_second, 5);
    }

    #[test]
    fn test_missing_required() {
        let err = SyncConfig::from_env_with(env(&[(
            "SOURCE_ENDPOINT",
            "https://portal.example/rest/1/token",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("DESTINATION_CONNECTION"));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let err = SyncConfig::from_env_with(env(&[
            ("SOURCE_ENDPOINT", "ftp://portal.example"),
            ("DESTINATION_CONNECTION", "postgres://localhost/analytics"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let err = SyncConfig::from_env_with(env(&[
            ("SOURCE_ENDPOINT", "https://portal.example/rest/1/token"),
            ("DESTINATION_CONNECTION", "postgres://localhost/analytics"),
            ("SYNC_MODE", "delta"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("delta"));
    }

    #[test]
    fn test_rejects_bad_number() {
        let err = SyncConfig::from_env_with(env(&[
            ("SOURCE_ENDPOINT", "https://portal.example/rest/1/token"),
            ("DESTINATION_CONNECTION", "postgres://localhost/analytics"),
            ("LOOKBACK_HOURS", "yesterday"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("LOOKBACK_HOURS"));
    }

    #[test]
    fn test_mode_round_trip() {
        assert_eq!("full".parse::<SyncMode>().unwrap(), SyncMode::Full);
        assert_eq!(
            "INCREMENTAL".parse::<SyncMode>().unwrap(),
            SyncMode::Incremental
        );
        assert_eq!(SyncMode::Incremental.to_string(), "incremental");
    }
}
