//! Common types shared across the engine

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A wrapper around `SecretString` that provides safe handling of sensitive
/// values such as the credentialed source URL and the destination DSN.
///
/// - Redacts the value in `Debug` and `Display` output to prevent credential
///   leaks in logs
/// - Serializes as `"***REDACTED***"` to prevent accidental exposure in
///   config dumps
/// - Provides `expose_secret()` to access the actual value when needed
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string from any string-like value
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    ///
    /// Use sparingly - only when the actual value is needed (e.g., to build
    /// a request URL or open a connection).
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Serialize as redacted to prevent accidental exposure in config dumps/logs
impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

/// Deserialize from the actual string value
impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_string_redacted_debug() {
        let secret = SensitiveString::new("https://portal.example/rest/1/abc123/");
        let debug_output = format!("{:?}", secret);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("abc123"));
    }

    #[test]
    fn test_sensitive_string_redacted_display() {
        let secret = SensitiveString::new("postgres://user:pw@host/db");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_sensitive_string_expose() {
        let secret = SensitiveString::new("my-secret");
        assert_eq!(secret.expose_secret(), "my-secret");
    }

    #[test]
    fn test_sensitive_string_serialize() {
        let secret = SensitiveString::new("my-secret");
        let serialized = serde_json::to_string(&secret).unwrap();
        assert_eq!(serialized, "\"***REDACTED***\"");
    }

    #[test]
    fn test_sensitive_string_deserialize() {
        let secret: SensitiveString = serde_json::from_str("\"my-secret\"").unwrap();
        assert_eq!(secret.expose_secret(), "my-secret");
    }
}
