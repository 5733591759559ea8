//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/sophia/) and project (.sophia/) level configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{network, retry, secondary};
use crate::types::{Result, SophiaError};

pub const DEFAULT_PRIMARY_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PRIMARY_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_SECONDARY_API_BASE: &str = "https://api.minimax.chat/v1";
pub const DEFAULT_SECONDARY_MODEL: &str = "minimax/minimax-m2:free";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// AI core settings
    pub ai: AiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `SophiaError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        let ai = &self.ai;

        if ai.request_timeout_secs == 0 {
            return Err(SophiaError::Config(
                "ai.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if ai.max_concurrent_requests == 0 {
            return Err(SophiaError::Config(
                "ai.max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        if ai.retry.max_attempts == 0 {
            return Err(SophiaError::Config(
                "ai.retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if ai.retry.backoff_base < 1.0 {
            return Err(SophiaError::Config(format!(
                "ai.retry.backoff_base must be at least 1.0, got {}",
                ai.retry.backoff_base
            )));
        }

        if ai.retry.backoff_max_secs < 0.0 || ai.retry.jitter_max_secs < 0.0 {
            return Err(SophiaError::Config(
                "ai.retry backoff and jitter bounds must not be negative".to_string(),
            ));
        }

        if ai.secondary.requests_per_minute == 0 {
            return Err(SophiaError::Config(
                "ai.secondary.requests_per_minute must be greater than 0".to_string(),
            ));
        }

        validate_endpoint("ai.primary.api_base", &ai.primary.api_base)?;
        validate_endpoint("ai.secondary.api_base", &ai.secondary.api_base)?;

        Ok(())
    }
}

/// Only http and https endpoints are accepted
fn validate_endpoint(field: &str, endpoint: &str) -> Result<()> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| SophiaError::Config(format!("Invalid {} '{}': {}", field, endpoint, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(SophiaError::Config(format!(
            "Invalid {} scheme '{}': only http and https are allowed",
            field, scheme
        ))),
    }
}

// =============================================================================
// AI Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Per-call timeout enforced by the executor (seconds)
    pub request_timeout_secs: u64,

    /// Upper bound on provider calls in flight at once
    pub max_concurrent_requests: usize,

    /// Preference used when the caller passes none
    pub default_preference: String,

    pub retry: RetryConfig,

    pub primary: PrimaryProviderConfig,

    pub secondary: SecondaryProviderConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            max_concurrent_requests: network::MAX_CONCURRENT_REQUESTS,
            default_preference: DEFAULT_PRIMARY_MODEL.to_string(),
            retry: RetryConfig::default(),
            primary: PrimaryProviderConfig::default(),
            secondary: SecondaryProviderConfig::default(),
        }
    }
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Backoff before attempt n+1 is `min(backoff_max_secs, backoff_base^(n-1))`
    pub backoff_base: f64,

    pub backoff_max_secs: f64,

    /// Uniform jitter added on top of the backoff, in `[0, jitter_max_secs)`
    pub jitter_max_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            backoff_base: retry::BACKOFF_BASE,
            backoff_max_secs: retry::BACKOFF_MAX_SECS,
            jitter_max_secs: retry::JITTER_MAX_SECS,
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Gemini settings
///
/// The API key is never serialized to output and is redacted in debug output.
/// Falls back to `GEMINI_API_KEY` when unset.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryProviderConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub api_base: String,

    pub model: String,

    pub embedding_model: String,
}

impl std::fmt::Debug for PrimaryProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl Default for PrimaryProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_PRIMARY_API_BASE.to_string(),
            model: DEFAULT_PRIMARY_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

/// MiniMax settings
///
/// Falls back to `MINIMAX_API_KEY` when `api_key` is unset.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryProviderConfig {
    /// Disable to route every request to the primary provider
    pub enabled: bool,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub api_base: String,

    pub model: String,

    /// Client-side sliding-window limit
    pub requests_per_minute: u32,

    /// Answer explanation and tag requests heuristically when the API fails
    pub heuristic_fallback: bool,
}

impl std::fmt::Debug for SecondaryProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryProviderConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("heuristic_fallback", &self.heuristic_fallback)
            .finish()
    }
}

impl Default for SecondaryProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            api_base: DEFAULT_SECONDARY_API_BASE.to_string(),
            model: DEFAULT_SECONDARY_MODEL.to_string(),
            requests_per_minute: secondary::REQUESTS_PER_WINDOW,
            heuristic_fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ai.request_timeout_secs, 300);
        assert_eq!(config.ai.retry.max_attempts, 3);
        assert_eq!(config.ai.secondary.requests_per_minute, 8);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.ai.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(SophiaError::Config(_))));
    }

    #[test]
    fn test_backoff_base_below_one_rejected() {
        let mut config = Config::default();
        config.ai.retry.backoff_base = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_scheme_rejected() {
        let mut config = Config::default();
        config.ai.secondary.api_base = "ftp://api.minimax.chat/v1".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("only http and https"));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let mut config = Config::default();
        config.ai.primary.api_key = Some("super-secret-gemini-key".to_string());
        config.ai.secondary.api_key = Some("super-secret-minimax-key".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_keys_not_serialized() {
        let mut config = Config::default();
        config.ai.primary.api_key = Some("super-secret-gemini-key".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
