//! Unified Error Type System
//!
//! Centralized error type for the AI core. Every operation returns
//! `Result<T, SophiaError>`; the "Error: " string convention used by
//! presentation code is produced only at the boundary via
//! [`SophiaError::user_message`].
//!
//! ## Error Categories
//!
//! - **Configuration**: Missing credential or invalid setting (fail fast)
//! - **Validation**: Input rejected before any network call
//! - **Transient**: Timeouts, 5xx, rate limiting (retry with backoff)
//! - **NonTransient**: Provider errors that will not resolve on retry
//! - **ContentPolicy**: Safety or recitation block (never retried)
//! - **Pipeline**: Stage failure inside the multi-step orchestrator
//! - **Internal**: Caught panics and other unexpected failures

use std::any::Any;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories used for retry and presentation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing credential, bad endpoint, invalid setting
    Configuration,
    /// Input too large or otherwise rejected locally
    Validation,
    /// Timeouts, 5xx responses, rate limiting
    Transient,
    /// Provider errors that retrying will not fix
    NonTransient,
    /// Safety or recitation block
    ContentPolicy,
    /// Multi-step stage failure
    Pipeline,
    /// Unexpected failure caught at an entry point
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::NonTransient => write!(f, "NON_TRANSIENT"),
            Self::ContentPolicy => write!(f, "CONTENT_POLICY"),
            Self::Pipeline => write!(f, "PIPELINE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is retryable on the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum SophiaError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Configuration & Validation
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Input too large ({estimated} estimated tokens, max {max}). Please reduce input size.")]
    InputTooLarge { estimated: usize, max: usize },

    // -------------------------------------------------------------------------
    // Provider Errors
    // -------------------------------------------------------------------------
    /// Transport or HTTP-level failure reported by a provider
    #[error("{message}")]
    Api {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Operation timeout with context
    #[error("Request timed out after {}s: {operation}", duration.as_secs())]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Prompt or candidate blocked by the provider's safety filter
    #[error("{0}")]
    ContentBlocked(String),

    /// Provider stopped generating (recitation, unknown stop reason)
    #[error("{0}")]
    GenerationStopped(String),

    /// Provider answered without any usable content
    #[error("{0}")]
    EmptyResponse(String),

    /// Provider answered with a shape we cannot interpret
    #[error("{0}")]
    MalformedResponse(String),

    #[error("{operation} is not supported by {provider}")]
    Unsupported { provider: String, operation: String },

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Multi-step stage failure
    #[error("Stage {stage} ({stage_name}) failed: {message}")]
    Pipeline {
        stage: u8,
        stage_name: String,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SophiaError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl SophiaError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a pipeline stage error
    pub fn pipeline(stage: u8, stage_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            stage,
            stage_name: stage_name.into(),
            message: message.into(),
        }
    }

    /// Create a provider error without an HTTP status (transport failure)
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Create a provider error carrying the HTTP status
    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn unsupported(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            operation: operation.into(),
        }
    }

    /// Internal error from a caught panic payload
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("Unexpected error: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("Unexpected error: {}", s)
        } else {
            "Unexpected error".to_string()
        };
        Self::Internal(message)
    }

    /// Category used for retry and presentation decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::InputTooLarge { .. } => ErrorCategory::Validation,
            Self::Timeout { .. } => ErrorCategory::Transient,
            Self::Api { status, message, .. } => match status {
                Some(code) => match ErrorClassifier::classify_http_status(*code) {
                    ErrorCategory::NonTransient => ErrorClassifier::classify(message),
                    category => category,
                },
                None => ErrorClassifier::classify(message),
            },
            Self::Io(e) => ErrorClassifier::classify(&e.to_string()),
            Self::ContentBlocked(_) | Self::GenerationStopped(_) => ErrorCategory::ContentPolicy,
            Self::EmptyResponse(_)
            | Self::MalformedResponse(_)
            | Self::Unsupported { .. }
            | Self::Json(_) => ErrorCategory::NonTransient,
            Self::Pipeline { .. } => ErrorCategory::Pipeline,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if the executor should try this call again
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Render for callers that still expect the "Error: " string convention
    pub fn user_message(&self) -> String {
        format!("Error: {}", self)
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Message patterns that mark a failure as transient: a 5xx status code,
/// a timeout, rate limiting or a temporary outage.
static TRANSIENT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b5\d\d\b|timeout|timed out|\brate|temporarily").ok()
});

/// Error classifier for retry routing
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a free-form error message
    pub fn classify(message: &str) -> ErrorCategory {
        if Self::is_transient_message(message) {
            ErrorCategory::Transient
        } else {
            ErrorCategory::NonTransient
        }
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16) -> ErrorCategory {
        match status {
            429 | 500..=599 => ErrorCategory::Transient,
            401 | 403 => ErrorCategory::Configuration,
            _ => ErrorCategory::NonTransient,
        }
    }

    /// True when the message matches one of the transient patterns
    pub fn is_transient_message(message: &str) -> bool {
        TRANSIENT_PATTERN
            .as_ref()
            .is_some_and(|re| re.is_match(message))
    }
}

// =============================================================================
// Tests
// =============================================================================
