//! LLM Backend Abstraction
//!
//! Defines the [`LlmBackend`] trait implemented once per upstream API.
//! Backends own the wire format, credential lookup, the timeout/retry
//! executor and response normalization. Everything above them only sees
//! plain text, text streams and embedding vectors.
//!
//! ## Modules
//!
//! - `gemini`: Google Gemini `generateContent` REST API (primary)
//! - `minimax`: MiniMax OpenAI-compatible chat completions (secondary)
//! - `rate_limit`: client-side sliding window used by the secondary backend
//! - `sse`: server-sent events decoding shared by both streaming paths

mod gemini;
mod minimax;
mod rate_limit;
mod sse;

pub use gemini::{GEMINI_API_KEY_ENV, GeminiBackend};
pub use minimax::{MINIMAX_API_KEY_ENV, MiniMaxBackend, validate_api_key};
pub use rate_limit::RateLimiter;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::constants::network;
use crate::types::{ChatMessage, EmbeddingTask, ProviderKind, Result, SophiaError};

// =============================================================================
// Requests
// =============================================================================

/// Provider-neutral completion request
///
/// `messages` holds the conversation in order; single-shot operations carry
/// exactly one user message.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Operation label for logs and timeout errors
    pub operation: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    /// Overrides the backend's configured model
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(operation: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            system: None,
            messages: vec![ChatMessage::user(user)],
            temperature: 0.4,
            max_output_tokens: None,
            model: None,
        }
    }

    /// Request carrying a full conversation
    pub fn conversation(operation: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            operation: operation.into(),
            system: None,
            messages,
            temperature: 0.4,
            max_output_tokens: None,
            model: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Lazy sequence of text fragments in arrival order
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

// =============================================================================
// Backend Trait
// =============================================================================

/// One upstream LLM API
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model used when a request does not override it
    fn model(&self) -> &str;

    /// Single completion, normalized to text
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Streaming completion
    ///
    /// The initial request goes through the retry executor; fragments are
    /// not retried once the body starts flowing.
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream>;

    /// Embedding vector for `text`
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>>;
}

/// Shared backend type for concurrent access across requests
pub type SharedBackend = Arc<dyn LlmBackend>;

// =============================================================================
// Shared Helpers
// =============================================================================

/// HTTP client shared by both backends
///
/// The overall timeout matches the executor's so streaming bodies are
/// bounded too.
pub(crate) fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
        .timeout(request_timeout)
        .build()
        .map_err(|e| SophiaError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport failure into a provider error the classifier understands
pub(crate) fn transport_error(provider: ProviderKind, err: reqwest::Error) -> SophiaError {
    if err.is_timeout() {
        SophiaError::api(provider.as_str(), format!("Request timed out: {}", err))
    } else if err.is_connect() {
        SophiaError::api(
            provider.as_str(),
            format!("Network error: service temporarily unreachable ({})", err),
        )
    } else if err.is_body() {
        SophiaError::api(
            provider.as_str(),
            format!("Connection temporarily interrupted while reading the response ({})", err),
        )
    } else {
        SophiaError::api(provider.as_str(), format!("Request failed: {}", err))
    }
}

/// Map a failure to read or decode a response body.
///
/// Only a body that arrived whole but is not the expected JSON is a
/// malformed response; timeouts and dropped connections stay transport errors.
pub(crate) fn decode_error(provider: ProviderKind, err: reqwest::Error) -> SophiaError {
    if err.is_decode() && !err.is_timeout() {
        SophiaError::MalformedResponse(format!("Failed to parse {} response: {}", provider, err))
    } else {
        transport_error(provider, err)
    }
}

/// Resolve a credential from configuration, then from the environment
pub(crate) fn resolve_key(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response: the headers plus `body`, then keep the
    /// connection open without finishing the declared body
    async fn serve_once(content_length: usize, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
                content_length
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_body_timeout_is_retryable() {
        let url = serve_once(64, "{\"candidates\":").await;
        let client = build_http_client(Duration::from_millis(200)).unwrap();

        let response = client.get(&url).send().await.unwrap();
        let err = response.json::<serde_json::Value>().await.unwrap_err();
        let err = decode_error(ProviderKind::Gemini, err);

        assert!(!matches!(err, SophiaError::MalformedResponse(_)), "{err:?}");
        assert!(err.is_retryable(), "{err:?}");
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_malformed() {
        let body = "not json";
        let url = serve_once(body.len(), body).await;
        let client = build_http_client(Duration::from_secs(5)).unwrap();

        let response = client.get(&url).send().await.unwrap();
        let err = response.json::<serde_json::Value>().await.unwrap_err();
        let err = decode_error(ProviderKind::MiniMax, err);

        assert!(matches!(err, SophiaError::MalformedResponse(_)), "{err:?}");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("code generation", "reverse a string")
            .with_system("You are a code generation expert.")
            .with_temperature(0.2)
            .with_max_output_tokens(1500)
            .with_model(Some("gemini-2.5-pro".to_string()));

        assert_eq!(request.operation, "code generation");
        assert_eq!(request.messages, vec![ChatMessage::user("reverse a string")]);
        assert_eq!(request.system.as_deref(), Some("You are a code generation expert."));
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_output_tokens, Some(1500));
        assert_eq!(request.model.as_deref(), Some("gemini-2.5-pro"));
    }

    #[test]
    fn test_resolve_key_prefers_config() {
        assert_eq!(
            resolve_key(Some("  configured-key  "), "SOPHIA_TEST_UNSET_KEY"),
            Some("configured-key".to_string())
        );
        assert_eq!(resolve_key(Some("   "), "SOPHIA_TEST_UNSET_KEY"), None);
        assert_eq!(resolve_key(None, "SOPHIA_TEST_UNSET_KEY"), None);
    }
}
