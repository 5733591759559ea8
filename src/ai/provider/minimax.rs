//! MiniMax Backend
//!
//! Secondary provider speaking the OpenAI-compatible `chat/completions` API.
//! Calls share a client-side sliding-window rate limit; the limiter is
//! acquired once per call, before the retry executor takes over.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{
    CompletionRequest, LlmBackend, RateLimiter, TextStream, build_http_client, decode_error,
    resolve_key, sse, transport_error,
};
use crate::ai::retry::RetryExecutor;
use crate::config::AiConfig;
use crate::constants::{TRUNCATION_NOTE, secondary};
use crate::types::{ChatRole, EmbeddingTask, ProviderKind, Result, SophiaError};

pub const MINIMAX_API_KEY_ENV: &str = "MINIMAX_API_KEY";

const PROVIDER: ProviderKind = ProviderKind::MiniMax;

const PLACEHOLDER_MARKERS: [&str; 4] = ["your-api-key", "api-key-here", "replace-me", "example"];

const MIN_KEY_LEN: usize = 20;

/// Reject key formats that can never authenticate
///
/// Catches the usual copy-paste mistakes before any request is sent.
pub fn validate_api_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(SophiaError::Config("API key is missing or empty".to_string()));
    }
    if api_key.starts_with("Bearer ") {
        return Err(SophiaError::Config(
            "API key should not include 'Bearer ' prefix - remove it".to_string(),
        ));
    }
    if api_key.contains('"') || api_key.contains('\'') {
        return Err(SophiaError::Config(
            "API key contains quotes - remove them".to_string(),
        ));
    }
    if api_key.trim().chars().count() < MIN_KEY_LEN {
        return Err(SophiaError::Config(
            "API key appears too short - verify it's complete".to_string(),
        ));
    }
    let lower = api_key.to_lowercase();
    if PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m)) {
        return Err(SophiaError::Config(
            "API key appears to be a placeholder - replace with actual key".to_string(),
        ));
    }
    Ok(())
}

/// MiniMax backend with secure API key handling
pub struct MiniMaxBackend {
    configured_key: Option<String>,
    api_base: String,
    model: String,
    client: reqwest::Client,
    executor: RetryExecutor,
    limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for MiniMaxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniMaxBackend")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl MiniMaxBackend {
    /// Build the backend, failing when no usable credential can be resolved
    pub fn new(config: &AiConfig, executor: RetryExecutor) -> Result<Self> {
        let settings = &config.secondary;
        let backend = Self {
            configured_key: settings.api_key.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            client: build_http_client(config.request_timeout())?,
            executor,
            limiter: Arc::new(RateLimiter::new(
                settings.requests_per_minute,
                Duration::from_secs(secondary::WINDOW_SECS),
            )),
        };
        backend.credential()?;
        Ok(backend)
    }

    /// Resolve and validate the API key for this call
    fn credential(&self) -> Result<Arc<SecretString>> {
        let key = resolve_key(self.configured_key.as_deref(), MINIMAX_API_KEY_ENV).ok_or_else(
            || {
                SophiaError::Config(format!(
                    "{} is not configured. Please set the {} environment variable.",
                    MINIMAX_API_KEY_ENV, MINIMAX_API_KEY_ENV
                ))
            },
        )?;
        validate_api_key(&key)?;
        Ok(Arc::new(SecretString::from(key)))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Rate-limit, then POST through the retry executor.
    ///
    /// `read` consumes the response inside each attempt, so reading the body
    /// shares the attempt's timeout and retries.
    async fn post<T, F, Fut>(&self, request: &CompletionRequest, stream: bool, read: F) -> Result<T>
    where
        F: Fn(reqwest::Response) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let key = self.credential()?;
        let url = self.completions_url();
        let body = Arc::new(build_request(request, &self.model, stream));

        self.limiter.acquire().await;

        self.executor
            .execute(&request.operation, || {
                let client = self.client.clone();
                let url = url.clone();
                let key = Arc::clone(&key);
                let body = Arc::clone(&body);
                let read = read.clone();
                async move { read(send(client, url, key, body).await?).await }
            })
            .await
    }
}

/// Send one HTTP attempt and map non-success statuses to provider errors
async fn send(
    client: reqwest::Client,
    url: String,
    key: Arc<SecretString>,
    body: Arc<ChatRequest>,
) -> Result<reqwest::Response> {
    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", key.expose_secret()))
        .header("Content-Type", "application/json")
        .json(body.as_ref())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    let text = response.text().await.unwrap_or_default();
    Err(status_error(code, &text))
}

/// Provider error for a non-success HTTP status
fn status_error(code: u16, body: &str) -> SophiaError {
    let message = match code {
        401 => {
            let detail = serde_json::from_str::<ErrorEnvelope>(body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| "Unknown authentication error".to_string());
            error!(detail = %detail, "MiniMax authentication failed");
            format!("Authentication failed: {}", detail)
        }
        429 => "Rate limit exceeded. Please wait and try again.".to_string(),
        500..=599 => format!("Server error: {} - {}", code, body),
        _ => format!("API error: {} - {}", code, body),
    };
    SophiaError::http(PROVIDER.as_str(), code, message)
}

#[async_trait]
impl LlmBackend for MiniMaxBackend {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        info!(
            operation = %request.operation,
            model = request.model.as_deref().unwrap_or(&self.model),
            temperature = request.temperature,
            "Generating with MiniMax"
        );

        let operation = request.operation.clone();
        self.post(request, false, move |response| {
            let operation = operation.clone();
            async move {
                let parsed: ChatResponse =
                    response.json().await.map_err(|e| decode_error(PROVIDER, e))?;
                normalize_response(&parsed, &operation)
            }
        })
        .await
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        info!(operation = %request.operation, "Streaming with MiniMax");

        let response = self
            .post(request, true, |response| async move { Ok(response) })
            .await?;
        let operation = request.operation.clone();

        let fragments = sse::data_payloads(PROVIDER, response).filter_map(move |payload| {
            let result = payload.and_then(|raw| {
                let chunk: ChatResponse = serde_json::from_str(&raw).map_err(|e| {
                    SophiaError::MalformedResponse(format!("Invalid MiniMax stream event: {}", e))
                })?;
                stream_fragment(&chunk, &operation)
            });
            futures::future::ready(match result {
                Ok(text) if text.is_empty() => None,
                other => Some(other),
            })
        });

        Ok(Box::pin(fragments))
    }

    async fn embed(&self, _text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        debug!(task = task.as_api_str(), "MiniMax has no embedding endpoint");
        Err(SophiaError::unsupported(PROVIDER.as_str(), "embedding"))
    }
}

// =============================================================================
// Request Building
// =============================================================================

fn build_request(request: &CompletionRequest, default_model: &str, stream: bool) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(WireMessage {
            role: "system",
            content: system.clone(),
        });
    }
    messages.extend(request.messages.iter().map(|m| WireMessage {
        role: match m.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        },
        content: m.content.clone(),
    }));

    ChatRequest {
        model: request
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string()),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_output_tokens,
        stream,
    }
}

// =============================================================================
// Response Normalization
// =============================================================================

/// Classify a MiniMax response into text or a typed failure
///
/// - `base_resp` with a non-zero status → provider error
/// - no choices → `EmptyResponse`
/// - `length` → text plus a truncation note (degraded success)
/// - `content_filter` / `sensitive` → `ContentBlocked`
/// - anything else → trimmed text, `EmptyResponse` when blank
pub(crate) fn normalize_response(response: &ChatResponse, operation: &str) -> Result<String> {
    if let Some(base) = &response.base_resp
        && base.status_code != 0
    {
        error!(operation, code = base.status_code, "MiniMax reported a failure");
        return Err(SophiaError::api(
            PROVIDER.as_str(),
            format!("API error: {} - {}", base.status_code, base.status_msg),
        ));
    }

    let Some(choice) = response.choices.first() else {
        error!(operation, "MiniMax returned no choices");
        return Err(SophiaError::EmptyResponse(
            "No choices in MiniMax API response".to_string(),
        ));
    };

    let text = choice
        .message
        .as_ref()
        .and_then(|m| m.content.as_deref())
        .unwrap_or_default()
        .trim();

    match choice.finish_reason.as_deref() {
        Some("content_filter" | "sensitive") => {
            error!(operation, "MiniMax blocked the response");
            Err(SophiaError::ContentBlocked(
                "Content blocked due to safety concerns.".to_string(),
            ))
        }
        Some("length") if !text.is_empty() => {
            warn!(operation, "Response truncated due to length");
            Ok(format!("{}{}", text, TRUNCATION_NOTE))
        }
        Some("length") => Err(SophiaError::EmptyResponse(
            "Output exceeded maximum length and no content was generated.".to_string(),
        )),
        _ if text.is_empty() => {
            error!(operation, "MiniMax returned empty content");
            Err(SophiaError::EmptyResponse(
                "API completed but returned no content.".to_string(),
            ))
        }
        _ => Ok(text.to_string()),
    }
}

/// Text delta of one streamed chunk
fn stream_fragment(chunk: &ChatResponse, operation: &str) -> Result<String> {
    if let Some(base) = &chunk.base_resp
        && base.status_code != 0
    {
        return normalize_response(chunk, operation);
    }

    let Some(choice) = chunk.choices.first() else {
        return Ok(String::new());
    };

    let delta = choice
        .delta
        .as_ref()
        .and_then(|d| d.content.clone())
        .unwrap_or_default();

    match choice.finish_reason.as_deref() {
        Some("content_filter" | "sensitive") => Err(SophiaError::ContentBlocked(
            "Content blocked due to safety concerns.".to_string(),
        )),
        Some("length") => {
            warn!(operation, "Streamed response truncated due to length");
            Ok(format!("{}{}", delta, TRUNCATION_NOTE))
        }
        _ => Ok(delta),
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    base_resp: Option<BaseResp>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    delta: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaseResp {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
