//! Google Gemini Backend
//!
//! Primary provider using the Gemini REST API:
//! - `models/{model}:generateContent` for completions
//! - `models/{model}:streamGenerateContent?alt=sse` for streaming
//! - `models/{embedding_model}:embedContent` for embeddings
//!
//! Every terminal condition Gemini reports is classified in
//! [`normalize_response`]; operations never inspect raw responses.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{
    CompletionRequest, LlmBackend, TextStream, build_http_client, decode_error, resolve_key, sse,
    transport_error,
};
use crate::ai::retry::RetryExecutor;
use crate::config::AiConfig;
use crate::constants::TRUNCATION_NOTE;
use crate::types::{ChatRole, EmbeddingTask, ProviderKind, Result, SophiaError};

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const PROVIDER: ProviderKind = ProviderKind::Gemini;

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini backend with secure API key handling
pub struct GeminiBackend {
    /// Key from configuration; the environment is consulted per call when unset
    configured_key: Option<Arc<SecretString>>,
    api_base: String,
    model: String,
    embedding_model: String,
    client: reqwest::Client,
    executor: RetryExecutor,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(config: &AiConfig, executor: RetryExecutor) -> Result<Self> {
        let primary = &config.primary;
        Ok(Self {
            configured_key: primary
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| Arc::new(SecretString::from(k.to_string()))),
            api_base: primary.api_base.trim_end_matches('/').to_string(),
            model: primary.model.clone(),
            embedding_model: primary.embedding_model.clone(),
            client: build_http_client(config.request_timeout())?,
            executor,
        })
    }

    /// Resolve the API key for this call
    fn credential(&self) -> Result<Arc<SecretString>> {
        if let Some(key) = &self.configured_key {
            return Ok(Arc::clone(key));
        }
        resolve_key(None, GEMINI_API_KEY_ENV)
            .map(|k| Arc::new(SecretString::from(k)))
            .ok_or_else(|| {
                SophiaError::Config(format!("{} is not configured.", GEMINI_API_KEY_ENV))
            })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    /// POST `body` through the retry executor and return the raw response
    async fn post<B>(
        &self,
        operation: &str,
        url: String,
        body: Arc<B>,
    ) -> Result<reqwest::Response>
    where
        B: Serialize + Send + Sync + 'static,
    {
        let key = self.credential()?;
        self.executor
            .execute(operation, || {
                let client = self.client.clone();
                let url = url.clone();
                let key = Arc::clone(&key);
                let body = Arc::clone(&body);
                async move { send(client, url, key, body).await }
            })
            .await
    }

    async fn post_json<B, T>(&self, operation: &str, url: String, body: Arc<B>) -> Result<T>
    where
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
    {
        let key = self.credential()?;
        self.executor
            .execute(operation, || {
                let client = self.client.clone();
                let url = url.clone();
                let key = Arc::clone(&key);
                let body = Arc::clone(&body);
                async move {
                    let response = send(client, url, key, body).await?;
                    response
                        .json::<T>()
                        .await
                        .map_err(|e| decode_error(PROVIDER, e))
                }
            })
            .await
    }
}

/// Send one HTTP attempt and map non-success statuses to provider errors
async fn send<B: Serialize>(
    client: reqwest::Client,
    url: String,
    key: Arc<SecretString>,
    body: Arc<B>,
) -> Result<reqwest::Response> {
    let response = client
        .post(&url)
        .header("x-goog-api-key", key.expose_secret())
        .header("Content-Type", "application/json")
        .json(body.as_ref())
        .send()
        .await
        .map_err(|e| transport_error(PROVIDER, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or(text);
    Err(SophiaError::http(
        PROVIDER.as_str(),
        status.as_u16(),
        format!("Gemini API error {}: {}", status.as_u16(), detail),
    ))
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        info!(
            operation = %request.operation,
            model,
            temperature = request.temperature,
            "Generating with Gemini"
        );

        let url = self.model_url(model, "generateContent");
        let body = Arc::new(build_request(request));
        let response: GenerateResponse = self.post_json(&request.operation, url, body).await?;

        normalize_response(&response, &request.operation)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        info!(operation = %request.operation, model, "Streaming with Gemini");

        let url = format!("{}?alt=sse", self.model_url(model, "streamGenerateContent"));
        let body = Arc::new(build_request(request));
        let response = self.post(&request.operation, url, body).await?;

        let operation = request.operation.clone();
        let fragments = sse::data_payloads(PROVIDER, response).filter_map(move |payload| {
            let result = payload.and_then(|raw| {
                let chunk: GenerateResponse = serde_json::from_str(&raw).map_err(|e| {
                    SophiaError::MalformedResponse(format!("Invalid Gemini stream event: {}", e))
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

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        debug!(model = %self.embedding_model, task = task.as_api_str(), "Embedding with Gemini");

        let url = self.model_url(&self.embedding_model, "embedContent");
        let body = Arc::new(EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content::text(None, text),
            task_type: task.as_api_str(),
        });
        let response: EmbedResponse = self.post_json("embedding", url, body).await?;

        match response.embedding {
            Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
            _ => {
                error!("Unexpected embedding response shape");
                Err(SophiaError::MalformedResponse(
                    "Unexpected embedding response shape.".to_string(),
                ))
            }
        }
    }
}

// =============================================================================
// Request Building
// =============================================================================

fn build_request(request: &CompletionRequest) -> GenerateRequest {
    let contents = request
        .messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            Content::text(Some(role), &m.content)
        })
        .collect();

    GenerateRequest {
        contents,
        system_instruction: request.system.as_deref().map(|s| Content::text(None, s)),
        generation_config: GenerationConfig {
            temperature: request.temperature,
            top_p: 1.0,
            top_k: 32,
            max_output_tokens: request.max_output_tokens,
        },
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
    }
}

// =============================================================================
// Response Normalization
// =============================================================================

/// Classify a Gemini response into text or a typed failure
///
/// - prompt blocked → `ContentBlocked` naming the reason
/// - no candidates → `EmptyResponse`
/// - `STOP` → text
/// - `MAX_TOKENS` → text plus a truncation note (degraded success)
/// - `SAFETY` and other block reasons → `ContentBlocked` listing the
///   non-negligible categories
/// - `RECITATION`, `OTHER` → `GenerationStopped`
/// - anything else → text if present, else `MalformedResponse`
pub(crate) fn normalize_response(response: &GenerateResponse, operation: &str) -> Result<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
        .filter(|r| !r.is_empty() && *r != "BLOCK_REASON_UNSPECIFIED")
    {
        error!(operation, reason, "Gemini blocked the prompt");
        return Err(SophiaError::ContentBlocked(format!(
            "Input blocked by API. Reason: {}",
            reason
        )));
    }

    let Some(candidate) = response.candidates.first() else {
        error!(operation, "Gemini returned no candidates");
        return Err(SophiaError::EmptyResponse(
            "The API returned no response candidates.".to_string(),
        ));
    };

    let text = candidate.text();
    let text = text.trim();

    match candidate.finish_reason.as_deref() {
        Some("STOP") => {
            if text.is_empty() {
                error!(operation, "Gemini finished without content");
                Err(SophiaError::EmptyResponse(
                    "API completed but returned no content.".to_string(),
                ))
            } else {
                Ok(text.to_string())
            }
        }
        Some("MAX_TOKENS") => {
            if text.is_empty() {
                error!(operation, "Gemini hit the output limit without content");
                Err(SophiaError::EmptyResponse(
                    "Output exceeded maximum length and no content was generated.".to_string(),
                ))
            } else {
                warn!(operation, "Response truncated due to MAX_TOKENS");
                Ok(format!("{}{}", text, TRUNCATION_NOTE))
            }
        }
        Some("SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII") => {
            let reasons: Vec<String> = candidate
                .safety_ratings
                .iter()
                .filter(|r| r.probability != "NEGLIGIBLE")
                .map(|r| format!("{}: {}", r.category, r.probability))
                .collect();
            error!(operation, categories = ?reasons, "Gemini blocked the response");
            if reasons.is_empty() {
                Err(SophiaError::ContentBlocked(
                    "Content blocked due to safety concerns.".to_string(),
                ))
            } else {
                Err(SophiaError::ContentBlocked(format!(
                    "Content blocked due to safety concerns: {}",
                    reasons.join(", ")
                )))
            }
        }
        Some("RECITATION") => {
            error!(operation, "Gemini stopped for recitation");
            Err(SophiaError::GenerationStopped(
                "Content blocked due to recitation detection.".to_string(),
            ))
        }
        Some("OTHER") => {
            error!(operation, "Gemini stopped for an unspecified reason");
            Err(SophiaError::GenerationStopped(
                "Generation stopped for unknown reason.".to_string(),
            ))
        }
        other => {
            warn!(operation, finish_reason = ?other, "Unknown Gemini finish reason");
            if text.is_empty() {
                Err(SophiaError::MalformedResponse(
                    "Unexpected API response format.".to_string(),
                ))
            } else {
                Ok(text.to_string())
            }
        }
    }
}

/// Text of one streamed chunk
///
/// Intermediate chunks carry no finish reason. Terminal conditions other
/// than a normal stop go through [`normalize_response`].
fn stream_fragment(chunk: &GenerateResponse, operation: &str) -> Result<String> {
    let blocked = chunk
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
        .is_some_and(|r| !r.is_empty() && r != "BLOCK_REASON_UNSPECIFIED");

    let Some(candidate) = chunk.candidates.first() else {
        return if blocked {
            normalize_response(chunk, operation)
        } else {
            Ok(String::new())
        };
    };

    match candidate.finish_reason.as_deref() {
        _ if blocked => normalize_response(chunk, operation),
        None | Some("STOP") => Ok(candidate.text()),
        Some("MAX_TOKENS") if !candidate.text().is_empty() => {
            warn!(operation, "Streamed response truncated due to MAX_TOKENS");
            Ok(format!("{}{}", candidate.text(), TRUNCATION_NOTE))
        }
        Some("MAX_TOKENS") => Ok(TRUNCATION_NOTE.to_string()),
        Some(_) => normalize_response(chunk, operation),
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(String::from),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

impl Candidate {
    /// Concatenated text of all parts
    fn text(&self) -> String {
        self.content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct SafetyRating {
    category: String,
    probability: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ErrorCategory};
    use serde_json::json;

    fn response(value: serde_json::Value) -> GenerateResponse {
        serde_json::from_value(value).unwrap()
    }

    fn candidate(text: &str, finish_reason: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": finish_reason
            }]
        })
    }

    #[test]
    fn test_normal_completion() {
        let result = normalize_response(&response(candidate("  fn main() {}\n", "STOP")), "test");
        assert_eq!(result.unwrap(), "fn main() {}");
    }

    #[test]
    fn test_multiple_parts_are_joined() {
        let resp = response(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "fn a() {}" }, { "text": "\nfn b() {}" }] },
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(normalize_response(&resp, "test").unwrap(), "fn a() {}\nfn b() {}");
    }

    #[test]
    fn test_truncated_is_degraded_success() {
        let result = normalize_response(&response(candidate("partial", "MAX_TOKENS")), "test");
        assert_eq!(
            result.unwrap(),
            "partial\n\n[Note: Response may be incomplete due to length limits]"
        );
    }

    #[test]
    fn test_truncated_without_content_fails() {
        let err = normalize_response(&response(candidate("", "MAX_TOKENS")), "test").unwrap_err();
        assert!(matches!(err, SophiaError::EmptyResponse(_)));
    }

    #[test]
    fn test_stop_without_content_fails() {
        let err = normalize_response(&response(candidate("   ", "STOP")), "test").unwrap_err();
        assert_eq!(err.to_string(), "API completed but returned no content.");
    }

    #[test]
    fn test_prompt_block_reason() {
        let resp = response(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }));
        let err = normalize_response(&resp, "test").unwrap_err();
        assert_eq!(err.to_string(), "Input blocked by API. Reason: SAFETY");
        assert_eq!(err.category(), ErrorCategory::ContentPolicy);
    }

    #[test]
    fn test_unspecified_block_reason_is_ignored() {
        let mut value = candidate("ok", "STOP");
        value["promptFeedback"] = json!({ "blockReason": "BLOCK_REASON_UNSPECIFIED" });
        assert_eq!(normalize_response(&response(value), "test").unwrap(), "ok");
    }

    #[test]
    fn test_no_candidates() {
        let err = normalize_response(&response(json!({})), "test").unwrap_err();
        assert_eq!(err.to_string(), "The API returned no response candidates.");
    }

    #[test]
    fn test_safety_block_lists_categories() {
        let resp = response(json!({
            "candidates": [{
                "finishReason": "SAFETY",
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE" },
                    { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH" },
                    { "category": "HARM_CATEGORY_HATE_SPEECH", "probability": "MEDIUM" }
                ]
            }]
        }));
        let err = normalize_response(&resp, "test").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Content blocked due to safety concerns: HARM_CATEGORY_DANGEROUS_CONTENT: HIGH, HARM_CATEGORY_HATE_SPEECH: MEDIUM"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_safety_block_without_ratings() {
        let err = normalize_response(&response(candidate("", "SAFETY")), "test").unwrap_err();
        assert_eq!(err.to_string(), "Content blocked due to safety concerns.");
    }

    #[test]
    fn test_recitation_and_other_stop() {
        let err = normalize_response(&response(candidate("x", "RECITATION")), "test").unwrap_err();
        assert!(matches!(err, SophiaError::GenerationStopped(_)));

        let err = normalize_response(&response(candidate("x", "OTHER")), "test").unwrap_err();
        assert_eq!(err.to_string(), "Generation stopped for unknown reason.");
    }

    #[test]
    fn test_unknown_finish_reason_best_effort() {
        let ok = normalize_response(&response(candidate("text", "FINISH_REASON_NEW")), "test");
        assert_eq!(ok.unwrap(), "text");

        let err = normalize_response(&response(candidate("", "FINISH_REASON_NEW")), "test");
        assert!(matches!(err, Err(SophiaError::MalformedResponse(_))));
    }

    #[test]
    fn test_stream_fragments() {
        let mid = response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "fn " }] } }]
        }));
        assert_eq!(stream_fragment(&mid, "test").unwrap(), "fn ");

        let end = response(candidate("main", "STOP"));
        assert_eq!(stream_fragment(&end, "test").unwrap(), "main");

        let usage_only = response(json!({ "usageMetadata": { "totalTokenCount": 10 } }));
        assert_eq!(stream_fragment(&usage_only, "test").unwrap(), "");

        let blocked = response(candidate("", "SAFETY"));
        assert!(stream_fragment(&blocked, "test").is_err());
    }

    #[test]
    fn test_build_request_maps_roles() {
        let request = CompletionRequest::conversation(
            "chat",
            vec![
                ChatMessage::user("preamble"),
                ChatMessage::assistant("earlier answer"),
                ChatMessage::user("question"),
            ],
        )
        .with_system("be brief")
        .with_temperature(0.2)
        .with_max_output_tokens(512);

        let body = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "question");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
        assert_eq!(body["safetySettings"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["safetySettings"][0]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn test_build_request_omits_unset_fields() {
        let request = CompletionRequest::new("code generation", "prompt");
        let body = serde_json::to_value(build_request(&request)).unwrap();
        assert!(body.get("systemInstruction").is_none());
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut config = AiConfig::default();
        config.primary.api_key = Some("gemini-secret-value-123".to_string());
        let backend = GeminiBackend::new(&config, RetryExecutor::default()).unwrap();
        let debug = format!("{:?}", backend);
        assert!(!debug.contains("gemini-secret-value-123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_configured_key_wins() {
        let mut config = AiConfig::default();
        config.primary.api_key = Some("configured-gemini-key".to_string());
        let backend = GeminiBackend::new(&config, RetryExecutor::default()).unwrap();
        let key = backend.credential().unwrap();
        assert_eq!(key.expose_secret(), "configured-gemini-key");
    }
}
