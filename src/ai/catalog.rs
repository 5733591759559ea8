//! Operation Catalog
//!
//! [`CodeAssistant`] is the single capability interface every provider
//! offers. [`Assistant`] implements it once over any [`LlmBackend`]; the
//! provider-specific parts are the backend itself and the
//! [`PromptProfile`] that shapes prompts and input budgets.
//!
//! Every operation starts by resetting the request metadata to the serving
//! provider, validates its input size before any network call, and returns
//! a typed result.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::fallback;
use super::meta;
use super::prompt::PromptProfile;
use super::provider::{CompletionRequest, SharedBackend, TextStream};
use super::tokenizer::{chunk_text, validate_size};
use crate::constants::limits;
use crate::types::{
    ChatMessage, EmbeddingTask, ProviderKind, Result, SophiaError, Stage, TaskKind,
};

/// AI-backed operations offered by a provider
#[async_trait]
pub trait CodeAssistant: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Model identifier requests are sent with
    fn model(&self) -> &str;

    /// Raw code for a natural-language prompt
    async fn generate_code(&self, prompt: &str) -> Result<String>;

    /// Markdown explanation; oversized inputs may be chunked
    async fn explain_code(&self, code: &str) -> Result<String>;

    async fn format_code(&self, code: &str, language: Option<&str>) -> Result<String>;

    /// Comma-separated lowercase tags, at most five
    async fn suggest_tags(&self, code: &str) -> Result<String>;

    /// Corrected code given the error output it produced
    async fn refine_code(
        &self,
        code: &str,
        error_output: &str,
        language: Option<&str>,
    ) -> Result<String>;

    /// Comma-separated algorithm/data-structure classifications
    async fn classify_solution(&self, code: &str, description: &str) -> Result<String>;

    async fn generate_solution(
        &self,
        title: &str,
        description: &str,
        language: &str,
    ) -> Result<String>;

    async fn explain_solution(&self, code: &str, title: &str, language: &str) -> Result<String>;

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>>;

    async fn chat(&self, preamble: &str, history: &[ChatMessage], message: &str)
    -> Result<String>;

    /// One multi-step stage; `extra` is stage-specific optional input
    async fn run_stage(&self, stage: Stage, input: &str, extra: Option<&str>) -> Result<String>;

    /// Streaming variant of [`CodeAssistant::generate_code`]
    async fn stream_code(&self, prompt: &str) -> Result<TextStream>;

    /// Streaming explanation of already generated code
    async fn stream_explanation(&self, code: &str) -> Result<TextStream>;
}

/// Merge tag lists: split on commas and newlines, lowercase, drop
/// duplicates in first-seen order, keep at most five.
///
/// Tags first seen in a later chunk are dropped once five are collected.
pub fn merge_tags<'a>(results: impl IntoIterator<Item = &'a str>) -> String {
    let mut merged: Vec<String> = Vec::new();
    for result in results {
        for tag in result.split([',', '\n']) {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !merged.contains(&tag) {
                merged.push(tag);
            }
        }
    }
    merged.truncate(limits::MAX_TAGS);
    merged.join(",")
}

/// [`CodeAssistant`] over one backend
#[derive(Clone)]
pub struct Assistant {
    backend: SharedBackend,
    profile: PromptProfile,
    heuristic_fallback: bool,
    model: Option<String>,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("provider", &self.backend.kind())
            .field("profile", &self.profile)
            .field("heuristic_fallback", &self.heuristic_fallback)
            .field("model", &self.model())
            .finish()
    }
}

impl Assistant {
    pub fn new(backend: SharedBackend, profile: PromptProfile) -> Self {
        Self {
            backend,
            profile,
            heuristic_fallback: false,
            model: None,
        }
    }

    /// Answer explanation and tag failures heuristically
    pub fn with_heuristic_fallback(mut self, enabled: bool) -> Self {
        self.heuristic_fallback = enabled;
        self
    }

    /// Copy of this assistant sending requests with `model`
    pub fn with_model(&self, model: Option<String>) -> Self {
        Self {
            model,
            ..self.clone()
        }
    }

    pub fn profile(&self) -> PromptProfile {
        self.profile
    }

    fn begin(&self) {
        meta::begin(self.backend.kind());
    }

    fn prepare(&self, request: CompletionRequest) -> CompletionRequest {
        match &self.model {
            Some(model) => request.with_model(Some(model.clone())),
            None => request,
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let request = self.prepare(request);
        debug!(operation = %request.operation, "Dispatching completion");
        self.backend.complete(&request).await
    }

    async fn explain_parts(&self, code: &str) -> Result<String> {
        let budget = self.profile.explain_budget();
        validate_size(code, budget)?;

        if !self.profile.chunks_large_inputs() {
            return self.complete(self.profile.explain(code, 1, 1)).await;
        }

        let chunks = chunk_text(code, budget);
        if chunks.is_chunked() {
            meta::mark_chunked();
        }

        let total = chunks.len();
        let mut explanations = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            explanations.push(self.complete(self.profile.explain(chunk, i + 1, total)).await?);
        }
        Ok(explanations.join("\n\n"))
    }

    async fn tag_parts(&self, code: &str) -> Result<String> {
        let budget = self.profile.tags_budget();
        validate_size(code, budget)?;

        if !self.profile.chunks_large_inputs() {
            let raw = self.complete(self.profile.suggest_tags(code, 1, 1)).await?;
            return Ok(merge_tags([raw.as_str()]));
        }

        let chunks = chunk_text(code, budget);
        if chunks.is_chunked() {
            meta::mark_chunked();
        }

        let total = chunks.len();
        let mut results = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            results.push(self.complete(self.profile.suggest_tags(chunk, i + 1, total)).await?);
        }
        Ok(merge_tags(results.iter().map(String::as_str)))
    }

    /// Substitute a heuristic answer for a provider failure when enabled
    fn or_heuristic(
        &self,
        result: Result<String>,
        operation: &str,
        heuristic: impl FnOnce() -> String,
    ) -> Result<String> {
        match result {
            Err(err) if self.heuristic_fallback && !matches!(err, SophiaError::InputTooLarge { .. }) => {
                warn!(
                    operation,
                    error = %err,
                    "Falling back to heuristic answer"
                );
                Ok(heuristic())
            }
            other => other,
        }
    }
}

#[async_trait]
impl CodeAssistant for Assistant {
    fn provider(&self) -> ProviderKind {
        self.backend.kind()
    }

    fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.backend.model())
    }

    #[instrument(skip_all, fields(provider = %self.provider()))]
    async fn generate_code(&self, prompt: &str) -> Result<String> {
        self.begin();
        let estimated = validate_size(prompt, max_input(TaskKind::CodeGeneration))?;
        info!(estimated, "Generating code");
        self.complete(self.profile.generate_code(prompt)).await
    }

    #[instrument(skip_all, fields(provider = %self.provider()))]
    async fn explain_code(&self, code: &str) -> Result<String> {
        self.begin();
        let result = self.explain_parts(code).await;
        self.or_heuristic(result, "code explanation", || fallback::explain(code))
    }

    async fn format_code(&self, code: &str, language: Option<&str>) -> Result<String> {
        self.begin();
        validate_size(code, max_input(TaskKind::Formatting))?;
        self.complete(self.profile.format_code(code, language)).await
    }

    #[instrument(skip_all, fields(provider = %self.provider()))]
    async fn suggest_tags(&self, code: &str) -> Result<String> {
        self.begin();
        let result = self.tag_parts(code).await;
        self.or_heuristic(result, "tag suggestion", || fallback::suggest_tags(code))
    }

    async fn refine_code(
        &self,
        code: &str,
        error_output: &str,
        language: Option<&str>,
    ) -> Result<String> {
        self.begin();
        self.complete(self.profile.refine(code, error_output, language))
            .await
    }

    async fn classify_solution(&self, code: &str, description: &str) -> Result<String> {
        self.begin();
        let combined = format!("Description: {}\nSolution: {}", description, code);
        validate_size(&combined, max_input(TaskKind::Classification))?;
        self.complete(self.profile.classify_solution(code, description))
            .await
    }

    async fn generate_solution(
        &self,
        title: &str,
        description: &str,
        language: &str,
    ) -> Result<String> {
        self.begin();
        let combined = format!(
            "Title: {}\nDescription: {}\nLanguage: {}",
            title, description, language
        );
        validate_size(&combined, max_input(TaskKind::SolutionGeneration))?;
        self.complete(self.profile.generate_solution(title, description, language))
            .await
    }

    async fn explain_solution(&self, code: &str, title: &str, language: &str) -> Result<String> {
        self.begin();
        let combined = format!("Title: {}\nSolution: {}\nLanguage: {}", title, code, language);
        validate_size(&combined, max_input(TaskKind::SolutionExplanation))?;
        self.complete(self.profile.explain_solution(code, title, language))
            .await
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        self.begin();
        self.backend.embed(text, task).await
    }

    async fn chat(
        &self,
        preamble: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String> {
        self.begin();
        self.complete(self.profile.chat(preamble, history, message))
            .await
    }

    #[instrument(skip(self, input, extra), fields(provider = %self.provider(), stage = stage.number()))]
    async fn run_stage(&self, stage: Stage, input: &str, extra: Option<&str>) -> Result<String> {
        self.begin();
        self.complete(self.profile.stage(stage, input, extra)).await
    }

    async fn stream_code(&self, prompt: &str) -> Result<TextStream> {
        self.begin();
        validate_size(prompt, max_input(TaskKind::CodeGeneration))?;
        let request = self.prepare(self.profile.generate_code(prompt));
        self.backend.stream(&request).await
    }

    async fn stream_explanation(&self, code: &str) -> Result<TextStream> {
        self.begin();
        validate_size(code, self.profile.explain_budget())?;
        let request = self.prepare(self.profile.explain(code, 1, 1));
        self.backend.stream(&request).await
    }
}

/// Budget of a task that always validates its input
fn max_input(task: TaskKind) -> usize {
    task.max_input_tokens()
        .unwrap_or(crate::constants::tokens::DEFAULT_MAX_INPUT)
}
