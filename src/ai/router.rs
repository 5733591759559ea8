//! Provider Router
//!
//! Picks the provider for each request from the user's model preference and
//! the secondary provider's availability, then runs the operation inside a
//! fresh request-metadata scope with a panic catch-all.
//!
//! ## Routing
//!
//! - A preference starting with `minimax` selects the secondary provider
//!   when it was built successfully at construction time
//! - Everything else goes to the primary provider
//! - The decision covers the whole request; a multi-step run never switches
//!   provider between stages
//!
//! Secondary availability is decided once in [`ProviderRouter::new`]. A
//! failure there is logged and leaves the router primary-only.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use super::catalog::{Assistant, CodeAssistant};
use super::meta::{self, RequestMeta};
use super::pipeline::{EventStream, MultiStepResult, StreamMode, run_multi_step, stream_pipeline};
use super::prompt::PromptProfile;
use super::provider::{GeminiBackend, MiniMaxBackend};
use super::retry::RetryExecutor;
use crate::config::Config;
use crate::types::{
    ChatMessage, EmbeddingTask, ModelTier, ProviderKind, Result, SophiaError, TaskKind,
};

const SECONDARY_PREFIX: &str = "minimax";
const PRIMARY_PREFIX: &str = "gemini-";

// =============================================================================
// Model Tiering
// =============================================================================

/// One model choice within a task's tier table
#[derive(Debug, Clone, Serialize)]
pub struct TierEntry {
    pub tier: ModelTier,
    pub model: String,
    pub description: &'static str,
    pub cost: &'static str,
    pub speed: &'static str,
}

/// Tier table for one task family of one provider
#[derive(Debug, Clone, Serialize)]
pub struct TaskTiering {
    pub task: &'static str,
    pub entries: Vec<TierEntry>,
}

impl TaskTiering {
    fn model(&self, tier: ModelTier) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.tier == tier)
            .map(|e| e.model.as_str())
    }
}

/// Tier tables of both providers
#[derive(Debug, Clone, Serialize)]
pub struct ModelTiering {
    pub primary: Vec<TaskTiering>,
    pub secondary: Vec<TaskTiering>,
}

impl ModelTiering {
    fn new(secondary_model: &str) -> Self {
        let entry = |tier, model: &str, description, cost, speed| TierEntry {
            tier,
            model: model.to_string(),
            description,
            cost,
            speed,
        };

        let primary = vec![
            TaskTiering {
                task: "code_generation",
                entries: vec![
                    entry(
                        ModelTier::Primary,
                        "gemini-2.5-pro",
                        "High-reasoning model for complex code generation",
                        "medium",
                        "medium",
                    ),
                    entry(
                        ModelTier::Fallback,
                        "gemini-2.5-flash",
                        "Faster fallback model for code generation",
                        "low",
                        "fast",
                    ),
                    entry(
                        ModelTier::CostOptimized,
                        "gemini-2.5-flash-lite",
                        "Most cost-effective model for basic code",
                        "very_low",
                        "very_fast",
                    ),
                ],
            },
            TaskTiering {
                task: "explanation",
                entries: vec![
                    entry(
                        ModelTier::Primary,
                        "gemini-2.5-flash",
                        "Fast model for code explanations",
                        "low",
                        "fast",
                    ),
                    entry(
                        ModelTier::Fallback,
                        "gemini-2.5-flash",
                        "Backup model for explanations",
                        "low",
                        "fast",
                    ),
                    entry(
                        ModelTier::CostOptimized,
                        "gemini-2.5-flash-lite",
                        "Most cost-effective for explanations",
                        "very_low",
                        "very_fast",
                    ),
                ],
            },
        ];

        // The secondary provider serves every tier with its one model
        let secondary = ["code_generation", "explanation"]
            .into_iter()
            .map(|task| TaskTiering {
                task,
                entries: [
                    ModelTier::Primary,
                    ModelTier::Fallback,
                    ModelTier::CostOptimized,
                ]
                .into_iter()
                .map(|tier| entry(tier, secondary_model, "Secondary provider model", "low", "medium"))
                .collect(),
            })
            .collect();

        Self { primary, secondary }
    }

    fn primary_model(&self, task: TaskKind, tier: ModelTier) -> Option<&str> {
        self.primary
            .iter()
            .find(|t| t.task == task.tier_key())
            .and_then(|t| t.model(tier))
    }
}

// =============================================================================
// Routes and Results
// =============================================================================

/// Provider decision for one request
#[derive(Debug, Clone)]
pub struct Route {
    pub provider: ProviderKind,
    pub model: String,
    pub assistant: Assistant,
}

/// Operation result with the metadata of the request that produced it
#[derive(Debug)]
pub struct Routed<T> {
    pub result: Result<T>,
    pub meta: RequestMeta,
}

impl<T> Routed<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

impl Routed<String> {
    /// Text on success, an `"Error: "` message on failure
    pub fn into_display(self) -> String {
        match self.result {
            Ok(text) => text,
            Err(err) => err.user_message(),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Entry point for every AI operation
#[derive(Debug, Clone)]
pub struct ProviderRouter {
    config: Arc<Config>,
    primary: Assistant,
    secondary: Option<Assistant>,
    tiering: Arc<ModelTiering>,
}

impl ProviderRouter {
    /// Build the primary provider and try the secondary.
    ///
    /// Only a failure to build the primary is an error; the secondary is
    /// simply left unavailable.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let executor = RetryExecutor::from_config(&config.ai);

        let primary = Assistant::new(
            Arc::new(GeminiBackend::new(&config.ai, executor.clone())?),
            PromptProfile::Gemini,
        );

        let secondary = if config.ai.secondary.enabled {
            match MiniMaxBackend::new(&config.ai, executor) {
                Ok(backend) => {
                    info!(model = %config.ai.secondary.model, "Secondary provider available");
                    Some(
                        Assistant::new(Arc::new(backend), PromptProfile::MiniMax)
                            .with_heuristic_fallback(config.ai.secondary.heuristic_fallback),
                    )
                }
                Err(err) => {
                    warn!(error = %err, "Secondary provider unavailable, routing to primary only");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::from_parts(config, primary, secondary))
    }

    /// Router over already built assistants
    pub fn from_parts(config: Arc<Config>, primary: Assistant, secondary: Option<Assistant>) -> Self {
        let tiering = Arc::new(ModelTiering::new(&config.ai.secondary.model));
        Self {
            config,
            primary,
            secondary,
            tiering,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn secondary_available(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn tiering(&self) -> &ModelTiering {
        &self.tiering
    }

    fn effective_preference<'a>(&'a self, preference: Option<&'a str>) -> &'a str {
        preference
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.config.ai.default_preference)
    }

    fn selects_secondary(preference: &str) -> bool {
        preference.to_lowercase().starts_with(SECONDARY_PREFIX)
    }

    /// Provider and model serving `task` for this preference
    pub fn resolve(&self, preference: Option<&str>, task: TaskKind) -> Route {
        let model = self.resolve_model(preference, task, ModelTier::Primary);
        let preference = self.effective_preference(preference);

        let (provider, assistant) = match &self.secondary {
            Some(secondary) if Self::selects_secondary(preference) => {
                (ProviderKind::MiniMax, secondary)
            }
            _ => (ProviderKind::Gemini, &self.primary),
        };

        Route {
            provider,
            assistant: assistant.with_model(Some(model.clone())),
            model,
        }
    }

    /// Concrete model identifier for `task` at `tier`.
    ///
    /// The secondary provider always uses its configured model. For the
    /// primary, a concrete model named in the preference wins; otherwise the
    /// tier table decides, falling back to the configured model.
    pub fn resolve_model(&self, preference: Option<&str>, task: TaskKind, tier: ModelTier) -> String {
        let preference = self.effective_preference(preference);

        if let Some(secondary) = &self.secondary
            && Self::selects_secondary(preference)
        {
            return secondary.model().to_string();
        }

        if preference.to_lowercase().starts_with(PRIMARY_PREFIX) {
            return preference.to_string();
        }

        self.tiering
            .primary_model(task, tier)
            .unwrap_or_else(|| self.primary.model())
            .to_string()
    }

    /// Run `op` on the routed assistant inside a fresh metadata scope
    async fn dispatch<T, F, Fut>(&self, preference: Option<&str>, task: TaskKind, op: F) -> Routed<T>
    where
        F: FnOnce(Assistant) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let route = self.resolve(preference, task);
        let provider = route.provider;
        info!(%provider, model = %route.model, task = %task.label(), "Routing request");

        let guarded = AssertUnwindSafe(op(route.assistant)).catch_unwind();
        let (outcome, meta) = meta::scoped(provider, guarded).await;

        let result = outcome.unwrap_or_else(|payload| {
            let err = SophiaError::from_panic(payload.as_ref());
            error!(%provider, task = %task.label(), error = %err, "Operation panicked");
            Err(err)
        });

        Routed { result, meta }
    }

    pub async fn generate_code(&self, preference: Option<&str>, prompt: &str) -> Routed<String> {
        self.dispatch(preference, TaskKind::CodeGeneration, |a| async move {
            a.generate_code(prompt).await
        })
        .await
    }

    pub async fn explain_code(&self, preference: Option<&str>, code: &str) -> Routed<String> {
        self.dispatch(preference, TaskKind::Explanation, |a| async move {
            a.explain_code(code).await
        })
        .await
    }

    pub async fn format_code(
        &self,
        preference: Option<&str>,
        code: &str,
        language: Option<&str>,
    ) -> Routed<String> {
        self.dispatch(preference, TaskKind::Formatting, |a| async move {
            a.format_code(code, language).await
        })
        .await
    }

    pub async fn suggest_tags(&self, preference: Option<&str>, code: &str) -> Routed<String> {
        self.dispatch(preference, TaskKind::TagSuggestion, |a| async move {
            a.suggest_tags(code).await
        })
        .await
    }

    pub async fn refine_code(
        &self,
        preference: Option<&str>,
        code: &str,
        error_output: &str,
        language: Option<&str>,
    ) -> Routed<String> {
        self.dispatch(preference, TaskKind::Refinement, |a| async move {
            a.refine_code(code, error_output, language).await
        })
        .await
    }

    pub async fn classify_solution(
        &self,
        preference: Option<&str>,
        code: &str,
        description: &str,
    ) -> Routed<String> {
        self.dispatch(preference, TaskKind::Classification, |a| async move {
            a.classify_solution(code, description).await
        })
        .await
    }

    pub async fn generate_solution(
        &self,
        preference: Option<&str>,
        title: &str,
        description: &str,
        language: &str,
    ) -> Routed<String> {
        self.dispatch(preference, TaskKind::SolutionGeneration, |a| async move {
            a.generate_solution(title, description, language).await
        })
        .await
    }

    pub async fn explain_solution(
        &self,
        preference: Option<&str>,
        code: &str,
        title: &str,
        language: &str,
    ) -> Routed<String> {
        self.dispatch(preference, TaskKind::SolutionExplanation, |a| async move {
            a.explain_solution(code, title, language).await
        })
        .await
    }

    pub async fn embed(
        &self,
        preference: Option<&str>,
        text: &str,
        task: EmbeddingTask,
    ) -> Routed<Vec<f32>> {
        self.dispatch(preference, TaskKind::Embedding, |a| async move {
            a.embed(text, task).await
        })
        .await
    }

    pub async fn chat(
        &self,
        preference: Option<&str>,
        preamble: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Routed<String> {
        self.dispatch(preference, TaskKind::Chat, |a| async move {
            a.chat(preamble, history, message).await
        })
        .await
    }

    /// Four-stage solver; the provider is chosen once for all stages
    pub async fn run_multi_step(
        &self,
        preference: Option<&str>,
        problem: &str,
        test_cases: Option<&str>,
        complexity_hints: Option<&str>,
    ) -> Routed<MultiStepResult> {
        let task = TaskKind::MultiStepStage(crate::types::Stage::Architecture);
        self.dispatch(preference, task, |a| async move {
            Ok(run_multi_step(&a, problem, test_cases, complexity_hints).await)
        })
        .await
    }

    /// Lazy stream of code (and optionally explanation) fragments.
    ///
    /// Each step runs under its own metadata scope and panic guard inside
    /// the pipeline; a panic ends the stream with an `Error` event.
    pub fn stream(&self, preference: Option<&str>, prompt: &str, mode: StreamMode) -> EventStream {
        let route = self.resolve(preference, TaskKind::CodeGeneration);
        info!(provider = %route.provider, model = %route.model, ?mode, "Starting stream");
        stream_pipeline(route.assistant, prompt.to_string(), mode)
    }
}
