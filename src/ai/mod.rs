//! AI Orchestration Core
//!
//! Routes code-assistant operations to one of two LLM providers, enforces
//! size limits, timeouts and retries, and composes operations into
//! multi-step and streaming pipelines.
//!
//! ## Request Path
//!
//! ```text
//! ProviderRouter → CodeAssistant operation → size check / chunking
//!                → RetryExecutor → WorkerPool → LlmBackend → normalize
//! ```

pub mod catalog;
pub mod fallback;
pub mod meta;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod router;
pub mod similarity;
pub mod timeout;
pub mod tokenizer;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{Assistant, CodeAssistant, merge_tags};
pub use meta::RequestMeta;
pub use pipeline::{
    EventKind, EventStream, MultiStepResult, RunStatus, StreamEvent, StreamMode, run_multi_step,
    stream_pipeline,
};
pub use prompt::{PromptBuilder, PromptProfile};
pub use provider::{
    CompletionRequest, GeminiBackend, LlmBackend, MiniMaxBackend, RateLimiter, SharedBackend,
    TextStream, validate_api_key,
};
pub use retry::{RetryExecutor, RetryPolicy};
pub use router::{ModelTiering, ProviderRouter, Route, Routed, TaskTiering, TierEntry};
pub use similarity::cosine_similarity;
pub use timeout::WorkerPool;
pub use tokenizer::{ChunkSet, chunk_text, estimate_tokens, validate_size};
