//! Sophia - AI Core for a Code-Snippet Manager
//!
//! Generation, explanation, formatting, tagging and multi-step solving of
//! code snippets on top of two interchangeable LLM providers.
//!
//! ## Core Features
//!
//! - **Provider Routing**: Gemini primary, MiniMax secondary by user preference
//! - **Uniform Results**: Typed errors and degraded-success normalization
//! - **Resilience**: Per-call timeouts, retries with backoff and jitter
//! - **Chunking**: Oversized explanation/tag inputs split into overlapping windows
//! - **Pipelines**: Four-stage solver and chained code → explanation streaming
//! - **Request Metadata**: Retry/chunking/provider facts scoped to each request
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sophia::{ConfigLoader, ProviderRouter};
//!
//! let config = Arc::new(ConfigLoader::load()?);
//! let router = ProviderRouter::new(config)?;
//! let routed = router.generate_code(Some("gemini-2.5-pro"), "reverse a string").await;
//! if routed.meta.retried {
//!     eprintln!("retried {} time(s)", routed.meta.retry_attempts);
//! }
//! println!("{}", routed.into_display());
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: Router, operation catalog, providers, pipelines
//! - [`config`]: Layered configuration
//! - [`types`]: Error type and task vocabulary
//! - [`cli`]: Command handlers for the `sophia` binary

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{AiConfig, Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, Result, SophiaError};

// Task vocabulary
pub use types::{ChatMessage, EmbeddingTask, ModelTier, ProviderKind, Stage, TaskKind};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    // Catalog
    Assistant,
    CodeAssistant,
    // Pipelines
    EventKind,
    MultiStepResult,
    // Router
    ProviderRouter,
    RequestMeta,
    Routed,
    StreamEvent,
    StreamMode,
};
