pub mod error;
pub mod task;

pub use error::{ErrorCategory, ErrorClassifier, Result, SophiaError};
pub use task::{
    ChatMessage, ChatRole, EmbeddingTask, ModelTier, ProviderKind, Stage, TaskKind,
};
