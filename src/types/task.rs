//! Task and provider type definitions
//!
//! Identifies which backend serves a request, which operation is being run,
//! and which model tier is wanted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::tokens;

// =============================================================================
// Provider Identity
// =============================================================================

/// The two interchangeable LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini
    #[default]
    Gemini,
    /// MiniMax (OpenAI-compatible chat completions)
    MiniMax,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::MiniMax => "minimax",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Multi-step Stages
// =============================================================================

/// Stages of the architect → coder → tester → refiner pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Architecture = 1,
    Coding = 2,
    Testing = 3,
    Refining = 4,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Architecture,
        Stage::Coding,
        Stage::Testing,
        Stage::Refining,
    ];

    /// 1-based stage number
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Coding => "coding",
            Self::Testing => "testing",
            Self::Refining => "refining",
        }
    }

    /// Persona the prompt assigns to this stage
    pub fn persona(self) -> &'static str {
        match self {
            Self::Architecture => "The Architect",
            Self::Coding => "The Coder",
            Self::Testing => "The Tester",
            Self::Refining => "The Refiner",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Task Kinds
// =============================================================================

/// Every operation the catalog offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CodeGeneration,
    Explanation,
    Formatting,
    TagSuggestion,
    Refinement,
    Classification,
    Embedding,
    Chat,
    SolutionGeneration,
    SolutionExplanation,
    MultiStepStage(Stage),
}

impl TaskKind {
    /// Default input budget in estimated tokens, `None` when the
    /// operation performs no size validation
    pub fn max_input_tokens(&self) -> Option<usize> {
        match self {
            Self::CodeGeneration => Some(tokens::GENERATION_MAX_INPUT),
            Self::SolutionGeneration => Some(tokens::SOLUTION_MAX_INPUT),
            Self::Explanation
            | Self::Formatting
            | Self::TagSuggestion
            | Self::Classification
            | Self::SolutionExplanation => Some(tokens::DEFAULT_MAX_INPUT),
            Self::Refinement | Self::Embedding | Self::Chat | Self::MultiStepStage(_) => None,
        }
    }

    /// Key used in the model tiering table
    pub fn tier_key(&self) -> &'static str {
        match self {
            Self::CodeGeneration | Self::SolutionGeneration | Self::Refinement => {
                "code_generation"
            }
            Self::Explanation | Self::SolutionExplanation => "explanation",
            Self::Formatting => "formatting",
            Self::TagSuggestion | Self::Classification => "tagging",
            Self::Embedding => "embedding",
            Self::Chat => "chat",
            Self::MultiStepStage(_) => "multi_step",
        }
    }

    /// Human-readable operation name used in logs and timeout errors
    pub fn label(&self) -> String {
        match self {
            Self::CodeGeneration => "code generation".to_string(),
            Self::Explanation => "code explanation".to_string(),
            Self::Formatting => "code formatting".to_string(),
            Self::TagSuggestion => "tag suggestion".to_string(),
            Self::Refinement => "code refinement".to_string(),
            Self::Classification => "solution classification".to_string(),
            Self::Embedding => "embedding".to_string(),
            Self::Chat => "chat".to_string(),
            Self::SolutionGeneration => "solution generation".to_string(),
            Self::SolutionExplanation => "solution explanation".to_string(),
            Self::MultiStepStage(stage) => {
                format!("multi-step stage {} {}", stage.number(), stage.name())
            }
        }
    }
}

// =============================================================================
// Model Tiers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    #[default]
    Primary,
    Fallback,
    CostOptimized,
}

impl std::str::FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "primary" => Ok(Self::Primary),
            "fallback" => Ok(Self::Fallback),
            "cost_optimized" | "cost" => Ok(Self::CostOptimized),
            _ => Err(format!(
                "Unknown model tier: {}. Valid values: primary, fallback, cost-optimized",
                s
            )),
        }
    }
}

// =============================================================================
// Embedding & Chat Inputs
// =============================================================================

/// Intended use of an embedding vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbeddingTask {
    /// Vector stored alongside a snippet
    #[default]
    RetrievalDocument,
    /// Vector for a search query
    RetrievalQuery,
}

impl EmbeddingTask {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            Self::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
