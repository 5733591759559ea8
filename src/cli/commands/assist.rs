//! Assistant Commands
//!
//! Single-request operations routed through the provider router.
//!
//! Usage:
//!   sophia generate "reverse a string"
//!   sophia explain --file snippet.py
//!   cat snippet.js | sophia tags
//!   sophia refine --file main.py --error "NameError: x"
//!   sophia solution generate --title "Two Sum" --language python "Given an array..."

use crate::ai::{ProviderRouter, Routed};
use crate::cli::ui::Output;
use crate::types::{ChatMessage, Result};

/// Default chat persona when no preamble is given
pub const DEFAULT_CHAT_PREAMBLE: &str = "You are Sophia, a helpful programming assistant inside a code-snippet manager. \
     Answer concisely and include code examples when they help.";

/// One text-producing operation with its inputs
#[derive(Debug, Clone)]
pub enum Operation {
    Generate {
        prompt: String,
    },
    Explain {
        code: String,
    },
    Format {
        code: String,
        language: Option<String>,
    },
    Tags {
        code: String,
    },
    Refine {
        code: String,
        error_output: String,
        language: Option<String>,
    },
    Classify {
        code: String,
        description: String,
    },
    GenerateSolution {
        title: String,
        description: String,
        language: String,
    },
    ExplainSolution {
        code: String,
        title: String,
        language: String,
    },
    Chat {
        preamble: Option<String>,
        history: Vec<ChatMessage>,
        message: String,
    },
}

/// Dispatch one operation through the router
pub async fn execute(
    router: &ProviderRouter,
    preference: Option<&str>,
    operation: &Operation,
) -> Routed<String> {
    match operation {
        Operation::Generate { prompt } => router.generate_code(preference, prompt).await,
        Operation::Explain { code } => router.explain_code(preference, code).await,
        Operation::Format { code, language } => {
            router
                .format_code(preference, code, language.as_deref())
                .await
        }
        Operation::Tags { code } => router.suggest_tags(preference, code).await,
        Operation::Refine {
            code,
            error_output,
            language,
        } => {
            router
                .refine_code(preference, code, error_output, language.as_deref())
                .await
        }
        Operation::Classify { code, description } => {
            router.classify_solution(preference, code, description).await
        }
        Operation::GenerateSolution {
            title,
            description,
            language,
        } => {
            router
                .generate_solution(preference, title, description, language)
                .await
        }
        Operation::ExplainSolution {
            code,
            title,
            language,
        } => {
            router
                .explain_solution(preference, code, title, language)
                .await
        }
        Operation::Chat {
            preamble,
            history,
            message,
        } => {
            let preamble = preamble.as_deref().unwrap_or(DEFAULT_CHAT_PREAMBLE);
            router.chat(preference, preamble, history, message).await
        }
    }
}

/// Run one operation and print its result
pub async fn run(
    router: &ProviderRouter,
    preference: Option<&str>,
    operation: Operation,
    output: &Output,
) -> Result<()> {
    let Routed { result, meta } = execute(router, preference, &operation).await;
    match result {
        Ok(text) => output.value(&text, &meta),
        Err(err) => {
            output.failure(&err, &meta);
            Err(err)
        }
    }
}
