//! CLI Common Utilities
//!
//! Shared initialization and input handling for command handlers.

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::ProviderRouter;
use crate::config::{Config, ConfigLoader};
use crate::types::{ChatMessage, Result, SophiaError};

/// Command execution context
///
/// Loaded once per invocation: the merged configuration and a router
/// built from it.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Arc<Config>,
    pub router: ProviderRouter,
}

impl CommandContext {
    pub fn load() -> Result<Self> {
        let config = Arc::new(ConfigLoader::load()?);
        let router = ProviderRouter::new(Arc::clone(&config))?;
        Ok(Self { config, router })
    }
}

/// Input text from the argument, a file, or stdin, in that order
pub fn read_input(text: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }

    if let Some(path) = file {
        return Ok(std::fs::read_to_string(path)?);
    }

    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(SophiaError::Config(
            "No input given. Pass text, --file, or pipe input on stdin.".to_string(),
        ));
    }

    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Optional text from an inline value or a file
pub fn read_optional(text: Option<String>, file: Option<PathBuf>) -> Result<Option<String>> {
    match (text, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => Ok(Some(std::fs::read_to_string(path)?)),
        (None, None) => Ok(None),
    }
}

/// Chat history stored as a JSON array of `{ "role", "content" }` turns
pub fn read_history(path: Option<&Path>) -> Result<Vec<ChatMessage>> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(Vec::new()),
    }
}
