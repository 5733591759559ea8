//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/sophia/config.toml)
//! 3. Project config (.sophia/config.toml)
//! 4. Environment variables (SOPHIA_*, GEMINI_API_KEY, MINIMAX_API_KEY)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::{ConfigLoader, TIMEOUT_OVERRIDE_ENV};
pub use types::*;
