//! Prompt Builder System
//!
//! Standardized prompt construction for every catalog operation.
//! Prompts share one layout:
//!
//! 1. **Instructions**: role and rules, sent as the system prompt when the
//!    provider profile splits system and user text
//! 2. **Fields**: one-line hints such as `Language: python`
//! 3. **Blocks**: labelled inputs, fenced when they hold code
//! 4. **Cue**: the trailing label the model continues from
//!
//! Operation templates live in [`templates`].

mod templates;

pub use templates::truncate_chars;

use crate::ai::provider::CompletionRequest;

/// How a provider expects instructions to be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptProfile {
    /// Instructions and input in one user prompt, full-size inputs
    Gemini,
    /// Instructions as the system prompt, reduced budgets for explain/tags
    MiniMax,
}

/// Prompt section types
#[derive(Debug, Clone)]
enum PromptSection {
    /// Free text paragraph
    Text(String),
    /// Intro line followed by a numbered list
    Numbered { intro: String, items: Vec<String> },
    /// `Label: value` line glued to the section after it
    Field { label: String, value: String },
    /// Header followed by fenced content
    Code { header: String, content: String },
    /// Header followed by raw content
    Labeled { header: String, content: String },
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add text section
    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text(content.to_string()));
        self
    }

    /// Add an intro line with numbered items
    pub fn numbered(mut self, intro: &str, items: &[&str]) -> Self {
        self.sections.push(PromptSection::Numbered {
            intro: intro.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Add a `Label: value` hint; skipped when `value` is absent or blank
    pub fn field(mut self, label: &str, value: Option<&str>) -> Self {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.sections.push(PromptSection::Field {
                label: label.to_string(),
                value: value.to_string(),
            });
        }
        self
    }

    /// Add fenced code under a header
    pub fn code(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Code {
            header: header.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Add unfenced content under a header; skipped when absent or blank
    pub fn labeled(mut self, header: &str, content: Option<&str>) -> Self {
        if let Some(content) = content.filter(|c| !c.trim().is_empty()) {
            self.sections.push(PromptSection::Labeled {
                header: header.to_string(),
                content: content.to_string(),
            });
        }
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.sections.len());
        let mut prefix = String::new();

        for section in self.sections {
            let rendered = match section {
                PromptSection::Field { label, value } => {
                    prefix.push_str(&format!("{}: {}\n", label, value));
                    continue;
                }
                PromptSection::Text(content) => content,
                PromptSection::Numbered { intro, items } => {
                    let mut out = intro;
                    for (i, item) in items.iter().enumerate() {
                        out.push_str(&format!("\n{}. {}", i + 1, item));
                    }
                    out
                }
                PromptSection::Code { header, content } => {
                    format!("{}:\n```\n{}\n```", header, content)
                }
                PromptSection::Labeled { header, content } => {
                    format!("{}:\n{}", header, content)
                }
            };
            parts.push(format!("{}{}", std::mem::take(&mut prefix), rendered));
        }

        if !prefix.is_empty() {
            parts.push(prefix.trim_end().to_string());
        }

        parts.join("\n\n")
    }
}

impl PromptProfile {
    /// Combine instructions and input the way this profile expects
    pub(crate) fn request(
        &self,
        operation: impl Into<String>,
        instructions: String,
        input: String,
    ) -> CompletionRequest {
        match self {
            Self::Gemini => {
                CompletionRequest::new(operation, format!("{}\n\n{}", instructions, input))
            }
            Self::MiniMax => CompletionRequest::new(operation, input).with_system(instructions),
        }
    }
}
