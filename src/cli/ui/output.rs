use console::style;
use serde::Serialize;

use crate::ai::RequestMeta;
use crate::types::SophiaError;

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        eprintln!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Advisory banners for one request, printed to stderr
    pub fn banners(&self, meta: &RequestMeta) {
        if meta.retried {
            self.warning(&format!(
                "The AI service was busy; the request succeeded after {} retr{}.",
                meta.retry_attempts,
                if meta.retry_attempts == 1 { "y" } else { "ies" }
            ));
        }
        if meta.chunked {
            self.info("Input was large and was processed in several parts.");
        }
        self.info(&format!("Served by {}", style(meta.provider).cyan()));
    }

    /// Print a result value, as JSON with its metadata when requested
    pub fn value<T: Serialize + std::fmt::Display>(
        &self,
        value: &T,
        meta: &RequestMeta,
    ) -> crate::types::Result<()> {
        if self.json {
            let body = serde_json::json!({ "result": value, "meta": meta });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            self.banners(meta);
            println!("{}", value);
        }
        Ok(())
    }

    /// Print a failure; the error is still returned to the caller
    pub fn failure(&self, err: &SophiaError, meta: &RequestMeta) {
        if self.json {
            let body = serde_json::json!({
                "error": err.user_message(),
                "category": err.category().to_string(),
                "meta": meta,
            });
            // Serializing a json! value cannot fail
            println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        } else {
            self.banners(meta);
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new(false)
    }
}
