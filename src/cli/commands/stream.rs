//! Stream Command
//!
//! Prints generated code as it arrives, then (chained) its explanation.
//!
//! Usage:
//!   sophia stream "binary search in rust" [--code-only] [--json]

use std::io::Write;

use futures::StreamExt;

use crate::ai::{EventKind, ProviderRouter, StreamMode};
use crate::cli::ui::Output;
use crate::types::{Result, SophiaError};

pub async fn run(
    router: &ProviderRouter,
    preference: Option<&str>,
    prompt: &str,
    mode: StreamMode,
    output: &Output,
) -> Result<()> {
    let mut events = router.stream(preference, prompt, mode);
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        if output.is_json() {
            // One JSON object per line
            println!("{}", serde_json::to_string(&event)?);
            if event.kind == EventKind::Error {
                return Err(SophiaError::Internal(event.fragment));
            }
            continue;
        }

        match event.kind {
            EventKind::CodeChunk | EventKind::ExplanationChunk => {
                write!(stdout, "{}", event.fragment)?;
                stdout.flush()?;
            }
            EventKind::CodeComplete => {
                println!();
                match mode {
                    StreamMode::Chained => output.section("Explanation"),
                    StreamMode::Code => {
                        if let Some(meta) = &event.meta {
                            output.banners(meta);
                        }
                    }
                }
            }
            EventKind::ExplanationComplete => {
                println!();
                if let Some(meta) = &event.meta {
                    output.banners(meta);
                }
            }
            EventKind::Error => {
                println!();
                if let Some(meta) = &event.meta {
                    output.banners(meta);
                }
                output.error(&event.fragment);
                return Err(SophiaError::Internal(format!(
                    "stream ended after {} fragment(s)",
                    event.index
                )));
            }
        }
    }

    Ok(())
}
