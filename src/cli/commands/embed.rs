//! Embed Command
//!
//! Usage:
//!   sophia embed "binary search in rust"
//!   sophia embed --task query "sorting" --compare "quicksort implementation"

use crate::ai::{ProviderRouter, Routed, cosine_similarity};
use crate::cli::ui::Output;
use crate::types::{EmbeddingTask, Result};

pub async fn run(
    router: &ProviderRouter,
    preference: Option<&str>,
    text: &str,
    task: EmbeddingTask,
    compare: Option<&str>,
    output: &Output,
) -> Result<()> {
    let Routed { result, meta } = router.embed(preference, text, task).await;
    let vector = match result {
        Ok(vector) => vector,
        Err(err) => {
            output.failure(&err, &meta);
            return Err(err);
        }
    };

    let Some(other) = compare else {
        if output.is_json() {
            let body = serde_json::json!({ "embedding": vector, "meta": meta });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            output.banners(&meta);
            output.success(&format!("{} dimensions", vector.len()));
            println!("{}", serde_json::to_string(&vector)?);
        }
        return Ok(());
    };

    let Routed { result, meta } = router.embed(preference, other, task).await;
    match result {
        Ok(other_vector) => {
            let similarity = cosine_similarity(&vector, &other_vector);
            output.value(&format!("{:.4}", similarity), &meta)
        }
        Err(err) => {
            output.failure(&err, &meta);
            Err(err)
        }
    }
}
