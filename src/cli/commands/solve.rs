//! Solve Command
//!
//! Runs the four-stage solver and prints every completed stage.
//!
//! Usage:
//!   sophia solve --file problem.md [--test-cases "..."] [--complexity "O(n)"]

use console::style;

use crate::ai::{MultiStepResult, ProviderRouter, Routed, RunStatus};
use crate::cli::ui::Output;
use crate::types::{Result, Stage};

pub async fn run(
    router: &ProviderRouter,
    preference: Option<&str>,
    problem: &str,
    test_cases: Option<&str>,
    complexity_hints: Option<&str>,
    output: &Output,
) -> Result<()> {
    if !output.is_json() {
        output.info("Running architect → coder → tester → refiner");
    }

    let Routed { result, meta } = router
        .run_multi_step(preference, problem, test_cases, complexity_hints)
        .await;

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            output.failure(&err, &meta);
            return Err(err);
        }
    };

    if output.is_json() {
        let body = serde_json::json!({ "result": result, "meta": meta });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        output.banners(&meta);
        print_stages(&result, output);
    }

    match result.failure() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn print_stages(result: &MultiStepResult, output: &Output) {
    for stage in Stage::ALL {
        if let Some(text) = result.output(stage) {
            output.section(&format!(
                "Layer {}: {} ({})",
                stage.number(),
                stage.persona(),
                stage.name()
            ));
            println!("{}", text);
        }
    }

    match result.status {
        RunStatus::Completed => output.success(&format!(
            "Completed in {:.1}s",
            result.processing_time
        )),
        RunStatus::Error => {
            let stage = result.layer.unwrap_or_default();
            output.error(&format!(
                "Stage {} failed after {:.1}s: {}",
                style(stage).bold(),
                result.processing_time,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
        RunStatus::Processing => {}
    }
}
