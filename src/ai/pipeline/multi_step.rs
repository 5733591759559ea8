//! Multi-Step Solver
//!
//! Four strictly sequential stages, each one catalog call whose full output
//! is the sole input of the next:
//!
//! 1. **Architecture**: problem analysis and plan
//! 2. **Coding**: implementation of the plan
//! 3. **Testing**: verification report, optionally with supplied test cases
//! 4. **Refining**: final code, optionally guided by complexity hints
//!
//! The first failing stage ends the run. The result keeps the outputs of
//! every earlier stage and none of the later ones. Stages are not retried
//! here; each call already goes through the retry executor.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::ai::catalog::CodeAssistant;
use crate::types::{SophiaError, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Processing,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }
}

/// Outputs and outcome of one multi-step run
///
/// Serialized for the caller to persist; stage outputs that were never
/// produced are omitted entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStepResult {
    pub id: Uuid,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_code: Option<String>,
    /// Number of the failing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock seconds from entry to exit
    pub processing_time: f64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MultiStepResult {
    fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Processing,
            layer1: None,
            layer2: None,
            layer3: None,
            layer4: None,
            final_code: None,
            layer: None,
            error: None,
            processing_time: 0.0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Output of `stage`, if it completed
    pub fn output(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Architecture => self.layer1.as_deref(),
            Stage::Coding => self.layer2.as_deref(),
            Stage::Testing => self.layer3.as_deref(),
            Stage::Refining => self.layer4.as_deref(),
        }
    }

    fn set_output(&mut self, stage: Stage, text: String) {
        let slot = match stage {
            Stage::Architecture => &mut self.layer1,
            Stage::Coding => &mut self.layer2,
            Stage::Testing => &mut self.layer3,
            Stage::Refining => &mut self.layer4,
        };
        *slot = Some(text);
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Failure as a typed error, if the run failed
    pub fn failure(&self) -> Option<SophiaError> {
        let stage = self.layer?;
        let name = Stage::ALL
            .iter()
            .find(|s| s.number() == stage)
            .map(|s| s.name())
            .unwrap_or("unknown");
        Some(SophiaError::pipeline(
            stage,
            name,
            self.error.clone().unwrap_or_default(),
        ))
    }

    fn finish(&mut self, status: RunStatus, started: Instant) {
        self.status = status;
        self.processing_time = started.elapsed().as_secs_f64();
        self.completed_at = Some(Utc::now());
    }
}

/// Run all four stages against one assistant
#[instrument(skip_all, fields(provider = %assistant.provider()))]
pub async fn run_multi_step<A>(
    assistant: &A,
    problem: &str,
    test_cases: Option<&str>,
    complexity_hints: Option<&str>,
) -> MultiStepResult
where
    A: CodeAssistant + ?Sized,
{
    let started = Instant::now();
    let mut result = MultiStepResult::start();
    let mut input = problem.to_string();

    for stage in Stage::ALL {
        let extra = match stage {
            Stage::Testing => test_cases,
            Stage::Refining => complexity_hints,
            _ => None,
        };

        info!(stage = stage.number(), name = stage.name(), "Running stage");
        match assistant.run_stage(stage, &input, extra).await {
            Ok(output) => {
                result.set_output(stage, output.clone());
                input = output;
            }
            Err(err) => {
                warn!(
                    stage = stage.number(),
                    name = stage.name(),
                    error = %err,
                    "Stage failed, stopping pipeline"
                );
                result.layer = Some(stage.number());
                result.error = Some(err.to_string());
                result.finish(RunStatus::Error, started);
                return result;
            }
        }
    }

    result.final_code = result.layer4.clone();
    result.finish(RunStatus::Completed, started);
    info!(
        elapsed_secs = format!("{:.1}", result.processing_time),
        "Multi-step pipeline completed"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::catalog::Assistant;
    use crate::ai::prompt::PromptProfile;
    use crate::ai::testing::{MockBackend, as_backend};
    use crate::types::{ProviderKind, TaskKind};

    /// Assistant whose stage `fail_at` fails; other stages echo their label
    fn assistant(fail_at: Option<Stage>) -> (Assistant, std::sync::Arc<MockBackend>) {
        let mock = MockBackend::new(ProviderKind::Gemini, move |req, _| {
            match fail_at {
                Some(stage) if req.operation == TaskKind::MultiStepStage(stage).label() => {
                    Err(SophiaError::ContentBlocked("blocked at stage".to_string()))
                }
                _ => Ok(format!("output of {}", req.operation)),
            }
        })
        .shared();
        (Assistant::new(as_backend(&mock), PromptProfile::Gemini), mock)
    }

    #[tokio::test]
    async fn test_all_stages_complete() {
        let (assistant, mock) = assistant(None);
        let result = run_multi_step(&assistant, "two sum", Some("[1,2] -> 3"), None).await;

        assert!(result.is_completed());
        assert_eq!(mock.calls(), 4);
        for stage in Stage::ALL {
            assert!(result.output(stage).is_some());
        }
        assert_eq!(result.final_code, result.layer4);
        assert!(result.layer.is_none());
        assert!(result.failure().is_none());
        assert!(result.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_stage_output_feeds_next_stage() {
        let (assistant, mock) = assistant(None);
        run_multi_step(&assistant, "reverse a list", Some("CASES"), Some("HINTS")).await;

        let requests = mock.requests();
        let text = |i: usize| requests[i].messages.last().map(|m| m.content.clone()).unwrap_or_default();

        assert!(text(0).contains("reverse a list"));
        assert!(text(1).contains(&TaskKind::MultiStepStage(Stage::Architecture).label()));
        assert!(!text(1).contains("reverse a list"));
        assert!(text(2).contains("CASES"));
        assert!(text(3).contains("HINTS"));
    }

    #[tokio::test]
    async fn test_short_circuit_at_each_stage() {
        for failing in Stage::ALL {
            let (assistant, mock) = assistant(Some(failing));
            let result = run_multi_step(&assistant, "problem", None, None).await;

            assert_eq!(result.status, RunStatus::Error);
            assert_eq!(result.layer, Some(failing.number()));
            assert_eq!(mock.calls(), failing.number() as u32);
            for stage in Stage::ALL {
                assert_eq!(
                    result.output(stage).is_some(),
                    stage.number() < failing.number(),
                    "stage {} after failure at {}",
                    stage.number(),
                    failing.number()
                );
            }
            assert!(result.final_code.is_none());
        }
    }

    #[tokio::test]
    async fn test_coding_failure_serialization() {
        let (assistant, _) = assistant(Some(Stage::Coding));
        let result = run_multi_step(&assistant, "problem", None, None).await;

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["layer"], 2);
        assert_eq!(json["status"], "error");
        assert!(json["layer1"].is_string());
        for key in ["layer2", "layer3", "layer4", "final_code"] {
            assert!(json.get(key).is_none(), "unexpected key {}", key);
        }
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .contains("blocked at stage")
        );

        match result.failure() {
            Some(SophiaError::Pipeline { stage, stage_name, .. }) => {
                assert_eq!(stage, 2);
                assert_eq!(stage_name, Stage::Coding.name());
            }
            other => panic!("expected pipeline error, got {:?}", other),
        }
    }
}
