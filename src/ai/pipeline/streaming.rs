//! Streaming Pipeline
//!
//! Lazily turns provider text streams into [`StreamEvent`]s in arrival
//! order. In chained mode the code stream runs to completion first, then the
//! explanation stream is started over the generated code alone; the
//! original prompt is not sent again.
//!
//! An `Error` event is always the last event, including when a provider call
//! panics. Dropping the stream drops the underlying HTTP body and nothing else
//! is sent upstream.
//!
//! Every step runs inside its own request-metadata scope; the accumulated
//! record rides on completion and error events.

use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::ai::catalog::CodeAssistant;
use crate::ai::meta::{self, RequestMeta};
use crate::ai::provider::TextStream;
use crate::types::SophiaError;

/// Stream of pipeline events
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CodeChunk,
    CodeComplete,
    ExplanationChunk,
    ExplanationComplete,
    Error,
}

/// One step of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// New text in this event; empty for completion events
    pub fragment: String,
    /// Everything received so far in the current phase
    pub accumulated: String,
    /// Running fragment counter within the current phase
    pub index: usize,
    /// Request metadata so far; set on completion and error events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

impl StreamEvent {
    /// Completion and error events close a phase
    pub fn closes_phase(&self) -> bool {
        !matches!(self.kind, EventKind::CodeChunk | EventKind::ExplanationChunk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Code generation only
    Code,
    /// Code generation, then an explanation of the generated code
    Chained,
}

enum Phase {
    StartCode(String),
    Code(TextStream),
    StartExplanation(String),
    Explanation(TextStream),
    Done,
}

struct PipelineState<A> {
    assistant: A,
    mode: StreamMode,
    phase: Phase,
    accumulated: String,
    index: usize,
    meta: RequestMeta,
}

impl<A> PipelineState<A> {
    fn event(&mut self, kind: EventKind, fragment: String) -> StreamEvent {
        if matches!(kind, EventKind::CodeChunk | EventKind::ExplanationChunk) {
            self.accumulated.push_str(&fragment);
            self.index += 1;
        }
        StreamEvent {
            kind,
            fragment,
            accumulated: self.accumulated.clone(),
            index: self.index,
            meta: None,
        }
    }

    fn fail(&mut self, err: SophiaError) -> StreamEvent {
        warn!(error = %err, "Streaming pipeline failed");
        self.phase = Phase::Done;
        self.event(EventKind::Error, err.user_message())
    }

    /// Close the current phase and reset the per-phase counters
    fn complete(&mut self, kind: EventKind) -> StreamEvent {
        let event = self.event(kind, String::new());
        self.accumulated.clear();
        self.index = 0;
        event
    }
}

/// Start the streaming pipeline for `prompt`
pub fn stream_pipeline<A>(assistant: A, prompt: String, mode: StreamMode) -> EventStream
where
    A: CodeAssistant + 'static,
{
    let provider = assistant.provider();
    let state = PipelineState {
        assistant,
        mode,
        phase: Phase::StartCode(prompt),
        accumulated: String::new(),
        index: 0,
        meta: RequestMeta::new(provider),
    };

    Box::pin(stream::unfold(state, move |mut state| async move {
        if matches!(state.phase, Phase::Done) {
            return None;
        }

        let guarded = AssertUnwindSafe(advance(&mut state)).catch_unwind();
        let (outcome, step_meta) = meta::scoped(provider, guarded).await;
        state.meta.absorb(&step_meta);

        let mut event = match outcome {
            Ok(event) => event?,
            Err(payload) => {
                let err = SophiaError::from_panic(payload.as_ref());
                error!(%provider, error = %err, "Streaming step panicked");
                state.fail(err)
            }
        };
        if event.closes_phase() {
            event.meta = Some(state.meta);
        }
        Some((event, state))
    }))
}

/// Drive the pipeline until it yields the next event
async fn advance<A: CodeAssistant>(state: &mut PipelineState<A>) -> Option<StreamEvent> {
    loop {
        match std::mem::replace(&mut state.phase, Phase::Done) {
            Phase::StartCode(prompt) => match state.assistant.stream_code(&prompt).await {
                Ok(fragments) => state.phase = Phase::Code(fragments),
                Err(err) => return Some(state.fail(err)),
            },
            Phase::Code(mut fragments) => match fragments.next().await {
                Some(Ok(fragment)) => {
                    state.phase = Phase::Code(fragments);
                    return Some(state.event(EventKind::CodeChunk, fragment));
                }
                Some(Err(err)) => return Some(state.fail(err)),
                None => {
                    debug!(fragments = state.index, "Code stream complete");
                    if state.mode == StreamMode::Chained {
                        state.phase = Phase::StartExplanation(state.accumulated.clone());
                    }
                    return Some(state.complete(EventKind::CodeComplete));
                }
            },
            Phase::StartExplanation(code) => {
                match state.assistant.stream_explanation(&code).await {
                    Ok(fragments) => state.phase = Phase::Explanation(fragments),
                    Err(err) => return Some(state.fail(err)),
                }
            }
            Phase::Explanation(mut fragments) => match fragments.next().await {
                Some(Ok(fragment)) => {
                    state.phase = Phase::Explanation(fragments);
                    return Some(state.event(EventKind::ExplanationChunk, fragment));
                }
                Some(Err(err)) => return Some(state.fail(err)),
                None => {
                    debug!(fragments = state.index, "Explanation stream complete");
                    return Some(state.complete(EventKind::ExplanationComplete));
                }
            },
            Phase::Done => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::catalog::Assistant;
    use crate::ai::prompt::PromptProfile;
    use crate::ai::testing::{MockBackend, as_backend};
    use crate::types::ProviderKind;

    fn responder(req: &crate::ai::provider::CompletionRequest, _: u32) -> crate::types::Result<String> {
        if req.operation == "code generation" {
            Ok("fn add(a, b) { a + b }".to_string())
        } else {
            Ok("Adds two numbers.".to_string())
        }
    }

    async fn collect(stream: EventStream) -> Vec<StreamEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_code_only_stream() {
        let mock = MockBackend::new(ProviderKind::Gemini, responder).shared();
        let assistant = Assistant::new(as_backend(&mock), PromptProfile::Gemini);

        let events = collect(stream_pipeline(assistant, "add".to_string(), StreamMode::Code)).await;

        let (last, chunks) = events.split_last().unwrap();
        assert!(chunks.iter().all(|e| e.kind == EventKind::CodeChunk));
        assert_eq!(chunks.len(), 7);
        assert_eq!(chunks[0].index, 1);
        assert_eq!(chunks[0].fragment, "fn ");
        assert_eq!(last.kind, EventKind::CodeComplete);
        assert_eq!(last.accumulated, "fn add(a, b) { a + b }");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_chained_stream_explains_generated_code_only() {
        let mock = MockBackend::new(ProviderKind::Gemini, responder).shared();
        let assistant = Assistant::new(as_backend(&mock), PromptProfile::Gemini);

        let events = collect(stream_pipeline(
            assistant,
            "SECRET PROMPT".to_string(),
            StreamMode::Chained,
        ))
        .await;

        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        let code_complete = kinds
            .iter()
            .position(|k| *k == EventKind::CodeComplete)
            .unwrap();
        assert!(kinds[..code_complete].iter().all(|k| *k == EventKind::CodeChunk));
        assert!(
            kinds[code_complete + 1..kinds.len() - 1]
                .iter()
                .all(|k| *k == EventKind::ExplanationChunk)
        );
        assert_eq!(kinds.last(), Some(&EventKind::ExplanationComplete));

        let explanation = &events[code_complete + 1];
        assert_eq!(explanation.index, 1);
        assert_eq!(explanation.accumulated, "Adds ");
        assert_eq!(events.last().unwrap().accumulated, "Adds two numbers.");

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        let explain_input = requests[1]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<String>();
        assert!(explain_input.contains("fn add(a, b) { a + b }"));
        assert!(!explain_input.contains("SECRET PROMPT"));
    }

    #[tokio::test]
    async fn test_error_terminates_chain() {
        let mock = MockBackend::new(ProviderKind::Gemini, responder)
            .failing_stream_after(2)
            .shared();
        let assistant = Assistant::new(as_backend(&mock), PromptProfile::Gemini);

        let events = collect(stream_pipeline(
            assistant,
            "add".to_string(),
            StreamMode::Chained,
        ))
        .await;

        assert_eq!(events.len(), 3);
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert!(last.fragment.starts_with("Error: "));
        assert_eq!(last.accumulated, "fn add(a, ");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_panicking_backend_yields_error_event() {
        let mock = MockBackend::new(ProviderKind::Gemini, |_, _| panic!("stream exploded")).shared();
        let assistant = Assistant::new(as_backend(&mock), PromptProfile::Gemini);

        let events = tokio::spawn(collect(stream_pipeline(
            assistant,
            "add".to_string(),
            StreamMode::Chained,
        )))
        .await
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert!(events[0].fragment.contains("stream exploded"));
        assert_eq!(events[0].meta.unwrap().provider, ProviderKind::Gemini);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_recorded_across_phases() {
        let mock = MockBackend::new(ProviderKind::Gemini, |req, n| match n {
            0 => Err(SophiaError::http("gemini", 503, "Service Unavailable")),
            _ => responder(req, n),
        })
        .shared();
        let assistant = Assistant::new(as_backend(&mock), PromptProfile::Gemini);

        let events = collect(stream_pipeline(
            assistant,
            "add".to_string(),
            StreamMode::Chained,
        ))
        .await;

        assert!(events.iter().filter(|e| !e.closes_phase()).all(|e| e.meta.is_none()));
        let code_meta = events
            .iter()
            .find(|e| e.kind == EventKind::CodeComplete)
            .and_then(|e| e.meta)
            .unwrap();
        assert!(code_meta.retried);
        assert_eq!(code_meta.retry_attempts, 1);

        let final_meta = events.last().unwrap().meta.unwrap();
        assert_eq!(events.last().unwrap().kind, EventKind::ExplanationComplete);
        assert_eq!(final_meta.retry_attempts, 1);
        assert_eq!(final_meta.provider, ProviderKind::Gemini);
    }

    #[tokio::test]
    async fn test_oversized_prompt_yields_single_error() {
        let mock = MockBackend::new(ProviderKind::Gemini, responder).shared();
        let assistant = Assistant::new(as_backend(&mock), PromptProfile::Gemini);

        let events = collect(stream_pipeline(
            assistant,
            "x".repeat(900_000),
            StreamMode::Chained,
        ))
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = StreamEvent {
            kind: EventKind::CodeChunk,
            fragment: "fn".to_string(),
            accumulated: "fn".to_string(),
            index: 1,
            meta: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "code_chunk");
        assert_eq!(json["index"], 1);
        assert!(json.get("meta").is_none());
    }
}
