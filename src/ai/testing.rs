//! Scripted backend for unit tests
//!
//! Each call is answered by a responder closure. Calls go through a real
//! [`RetryExecutor`], so retries, timeouts and request metadata behave as
//! they do against a live provider.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use super::provider::{CompletionRequest, LlmBackend, SharedBackend, TextStream};
use super::retry::{RetryExecutor, RetryPolicy};
use super::timeout::WorkerPool;
use crate::types::{EmbeddingTask, ProviderKind, Result, SophiaError};

type Responder = Box<dyn Fn(&CompletionRequest, u32) -> Result<String> + Send + Sync>;

pub(crate) struct MockBackend {
    kind: ProviderKind,
    model: String,
    responder: Responder,
    executor: RetryExecutor,
    calls: AtomicU32,
    requests: Mutex<Vec<CompletionRequest>>,
    fail_stream_after: Option<usize>,
}

impl MockBackend {
    /// `responder` receives the request and the 0-based call number
    pub fn new<F>(kind: ProviderKind, responder: F) -> Self
    where
        F: Fn(&CompletionRequest, u32) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            kind,
            model: format!("{}-test-model", kind),
            responder: Box::new(responder),
            executor: RetryExecutor::new(
                RetryPolicy::default(),
                WorkerPool::new(4, Duration::from_secs(300)),
            ),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            fail_stream_after: None,
        }
    }

    /// Answers every request with `"{operation} ok"`
    pub fn echo(kind: ProviderKind) -> Self {
        Self::new(kind, |req, _| Ok(format!("{} ok", req.operation)))
    }

    /// Streams fail with a transport error after `fragments` fragments
    pub fn failing_stream_after(mut self, fragments: usize) -> Self {
        self.fail_stream_after = Some(fragments);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, request: &CompletionRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }

    fn respond(&self, request: &CompletionRequest) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(request, n)
    }
}

/// Upcast for constructors that take a trait object
pub(crate) fn as_backend(mock: &Arc<MockBackend>) -> SharedBackend {
    Arc::clone(mock) as SharedBackend
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.record(request);
        self.executor
            .execute(&request.operation, || {
                let outcome = self.respond(request);
                async move { outcome }
            })
            .await
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        self.record(request);
        let text = self
            .executor
            .execute(&request.operation, || {
                let outcome = self.respond(request);
                async move { outcome }
            })
            .await?;

        let mut fragments: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|f| Ok(f.to_string()))
            .collect();
        if let Some(limit) = self.fail_stream_after {
            fragments.truncate(limit);
            fragments.push(Err(SophiaError::api(
                self.kind.as_str(),
                "connection reset mid-stream",
            )));
        }
        Ok(Box::pin(stream::iter(fragments)))
    }

    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
        Ok(vec![text.len() as f32, 1.0])
    }
}
