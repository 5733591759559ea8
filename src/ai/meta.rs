//! Request Metadata
//!
//! Per-request facts shown to the user as advisory banners: whether the call
//! was retried (and how many times), whether the input was chunked, and which
//! provider answered.
//!
//! Metadata lives in a tokio task-local installed by [`scoped`], so concurrent
//! requests never observe each other's values. Recording functions are no-ops
//! outside a scope.

use std::cell::RefCell;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::types::ProviderKind;

/// Snapshot of what happened while serving one request.
///
/// `retry_attempts` is zero whenever `retried` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestMeta {
    pub retried: bool,
    pub retry_attempts: u32,
    pub chunked: bool,
    pub provider: ProviderKind,
}

impl RequestMeta {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Fold in the record of a later step of the same request
    pub fn absorb(&mut self, step: &RequestMeta) {
        self.retried |= step.retried;
        self.retry_attempts += step.retry_attempts;
        self.chunked |= step.chunked;
        self.provider = step.provider;
    }
}

tokio::task_local! {
    static CURRENT: RefCell<RequestMeta>;
}

/// Run `fut` with a fresh metadata record and return it alongside the output
pub async fn scoped<F>(provider: ProviderKind, fut: F) -> (F::Output, RequestMeta)
where
    F: Future,
{
    CURRENT
        .scope(RefCell::new(RequestMeta::new(provider)), async move {
            let output = fut.await;
            let meta = CURRENT.with(|m| *m.borrow());
            (output, meta)
        })
        .await
}

/// Reset the record at the start of an operation
pub fn begin(provider: ProviderKind) {
    let _ = CURRENT.try_with(|m| *m.borrow_mut() = RequestMeta::new(provider));
}

/// Record retries performed by one executor call.
///
/// Retries from several calls in the same request (e.g. one per chunk)
/// accumulate.
pub fn record_retries(retries: u32) {
    if retries == 0 {
        return;
    }
    let _ = CURRENT.try_with(|m| {
        let mut meta = m.borrow_mut();
        meta.retried = true;
        meta.retry_attempts += retries;
    });
}

pub fn mark_chunked() {
    let _ = CURRENT.try_with(|m| m.borrow_mut().chunked = true);
}

/// Current record, if called inside a scope
pub fn current() -> Option<RequestMeta> {
    CURRENT.try_with(|m| *m.borrow()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scoped_collects_updates() {
        let ((), meta) = scoped(ProviderKind::Gemini, async {
            begin(ProviderKind::MiniMax);
            record_retries(1);
            record_retries(2);
            mark_chunked();
        })
        .await;

        assert_eq!(meta.provider, ProviderKind::MiniMax);
        assert!(meta.retried);
        assert_eq!(meta.retry_attempts, 3);
        assert!(meta.chunked);
    }

    #[tokio::test]
    async fn test_begin_resets_previous_values() {
        let ((), meta) = scoped(ProviderKind::Gemini, async {
            record_retries(2);
            mark_chunked();
            begin(ProviderKind::Gemini);
        })
        .await;

        assert_eq!(meta, RequestMeta::new(ProviderKind::Gemini));
    }

    #[tokio::test]
    async fn test_zero_retries_leave_flag_unset() {
        let ((), meta) = scoped(ProviderKind::Gemini, async {
            record_retries(0);
        })
        .await;
        assert!(!meta.retried);
        assert_eq!(meta.retry_attempts, 0);
    }

    #[test]
    fn test_absorb_accumulates_steps() {
        let mut total = RequestMeta::new(ProviderKind::Gemini);
        let mut step = RequestMeta::new(ProviderKind::Gemini);
        step.retried = true;
        step.retry_attempts = 2;
        total.absorb(&step);
        total.absorb(&RequestMeta::new(ProviderKind::Gemini));
        step.retry_attempts = 1;
        total.absorb(&step);

        assert!(total.retried);
        assert_eq!(total.retry_attempts, 3);
        assert!(!total.chunked);
    }

    #[test]
    fn test_outside_scope_is_noop() {
        record_retries(5);
        mark_chunked();
        begin(ProviderKind::MiniMax);
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_scopes_are_isolated() {
        let a = tokio::spawn(scoped(ProviderKind::Gemini, async {
            record_retries(2);
            tokio::task::yield_now().await;
        }));
        let b = tokio::spawn(scoped(ProviderKind::MiniMax, async {
            tokio::task::yield_now().await;
            mark_chunked();
        }));

        let ((), meta_a) = a.await.unwrap();
        let ((), meta_b) = b.await.unwrap();

        assert_eq!(meta_a.retry_attempts, 2);
        assert!(!meta_a.chunked);
        assert_eq!(meta_b.retry_attempts, 0);
        assert!(meta_b.chunked);
        assert_eq!(meta_b.provider, ProviderKind::MiniMax);
    }
}
