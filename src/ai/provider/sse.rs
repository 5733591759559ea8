//! Server-Sent Events decoding
//!
//! Both backends stream with `data:` lines. Network chunks do not respect
//! line boundaries, so bytes are buffered until a full line is available.

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream};

use crate::types::{ProviderKind, Result};

use super::transport_error;

/// Marker sent by OpenAI-compatible APIs after the last event
const DONE_MARKER: &str = "[DONE]";

/// Incremental line decoder for `data:` payloads
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every complete `data:` payload
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = self.parse_line(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(&line)
    }

    /// The terminal `[DONE]` marker was seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn parse_line(&mut self, raw: &[u8]) -> Option<String> {
        if self.done {
            return None;
        }
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload == DONE_MARKER {
            self.done = true;
            return None;
        }
        if payload.is_empty() {
            return None;
        }
        Some(payload.to_string())
    }
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a streaming HTTP response into a stream of `data:` payloads
pub(crate) fn data_payloads(
    provider: ProviderKind,
    response: reqwest::Response,
) -> impl Stream<Item = Result<String>> + Send {
    let state = SseState {
        body: response.bytes_stream(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                return Some((Ok(payload), state));
            }
            if state.finished || state.decoder.is_done() {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(&chunk);
                    state.pending.extend(payloads);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(transport_error(provider, e)), state));
                }
                None => {
                    state.finished = true;
                    if let Some(payload) = state.decoder.finish() {
                        state.pending.push_back(payload);
                    }
                }
            }
        }
    })
}
