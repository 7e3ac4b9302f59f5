//! Incremental decoder for `data:`-framed event streams
//!
//! Providers stream completions as newline-delimited lines of the form
//! `data: {json}`, ending with `data: [DONE]`. Network chunks split lines
//! at arbitrary byte offsets (including inside multi-byte characters), so
//! the decoder buffers raw bytes and only decodes complete lines.

#[cfg(test)]
mod proptests;

use serde_json::Value;
use std::sync::Arc;

/// End-of-stream sentinel payload
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// Pulls the text delta out of one decoded event payload
pub trait DeltaExtractor {
    fn extract_delta(&self, payload: &Value) -> Option<String>;
}

impl<T: DeltaExtractor + ?Sized> DeltaExtractor for &T {
    fn extract_delta(&self, payload: &Value) -> Option<String> {
        (**self).extract_delta(payload)
    }
}

impl<T: DeltaExtractor + ?Sized> DeltaExtractor for Arc<T> {
    fn extract_delta(&self, payload: &Value) -> Option<String> {
        (**self).extract_delta(payload)
    }
}

/// `choices[0].delta.content`, the chat-completions shape
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletionDeltas;

impl DeltaExtractor for ChatCompletionDeltas {
    fn extract_delta(&self, payload: &Value) -> Option<String> {
        payload
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

/// Byte-buffering line decoder
#[derive(Debug)]
pub struct SseDecoder<E> {
    extractor: E,
    buffer: Vec<u8>,
    done: bool,
}

impl<E: DeltaExtractor> SseDecoder<E> {
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Feed one network chunk; returns the non-empty deltas it completed.
    ///
    /// After the `[DONE]` sentinel everything is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = self.buffer[start..end].to_vec();
            start = end + 1;
            self.decode_line(&line, &mut deltas);
            if self.done {
                self.buffer.clear();
                return deltas;
            }
        }
        self.buffer.drain(..start);
        deltas
    }

    /// Signal end of input; decodes a trailing line that had no newline
    pub fn finish(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        if !self.done {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut deltas);
            self.done = true;
        }
        self.buffer.clear();
        deltas
    }

    /// Whether the sentinel was seen or input finished
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, raw: &[u8], deltas: &mut Vec<String>) {
        let Ok(line) = std::str::from_utf8(raw) else {
            tracing::debug!(len = raw.len(), "Dropping non-UTF-8 stream line");
            return;
        };
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            tracing::trace!(line, "Ignoring non-data stream line");
            return;
        };
        let data = data.trim_start();

        if data == DONE_SENTINEL {
            self.done = true;
            return;
        }
        if !data.starts_with('{') && !data.starts_with('[') {
            tracing::trace!(data, "Ignoring non-JSON data line");
            return;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(payload) => {
                if let Some(delta) = self.extractor.extract_delta(&payload) {
                    if !delta.is_empty() {
                        deltas.push(delta);
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "Dropping malformed stream event"),
        }
    }
}
