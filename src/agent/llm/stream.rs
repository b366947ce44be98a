//! Stream framing helpers shared by provider clients.
//!
//! - [`LineBuffer`] reassembles newline-delimited lines from arbitrary byte
//!   chunks (NDJSON, SSE).
//! - [`SseDecoder`] extracts `data:` payloads from an event stream and stops
//!   at the `[DONE]` sentinel.
//! - [`split_words`] re-splits a complete response for simulated streaming.

use std::pin::Pin;

use futures_util::Stream;

use crate::Result;

/// Incremental text stream produced by a provider.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Box a text stream, pinning its item type to `Result<String>`.
pub fn boxed(stream: impl Stream<Item = Result<String>> + Send + 'static) -> ChunkStream {
    Box::pin(stream)
}

const DONE_SENTINEL: &str = "[DONE]";

/// Reassembles complete lines from a byte stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every line completed by them, without terminators.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Flush a trailing line that never saw its newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(decode_line(&line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    line.strip_suffix('\r').unwrap_or(&line).to_string()
}

/// Server-Sent-Events decoder yielding `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineBuffer,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns the data payloads completed by them.
    ///
    /// Comment lines (`: keep-alive`), other fields, and blank separators are
    /// dropped. Nothing is returned once `[DONE]` has been seen.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let lines = self.lines.push(bytes);
        self.collect(lines)
    }

    /// Flush a trailing unterminated line at end of stream.
    pub fn finish(&mut self) -> Vec<String> {
        let lines: Vec<String> = self.lines.finish().into_iter().collect();
        self.collect(lines)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn collect(&mut self, lines: Vec<String>) -> Vec<String> {
        let mut payloads = Vec::new();
        for line in lines {
            if self.done {
                break;
            }
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_SENTINEL {
                self.done = true;
                break;
            }
            payloads.push(data.to_string());
        }
        payloads
    }
}

/// Split `text` into words, each carrying the whitespace that follows it.
///
/// Leading whitespace is kept on the first fragment, so concatenating the
/// fragments reproduces `text` exactly.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_separator = false;

    for c in text.chars() {
        if c.is_whitespace() {
            in_separator = true;
        } else if in_separator && current.chars().any(|c| !c.is_whitespace()) {
            words.push(std::mem::take(&mut current));
            in_separator = false;
        } else {
            in_separator = false;
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}
