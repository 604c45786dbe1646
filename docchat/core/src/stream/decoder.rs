//! Line Framing
//!
//! Turns transport reads into complete text lines. A read may end in the
//! middle of a line (or of a UTF-8 character); the unfinished tail is carried
//! into the next read.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{ready, Stream};

use crate::config::DEFAULT_MAX_LINE_BYTES;

/// Incremental splitter with a carry-over buffer
#[derive(Debug)]
pub struct LineDecoder {
    /// Bytes of the last incomplete line
    carry: Vec<u8>,
    /// Longest line kept before it is dropped
    max_line_bytes: usize,
    /// Set while skipping the rest of an overlong line
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    /// Create a decoder with the default line limit
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    /// Create a decoder that drops lines longer than `max_line_bytes`
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            carry: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    /// Feed one transport read; returns every line it completed, oldest first
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                self.discarding = false;
                self.carry.clear();
                continue;
            }

            if self.carry.len() + head.len() > self.max_line_bytes {
                tracing::warn!(
                    len = self.carry.len() + head.len(),
                    max = self.max_line_bytes,
                    "Dropping overlong stream line"
                );
                self.carry.clear();
                continue;
            }

            self.carry.extend_from_slice(head);
            lines.push(decode_line(&self.carry));
            self.carry.clear();
        }

        if !self.discarding {
            self.carry.extend_from_slice(rest);
            if self.carry.len() > self.max_line_bytes {
                tracing::warn!(
                    len = self.carry.len(),
                    max = self.max_line_bytes,
                    "Dropping overlong stream line"
                );
                self.carry.clear();
                self.discarding = true;
            }
        }

        lines
    }

    /// Bytes held for an unfinished line
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// End of input: drop any unfinished line and return its length
    pub fn finish(&mut self) -> usize {
        let dropped = self.carry.len();
        self.carry.clear();
        self.discarding = false;
        dropped
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Lazy stream of complete lines over a stream of byte chunks
///
/// Transport errors are passed through as `Err` items. At end of input a
/// trailing line without a terminator is discarded.
pub struct LineStream<S> {
    inner: S,
    decoder: LineDecoder,
    ready: VecDeque<String>,
    exhausted: bool,
}

impl<S> LineStream<S> {
    /// Wrap a byte stream with the default line limit
    pub fn new(inner: S) -> Self {
        Self::with_decoder(inner, LineDecoder::new())
    }

    /// Wrap a byte stream with a custom decoder
    pub fn with_decoder(inner: S, decoder: LineDecoder) -> Self {
        Self {
            inner,
            decoder,
            ready: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<S, B, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<String, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let lines = this.decoder.feed(chunk.as_ref());
                    this.ready.extend(lines);
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    this.exhausted = true;
                    let dropped = this.decoder.finish();
                    if dropped > 0 {
                        tracing::debug!(bytes = dropped, "Discarding unterminated final line");
                    }
                }
            }
        }
    }
}
