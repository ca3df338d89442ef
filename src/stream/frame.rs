//! Incremental splitter for the upstream event stream.
//!
//! Upstream bytes arrive in arbitrary chunks. [`FrameParser`] accumulates them
//! and cuts a [`Frame`] off the front of its buffer every time a blank-line
//! delimiter (`\n\n` or `\r\n\r\n`) is complete, however the delimiter was
//! split across reads.
use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;
use std::sync::LazyLock;

/// Longest delimiter (`\r\n\r\n`). A partial delimiter can hide in at most
/// `MAX_DELIMITER_LEN - 1` trailing bytes of the buffer.
const MAX_DELIMITER_LEN: usize = 4;

/// One blank-line-delimited unit of the upstream stream, delimiter excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Bytes,
}

impl Frame {
    #[must_use]
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.raw
    }
}

/// Incremental frame parser.
///
/// Feed it raw chunks in arrival order and it yields every frame completed so
/// far. Bytes that do not yet form a complete frame stay buffered for the
/// next call; nothing is dropped or duplicated across calls.
pub struct FrameParser {
    buffer: BytesMut,
    scan_from: usize,
}

impl FrameParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
        }
    }

    /// Feed one chunk and return the frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one chunk and append the frames it completed to `out`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<Frame>) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some((start, len)) = find_frame_delimiter_from(&self.buffer, self.scan_from) {
            let raw = self.buffer.split_to(start).freeze();
            self.buffer.advance(len);
            self.scan_from = 0;
            out.push(Frame { raw });
        }

        // Everything before this point is known delimiter-free; only a short
        // overlap needs rescanning once more bytes arrive.
        self.scan_from = self.buffer.len().saturating_sub(MAX_DELIMITER_LEN - 1);
    }

    /// Drain the undelimited tail at end-of-stream.
    ///
    /// Returns `None` when the tail is empty or whitespace only.
    pub fn finish(&mut self) -> Option<Frame> {
        self.scan_from = 0;
        if self.buffer.trim_ascii().is_empty() {
            self.buffer.clear();
            return None;
        }
        Some(Frame {
            raw: self.buffer.split().freeze(),
        })
    }

    /// Bytes received but not yet resolved into a frame.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the earliest frame delimiter at or after `scan_from`.
///
/// Returns `(delimiter_start, delimiter_len)`.
#[inline]
fn find_frame_delimiter_from(buffer: &[u8], scan_from: usize) -> Option<(usize, usize)> {
    static LF_LF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\n\n"));
    static CRLF_CRLF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\r\n\r\n"));

    let scan_from = scan_from.min(buffer.len());
    let haystack = &buffer[scan_from..];
    let lf_lf_pos = LF_LF_FINDER.find(haystack).map(|rel| scan_from + rel);
    let crlf_crlf_pos = CRLF_CRLF_FINDER.find(haystack).map(|rel| scan_from + rel);

    match (lf_lf_pos, crlf_crlf_pos) {
        (Some(lf_pos), Some(crlf_pos)) if crlf_pos < lf_pos => Some((crlf_pos, 4)),
        (Some(lf_pos), _) => Some((lf_pos, 2)),
        (None, Some(crlf_pos)) => Some((crlf_pos, 4)),
        (None, None) => None,
    }
}
