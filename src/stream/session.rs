//! One streaming relay: upstream bytes in, downstream SSE events out.
//!
//! A [`RelaySession`] owns the per-request parse state and the output queue.
//! [`relay_stream`] drives it from the upstream byte stream and yields the
//! encoded events in order. Dropping the returned stream (the client went
//! away) drops the upstream stream with it, which cancels the provider call.
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;
use std::fmt;
use std::time::Instant;

use crate::error::RelayError;
use crate::observability::session_metrics::{log_session_complete, SessionCounters};

use super::frame::{Frame, FrameParser};
use super::sse::{done_frame, fragment_frame};
use super::translate::{translate_frame, IgnoreReason, Translation};

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Response headers sent, no upstream bytes seen yet.
    Open,
    Streaming,
    Closed(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Provider sent its end-of-stream marker.
    Terminal,
    /// Upstream finished without a marker; one was synthesized.
    UpstreamEnded,
    /// Upstream transport failed mid-stream; the body was cut short.
    UpstreamError,
    /// Downstream client went away before the session closed.
    ClientDisconnected,
}

impl CloseReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Terminal => "terminal",
            Self::UpstreamEnded => "upstream_ended",
            Self::UpstreamError => "upstream_error",
            Self::ClientDisconnected => "client_disconnected",
        }
    }
}

struct PendingBytes {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingBytes {
    #[inline]
    fn new() -> Self {
        Self {
            chunks: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn push(&mut self, chunk: Bytes) {
        self.chunks.push(chunk);
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }
}

/// Parse and translation state for one streaming request.
pub struct RelaySession {
    parser: FrameParser,
    frames: Vec<Frame>,
    pending: PendingBytes,
    state: SessionState,
    counters: SessionCounters,
    span: tracing::Span,
    started: Instant,
}

impl RelaySession {
    #[must_use]
    pub fn new(span: tracing::Span) -> Self {
        Self {
            parser: FrameParser::new(),
            frames: Vec::with_capacity(8),
            pending: PendingBytes::new(),
            state: SessionState::Open,
            counters: SessionCounters::default(),
            span,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed(_))
    }

    /// Next encoded event ready for the client.
    #[inline]
    pub fn next_output(&mut self) -> Option<Bytes> {
        self.pending.pop_front()
    }

    /// Process one upstream chunk. No-op once closed.
    pub fn on_chunk(&mut self, chunk: &[u8]) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Streaming;

        let mut frames = std::mem::take(&mut self.frames);
        self.parser.feed_into(chunk, &mut frames);
        for frame in frames.drain(..) {
            self.on_frame(&frame);
            if self.is_closed() {
                break;
            }
        }
        frames.clear();
        self.frames = frames;
    }

    /// Upstream finished. Flushes a trailing frame that lacked its delimiter,
    /// then synthesizes the terminal event if the provider never sent one.
    pub fn on_upstream_end(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Some(frame) = self.parser.finish() {
            self.on_frame(&frame);
        }
        if !self.is_closed() {
            self.pending.push(done_frame());
            self.close(CloseReason::UpstreamEnded);
        }
    }

    /// Upstream transport failed. Nothing further is written, not even the
    /// terminal event, so the client can tell the stream was cut short.
    pub fn on_upstream_error(&mut self, err: &dyn fmt::Display) {
        if self.is_closed() {
            return;
        }
        {
            let err = RelayError::MidStreamTransport(err.to_string());
            let _enter = self.span.enter();
            tracing::warn!(error = %err, "closing relay without terminal event");
        }
        self.close(CloseReason::UpstreamError);
    }

    fn on_frame(&mut self, frame: &Frame) {
        match translate_frame(frame) {
            Translation::Fragment(text) => {
                let encoded = fragment_frame(&text);
                self.counters.record_fragment(encoded.len());
                self.pending.push(encoded);
            }
            Translation::Terminal => {
                let encoded = done_frame();
                self.counters.bytes_forwarded += encoded.len() as u64;
                self.pending.push(encoded);
                self.close(CloseReason::Terminal);
            }
            Translation::Ignored(reason) => {
                self.counters.ignored += 1;
                let _enter = self.span.enter();
                match reason {
                    IgnoreReason::ProviderError(message) => {
                        tracing::warn!(message = %message, "provider reported an error in stream");
                    }
                    IgnoreReason::Malformed => {
                        tracing::debug!(
                            frame_len = frame.raw().len(),
                            "skipping malformed stream frame"
                        );
                    }
                    other => {
                        tracing::trace!(reason = other.as_str(), "skipping stream frame");
                    }
                }
            }
        }
    }

    fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Closed(reason);
        let _enter = self.span.enter();
        log_session_complete(reason.as_str(), &self.counters, self.started.elapsed());
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close(CloseReason::ClientDisconnected);
        }
    }
}

/// Drive `session` from `upstream` and yield downstream SSE bytes.
///
/// The upstream stream is dropped as soon as the session closes, and at the
/// latest when the returned stream is dropped.
pub fn relay_stream<S, E>(upstream: S, session: RelaySession) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        (Some(Box::pin(upstream)), session),
        |(mut upstream, mut session)| async move {
            loop {
                if let Some(chunk) = session.next_output() {
                    return Some((chunk, (upstream, session)));
                }
                let source = upstream.as_mut()?;
                match source.next().await {
                    Some(Ok(chunk)) => session.on_chunk(&chunk),
                    Some(Err(err)) => session.on_upstream_error(&err),
                    None => session.on_upstream_end(),
                }
                if session.is_closed() {
                    upstream = None;
                }
            }
        },
    )
}
