//! Classification of upstream frames.
use crate::protocol::StreamChunk;

use super::frame::Frame;

/// Payload the provider sends as its end-of-stream marker.
pub const TERMINAL_MARKER: &[u8] = b"[DONE]";

const DATA_FIELD: &[u8] = b"data:";

/// What a single upstream frame means for the downstream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Non-empty incremental text to forward.
    Fragment(String),
    /// End-of-stream marker.
    Terminal,
    /// Nothing to forward.
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `:`-prefixed keep-alive line.
    Comment,
    /// Not a `data:` frame (e.g. a bare `event:` or `id:` block).
    Unrecognized,
    /// `data:` payload that is not valid JSON of the chunk shape.
    Malformed,
    /// Valid chunk without incremental text (role preamble, finish reason).
    NoContent,
    /// Provider embedded an error object in the stream.
    ProviderError(String),
}

impl IgnoreReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Unrecognized => "unrecognized",
            Self::Malformed => "malformed",
            Self::NoContent => "no_content",
            Self::ProviderError(_) => "provider_error",
        }
    }
}

/// Classify one frame. Never fails; anything unusable maps to
/// [`Translation::Ignored`].
#[must_use]
pub fn translate_frame(frame: &Frame) -> Translation {
    let raw = frame.raw();
    if carries_terminal_marker(raw) {
        return Translation::Terminal;
    }

    // A stray extra newline upstream shows up as leading whitespace here.
    let raw = raw.trim_ascii_start();
    if raw.starts_with(b":") {
        return Translation::Ignored(IgnoreReason::Comment);
    }
    let Some(payload) = raw.strip_prefix(DATA_FIELD) else {
        return Translation::Ignored(IgnoreReason::Unrecognized);
    };

    let Ok(chunk) = serde_json::from_slice::<StreamChunk>(payload) else {
        return Translation::Ignored(IgnoreReason::Malformed);
    };
    if let Some(error) = chunk.error {
        let message = error
            .message
            .unwrap_or_else(|| "provider reported an error".to_string());
        return Translation::Ignored(IgnoreReason::ProviderError(message));
    }
    match chunk.into_first_delta_content() {
        Some(text) if !text.is_empty() => Translation::Fragment(text),
        _ => Translation::Ignored(IgnoreReason::NoContent),
    }
}

/// True when some `data:` line of the frame carries exactly the terminal
/// marker. JSON content that merely contains the marker text is not terminal.
fn carries_terminal_marker(raw: &[u8]) -> bool {
    raw.split(|&b| b == b'\n').any(|line| {
        line.trim_ascii()
            .strip_prefix(DATA_FIELD)
            .is_some_and(|payload| payload.trim_ascii() == TERMINAL_MARKER)
    })
}
