use serde_json::json;

/// Message returned to clients for every upstream failure.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to fetch AI response";

/// Relay error type used across all modules.
///
/// Malformed upstream frames are deliberately absent: they never leave the
/// translator as errors (see [`crate::stream::IgnoreReason`]).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable {
        status: Option<u16>,
        message: String,
    },
    #[error("Upstream stream failed mid-flight: {0}")]
    MidStreamTransport(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Upstream,
    ServerError,
}

impl RelayError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::Validation(_) => ErrorCategory::InvalidRequest,
            RelayError::UpstreamUnavailable { .. } | RelayError::MidStreamTransport(_) => {
                ErrorCategory::Upstream
            }
            RelayError::Config(_) | RelayError::Internal(_) => ErrorCategory::ServerError,
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Upstream | ErrorCategory::ServerError => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Format an error as (`status_code`, JSON body).
///
/// Validation failures carry only `error`; upstream failures use a fixed
/// `error` string and put the provider's summary under `details`.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let status = http_status_for_category(err.category());
    let body = match err {
        RelayError::Validation(message) => json!({ "error": message }),
        RelayError::UpstreamUnavailable { message, .. } | RelayError::MidStreamTransport(message) => {
            json!({ "error": UPSTREAM_FAILURE_MESSAGE, "details": message })
        }
        RelayError::Config(_) | RelayError::Internal(_) => json!({ "error": err.to_string() }),
    };
    (status, body)
}

/// Summarise an upstream error body for logs and the `details` field.
///
/// Prefers `error.message` from a JSON body and falls back to lossy UTF-8.
/// Either way the result is capped at 500 bytes.
#[must_use]
pub fn summarize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(msg) = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return truncate_summary(msg);
        }
    }
    truncate_summary(&String::from_utf8_lossy(body))
}

fn truncate_summary(text: &str) -> String {
    const MAX_LEN: usize = 500;

    if text.len() <= MAX_LEN {
        return text.to_string();
    }
    let mut cut = MAX_LEN;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}
