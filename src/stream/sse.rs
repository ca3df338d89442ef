//! Downstream SSE encoding.
use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;

/// Terminal event sent to the client exactly once per successful stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[inline]
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

/// Encode one text fragment as a `data:` event.
///
/// The fragment is forwarded verbatim. Embedded line breaks would end the
/// `data:` line early, so a multi-line fragment becomes one `data:` line per
/// line; compliant clients rejoin them with `\n`.
#[must_use]
pub fn fragment_frame(text: &str) -> Bytes {
    // Fast path for the dominant shape: single-line fragment.
    if memchr::memchr2(b'\n', b'\r', text.as_bytes()).is_none() {
        let mut out = String::with_capacity(8 + text.len());
        out.push_str("data: ");
        out.push_str(text);
        out.push_str("\n\n");
        return Bytes::from(out);
    }

    let normalized = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(16 + normalized.len());
    for line in normalized.split(['\n', '\r']) {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    Bytes::from(out)
}

/// Wrap a streaming body in a `200 text/event-stream` response.
#[inline]
pub fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
