use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tracing::Instrument;

use crate::error::RelayError;
use crate::protocol::ChatRequest;
use crate::state::AppState;
use crate::stream::{relay_stream, sse_ok_response, RelaySession};

/// `POST /api/chat`.
///
/// Validates the body, then either relays a streaming completion as SSE or
/// returns `{ "response": text }` when the body does not ask for streaming.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = state.request_uuid(state.next_request_seq());
    let span = tracing::info_span!("chat", request_id = %request_id);

    match handler_inner(state, body, span.clone())
        .instrument(span)
        .await
    {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handler_inner(
    state: Arc<AppState>,
    body: Bytes,
    span: tracing::Span,
) -> Result<Response, RelayError> {
    let chat = ChatRequest::from_slice(&body)
        .and_then(|request| request.validate(state.default_credential()))
        .inspect_err(|err| tracing::debug!(error = %err, "rejected chat request"))?;

    if chat.stream {
        let upstream = state
            .transport
            .open_stream(&chat)
            .await
            .inspect_err(log_upstream_failure)?;
        let session = RelaySession::new(span);
        let body = Body::from_stream(
            relay_stream(upstream, session).map(Ok::<Bytes, Infallible>),
        );
        return Ok(sse_ok_response(body));
    }

    let text = state
        .transport
        .complete(&chat)
        .await
        .inspect_err(log_upstream_failure)?;
    Ok(Json(json!({ "response": text })).into_response())
}

fn log_upstream_failure(err: &RelayError) {
    if let RelayError::UpstreamUnavailable { status, message } = err {
        tracing::error!(status = ?status, details = %message, "upstream request failed");
    } else {
        tracing::error!(error = %err, "upstream request failed");
    }
}
