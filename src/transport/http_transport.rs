use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;

use crate::config::UpstreamConfig;
use crate::error::{summarize_upstream_error, RelayError};
use crate::protocol::{CompletionResponse, UpstreamChatRequest, ValidatedChat};

use super::prepared_upstream::PreparedUpstream;

fn build_reqwest_client(config: &UpstreamConfig) -> Result<reqwest::Client, RelayError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    // No client-wide timeout: it would cap the whole streaming body.
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::none());

    if !config.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Map a reqwest failure before any response body was relayed.
fn transport_failure(err: &reqwest::Error) -> RelayError {
    let message = if err.is_timeout() {
        "Upstream request timed out".to_string()
    } else if err.is_connect() {
        format!("Failed to connect to upstream: {err}")
    } else {
        err.to_string()
    };
    RelayError::upstream(err.status().map(|s| s.as_u16()), message)
}

fn status_failure(status: http::StatusCode, body: &[u8]) -> RelayError {
    let summary = summarize_upstream_error(body);
    let message = if summary.is_empty() {
        format!("Upstream returned status {}", status.as_u16())
    } else {
        summary
    };
    RelayError::upstream(Some(status.as_u16()), message)
}

/// HTTP client for the completion provider.
///
/// Each call makes exactly one upstream attempt; there is no retry.
pub struct HttpTransport {
    client: reqwest::Client,
    prepared: PreparedUpstream,
    request_timeout: Duration,
    stream_handshake_timeout: Duration,
}

impl HttpTransport {
    /// Build the transport and its connection pool from upstream config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the client or endpoint cannot be built.
    pub fn new(config: &UpstreamConfig) -> Result<Self, RelayError> {
        Ok(Self {
            client: build_reqwest_client(config)?,
            prepared: PreparedUpstream::new(config)?,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            stream_handshake_timeout: Duration::from_secs(config.stream_handshake_timeout_secs),
        })
    }

    #[must_use]
    pub fn prepared(&self) -> &PreparedUpstream {
        &self.prepared
    }

    fn post(&self, chat: &ValidatedChat, stream: bool) -> Result<reqwest::RequestBuilder, RelayError> {
        let body = UpstreamChatRequest::new(self.prepared.model(), chat, stream).to_body()?;
        let headers = self.prepared.request_headers(&chat.credential)?;
        Ok(self
            .client
            .post(self.prepared.completions_url().clone())
            .headers(headers)
            .body(body))
    }

    /// Request a complete (non-streaming) reply and return its text.
    ///
    /// The whole exchange, body included, is bounded by the request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamUnavailable`] on connect failure, timeout,
    /// non-2xx status, or a response without message content.
    pub async fn complete(&self, chat: &ValidatedChat) -> Result<String, RelayError> {
        let response = self
            .post(chat, false)?
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| transport_failure(&e))?;
        if !status.is_success() {
            return Err(status_failure(status, &body));
        }

        let parsed: CompletionResponse = serde_json::from_slice(&body).map_err(|e| {
            RelayError::upstream(
                Some(status.as_u16()),
                format!("Invalid completion response: {e}"),
            )
        })?;
        parsed.into_first_content().ok_or_else(|| {
            RelayError::upstream(
                Some(status.as_u16()),
                "Completion response contained no message content",
            )
        })
    }

    /// Open a streaming completion and return its raw body stream.
    ///
    /// Only the handshake (connect plus response headers) is time-bounded;
    /// the returned stream may run as long as the provider keeps sending.
    /// Dropping the stream aborts the upstream request.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamUnavailable`] on connect failure,
    /// handshake timeout, or non-2xx status.
    pub async fn open_stream(
        &self,
        chat: &ValidatedChat,
    ) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static, RelayError>
    {
        let send = self
            .post(chat, true)?
            .header(http::header::ACCEPT, "text/event-stream")
            .send();
        let response = tokio::time::timeout(self.stream_handshake_timeout, send)
            .await
            .map_err(|_| RelayError::upstream(None, "Upstream request timed out"))?
            .map_err(|e| transport_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = tokio::time::timeout(self.stream_handshake_timeout, response.bytes())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(status_failure(status, &body));
        }

        tracing::debug!(status = status.as_u16(), "upstream stream opened");
        Ok(response.bytes_stream())
    }
}
