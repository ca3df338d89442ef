use crate::config::{Credential, UpstreamConfig};
use crate::error::RelayError;

pub const INVALID_CREDENTIAL: &str = "API key contains invalid characters.";

/// Upstream endpoint and headers computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    completions_url: url::Url,
    model: String,
    static_headers: http::HeaderMap,
}

impl PreparedUpstream {
    /// Build the prepared upstream from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the base URL or a header value is
    /// invalid. Validated configs never hit this.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, RelayError> {
        let base = upstream.base_url.trim_end_matches('/');
        let completions_url = url::Url::parse(&format!("{base}/chat/completions"))
            .map_err(|e| RelayError::Config(format!("invalid upstream.base_url: {e}")))?;

        Ok(Self {
            completions_url,
            model: upstream.model.clone(),
            static_headers: Self::build_static_headers(upstream)?,
        })
    }

    fn build_static_headers(upstream: &UpstreamConfig) -> Result<http::HeaderMap, RelayError> {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        for (name, value) in [("http-referer", &upstream.referer), ("x-title", &upstream.title)] {
            if value.is_empty() {
                continue;
            }
            let value = http::HeaderValue::from_str(value)
                .map_err(|_| RelayError::Config(format!("invalid value for header {name}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    #[must_use]
    pub fn completions_url(&self) -> &url::Url {
        &self.completions_url
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn static_headers(&self) -> &http::HeaderMap {
        &self.static_headers
    }

    /// Static headers plus the bearer credential for one request.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] when the credential cannot be sent
    /// as a header value.
    pub fn request_headers(&self, credential: &Credential) -> Result<http::HeaderMap, RelayError> {
        let mut headers = self.static_headers.clone();
        let mut auth = http::HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|_| RelayError::validation(INVALID_CREDENTIAL))?;
        auth.set_sensitive(true);
        headers.insert(http::header::AUTHORIZATION, auth);
        Ok(headers)
    }
}
