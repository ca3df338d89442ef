use crate::config::AppConfig;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ORIGIN, VARY,
};
use http::HeaderValue;
use rustc_hash::FxHashSet;

const ALLOW_METHODS: HeaderValue = HeaderValue::from_static("GET, POST, OPTIONS");
const ALLOW_HEADERS: HeaderValue = HeaderValue::from_static("Content-Type, Authorization");

/// Compact origin index used on every response.
pub enum AllowedOrigins {
    Empty,
    Single(Box<str>),
    Multiple(FxHashSet<Box<str>>),
}

impl AllowedOrigins {
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Empty => false,
            Self::Single(allowed) => allowed.as_ref() == origin,
            Self::Multiple(allowed) => allowed.contains(origin),
        }
    }
}

/// Build the origin index from the configured allow-list.
#[must_use]
pub fn build_allowed_origins(config: &AppConfig) -> AllowedOrigins {
    let mut allowed: FxHashSet<Box<str>> = config
        .cors
        .allowed_origins
        .iter()
        .map(|origin| Box::from(origin.as_str()))
        .collect();

    match allowed.len() {
        0 => AllowedOrigins::Empty,
        1 => match allowed.drain().next() {
            Some(origin) => AllowedOrigins::Single(origin),
            None => AllowedOrigins::Empty,
        },
        _ => AllowedOrigins::Multiple(allowed),
    }
}

/// Add CORS headers to an outgoing response.
///
/// Methods and headers are always advertised. The origin is echoed back only
/// when it is on the allow-list; otherwise the browser blocks the response.
pub fn apply_cors_headers(
    request_headers: &http::HeaderMap,
    response_headers: &mut http::HeaderMap,
    allowed: &AllowedOrigins,
) {
    if let Some(origin) = request_headers.get(ORIGIN) {
        if origin.to_str().is_ok_and(|value| allowed.allows(value)) {
            response_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }
        response_headers.append(VARY, HeaderValue::from_static("Origin"));
    }
    response_headers.insert(ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS);
    response_headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS);
}
