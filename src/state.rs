mod request_id;

use crate::config::{AppConfig, Credential};
use crate::cors::{build_allowed_origins, AllowedOrigins};
use crate::error::RelayError;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Read-only after startup apart from the request id counter.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    allowed_origins: AllowedOrigins,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let allowed_origins = build_allowed_origins(&config);
        Self {
            config,
            transport,
            allowed_origins,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build state and transport from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the upstream client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(&config.upstream)?;
        Ok(Self::new(config, transport))
    }

    #[must_use]
    pub fn allowed_origins(&self) -> &AllowedOrigins {
        &self.allowed_origins
    }

    #[must_use]
    pub fn default_credential(&self) -> Option<&Credential> {
        self.config.default_credential()
    }

    pub fn next_request_seq(&self) -> u64 {
        self.request_ids.next_seq()
    }

    #[must_use]
    pub fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        self.request_ids.request_uuid(request_seq)
    }
}
