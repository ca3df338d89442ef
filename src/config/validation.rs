use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream_config(config)?;
    validate_allowed_origins(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.host.trim().is_empty() {
        return Err(validation_err("server.host cannot be empty"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream_config(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.base_url must start with http:// or https://",
        ));
    }
    if let Err(err) = url::Url::parse(&upstream.base_url) {
        return Err(validation_err(format!(
            "upstream.base_url is not a valid URL: {err}"
        )));
    }
    if upstream.model.trim().is_empty() {
        return Err(validation_err("upstream.model cannot be empty"));
    }
    if upstream.request_timeout_secs == 0 {
        return Err(validation_err(
            "upstream.request_timeout_secs must be greater than 0",
        ));
    }
    if upstream.connect_timeout_secs == 0 {
        return Err(validation_err(
            "upstream.connect_timeout_secs must be greater than 0",
        ));
    }
    if upstream.stream_handshake_timeout_secs == 0 {
        return Err(validation_err(
            "upstream.stream_handshake_timeout_secs must be greater than 0",
        ));
    }
    if upstream.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "upstream.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    for (name, value) in [("referer", &upstream.referer), ("title", &upstream.title)] {
        if http::HeaderValue::from_str(value).is_err() {
            return Err(validation_err(format!(
                "upstream.{name} is not a valid header value"
            )));
        }
    }
    Ok(())
}

fn validate_allowed_origins(config: &AppConfig) -> Result<(), ConfigError> {
    for origin in &config.cors.allowed_origins {
        if origin.trim().is_empty() {
            return Err(validation_err("cors.allowed_origins contains an empty origin"));
        }
        if origin.ends_with('/') {
            return Err(validation_err(format!(
                "cors.allowed_origins entry '{origin}' must not end with '/'"
            )));
        }
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED", "TRACE",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
