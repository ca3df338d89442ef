use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub const WELCOME_MESSAGE: &str = "Welcome to the OpenRouter Chat API!";

/// Health check handler.
/// Returns JSON with status and config summary. Never exposes the credential.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "chat-relay is running",
        "config": {
            "model": config.upstream.model,
            "default_credential_configured": state.default_credential().is_some(),
            "allowed_origins_count": config.cors.allowed_origins.len(),
            "log_level": config.features.log_level,
        }
    }))
}

/// `GET /api/chat` greeting.
pub fn welcome_handler() -> Json<Value> {
    Json(json!({ "message": WELCOME_MESSAGE }))
}
