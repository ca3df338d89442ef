use serde::{Deserialize, Serialize};

use crate::config::Credential;
use crate::error::RelayError;

pub const PROMPT_REQUIRED: &str = "Prompt is required.";
pub const CREDENTIAL_REQUIRED: &str = "API key is required.";
pub const INVALID_BODY: &str = "Invalid JSON body.";

const GENERIC_INSTRUCTION: &str = "You are a helpful AI assistant.";

/// Client request body accepted on `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// A request that passed validation and is ready to go upstream.
#[derive(Debug, Clone)]
pub struct ValidatedChat {
    pub prompt: String,
    pub system_instruction: String,
    pub credential: Credential,
    pub stream: bool,
}

impl ChatRequest {
    /// Parse a raw request body. An empty body parses as an empty request.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Validation` when the body is not a JSON object of
    /// the expected shape.
    pub fn from_slice(body: &[u8]) -> Result<Self, RelayError> {
        if body.trim_ascii().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|_| RelayError::validation(INVALID_BODY))
    }

    /// Check the prompt and resolve the credential, falling back to
    /// `default_credential` when the caller sent none.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Validation` for a blank prompt, or when neither
    /// the caller nor the configuration supplies a credential.
    pub fn validate(
        self,
        default_credential: Option<&Credential>,
    ) -> Result<ValidatedChat, RelayError> {
        let prompt = match self.prompt {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => return Err(RelayError::validation(PROMPT_REQUIRED)),
        };
        let credential = resolve_credential(self.api_key.as_deref(), default_credential)?;

        Ok(ValidatedChat {
            prompt,
            system_instruction: system_instruction(self.role.as_deref()),
            credential,
            stream: self.stream,
        })
    }
}

/// Caller credential (trimmed) if present, else the configured default.
///
/// # Errors
///
/// Returns `RelayError::Validation` when neither is present.
pub fn resolve_credential(
    caller: Option<&str>,
    default_credential: Option<&Credential>,
) -> Result<Credential, RelayError> {
    if let Some(key) = caller.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(Credential::new(key));
    }
    default_credential
        .filter(|credential| !credential.is_blank())
        .cloned()
        .ok_or_else(|| RelayError::validation(CREDENTIAL_REQUIRED))
}

/// Build the system message for an optional role.
#[must_use]
pub fn system_instruction(role: Option<&str>) -> String {
    match role.map(str::trim).filter(|role| !role.is_empty()) {
        Some(role) => format!("You are a helpful AI assistant acting as a {role}."),
        None => GENERIC_INSTRUCTION.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Upstream wire types
// ---------------------------------------------------------------------------

/// One `{role, content}` entry of the upstream message list.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Request body for the provider's `/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub messages: [UpstreamMessage<'a>; 2],
}

impl<'a> UpstreamChatRequest<'a> {
    #[must_use]
    pub fn new(model: &'a str, chat: &'a ValidatedChat, stream: bool) -> Self {
        Self {
            model,
            stream,
            messages: [
                UpstreamMessage {
                    role: "system",
                    content: &chat.system_instruction,
                },
                UpstreamMessage {
                    role: "user",
                    content: &chat.prompt,
                },
            ],
        }
    }

    /// Serialize to the request body bytes.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Internal` if serialization fails.
    pub fn to_body(&self) -> Result<bytes::Bytes, RelayError> {
        serde_json::to_vec(self)
            .map(bytes::Bytes::from)
            .map_err(|e| RelayError::Internal(format!("Failed to encode upstream request: {e}")))
    }
}

/// Non-streaming completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub message: Option<CompletionMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionResponse {
    /// Content of the first choice's message, if any.
    #[must_use]
    pub fn into_first_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
    }
}

/// One decoded streaming payload (`data: {...}`).
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub error: Option<ProviderError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Option<StreamDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Error object a provider may embed in a stream payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub message: Option<String>,
}

impl StreamChunk {
    /// Incremental text of the first choice, if any.
    #[must_use]
    pub fn into_first_delta_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
    }
}
