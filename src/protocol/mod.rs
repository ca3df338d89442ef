pub mod chat;

pub use chat::{
    resolve_credential, system_instruction, ChatRequest, CompletionResponse, StreamChunk,
    UpstreamChatRequest, ValidatedChat,
};
