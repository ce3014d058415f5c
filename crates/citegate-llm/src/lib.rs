//! citegate-llm — LLM backend trait and concrete implementations.

pub mod backend;
pub mod json;
pub mod mock;

pub use backend::{
    build_backend, call_llm, AnthropicBackend, CallOptions, LlmBackend, LlmError, LlmRequest,
    LlmResponse, Message, OllamaBackend, OpenAiCompatibleBackend,
};
pub use json::extract_json_payload;
pub use mock::MockBackend;
