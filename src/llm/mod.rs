//! LLM client abstraction layer
//!
//! A small trait over chat-style completion so the code oracle can run against
//! a real provider (GenAI) or scripted responses (Mock) interchangeably.

mod client;
mod error;
mod genai;
mod mock;
mod types;

pub use client::LLMClient;
pub use error::BackendError;
pub use self::genai::{parse_provider, GenAIClient, API_BASE_URL_ENV};
pub use mock::{MockLLMClient, MockResponse};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole, TokenUsage};
