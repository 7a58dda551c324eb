pub mod llm;

pub use llm::{ChatMessage, GroqProvider, LlmError, LlmProvider, MockLlmProvider};
