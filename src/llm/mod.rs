//! Model invocation step
//!
//! The model sees the system prompt, the full history and the tool
//! declarations, and answers with either a text stream or a single tool
//! selection. Provider choice lives behind `LanguageModel`.

use crate::models::{HistoryEntry, ToolCall};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub use gemini::GeminiClient;

/// Fixed policy handed to the model on every turn
pub const SYSTEM_PROMPT: &str = r#"You are an expert cryptocurrency assistant.
Your goal is to give accurate information, ALWAYS using the available tools.

GOLDEN RULES:
1. NEVER make up prices. ALWAYS use the tools for financial data.
2. If the user asks for the "Top 10" or a ranking, use the "listTopCryptos" tool. (IMPORTANT: always pass currency="usd").
3. If the user asks for details of a specific coin, use the "showCryptoDetail" tool."#;

/// Tool description as advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema object (`type`, `properties`, `required`)
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub history: Vec<HistoryEntry>,
    pub tools: Vec<ToolDeclaration>,
}

/// One item of a streamed text answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextChunk {
    Delta(String),
    Done,
}

pub type TextStream = BoxStream<'static, Result<TextChunk>>;

pub enum ModelResponse {
    Text(TextStream),
    ToolCall(ToolCall),
}

impl std::fmt::Debug for ModelResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelResponse::Text(_) => f.write_str("ModelResponse::Text(..)"),
            ModelResponse::ToolCall(call) => f.debug_tuple("ModelResponse::ToolCall").field(call).finish(),
        }
    }
}

/// Trait for the model invocation step (LLM controlled)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelResponse>;
}
