use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::OnceLock;

use crate::agents::{build_messages, Persona};
use crate::providers::llm::{LlmError, LlmProvider};
use crate::types::{AgentId, AgentKind, AgentReply};

const SYSTEM_PROMPT: &str = "\
You are a senior software engineer. You generate, review, debug and refactor \
code following established best practices.

Always provide:
1. Clean, readable, and maintainable code in a fenced code block
2. Proper error handling and validation
3. A short explanation of the approach
4. Testing recommendations";

pub struct CodingPersona {
    llm: Arc<dyn LlmProvider>,
}

struct CodeBlock {
    language: Option<String>,
    code: String,
}

impl CodingPersona {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```([a-zA-Z0-9_+\-]*)\n(.*?)```").expect("static regex is valid")
    })
}

/// First fenced code block in the response, if any.
fn extract_code_block(response: &str) -> Option<CodeBlock> {
    code_block_re().captures(response).map(|caps| {
        let language = caps
            .get(1)
            .map(|m| m.as_str().trim())
            .filter(|l| !l.is_empty())
            .map(String::from);
        CodeBlock {
            language,
            code: caps[2].trim_end().to_string(),
        }
    })
}

#[async_trait]
impl Persona for CodingPersona {
    fn kind(&self) -> AgentKind {
        AgentKind::Coding
    }

    fn name(&self) -> &str {
        "Coding Agent"
    }

    fn description(&self) -> &str {
        "Generates, reviews, and debugs code"
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "Code generation",
            "Code review and optimization",
            "Debugging and troubleshooting",
            "Refactoring",
            "API design",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    async fn handle(
        &self,
        agent_id: AgentId,
        prompt: &str,
        context: &Value,
    ) -> Result<AgentReply, LlmError> {
        let messages = build_messages(self.system_prompt(), prompt, context);
        let response = self.llm.complete(messages).await?;

        let block = extract_code_block(&response);
        let (confidence, metadata) = match &block {
            Some(block) => (
                0.9,
                json!({
                    "language": block.language,
                    "lines_of_code": block.code.lines().count(),
                    "code": block.code,
                }),
            ),
            // A prose-only answer to a coding prompt is suspect.
            None => (0.6, json!({ "language": null, "lines_of_code": 0 })),
        };

        Ok(AgentReply::new(agent_id, self.kind(), response)
            .with_confidence(confidence)
            .with_reasoning(match block {
                Some(_) => "Solution includes a fenced code block",
                None => "No code block found in response",
            })
            .with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::MockLlmProvider;
    use serde_json::json;

    #[test]
    fn test_extract_code_block_with_language() {
        let block =
            extract_code_block("Here you go:\n```rust\nfn main() {}\n```\nDone.").unwrap();
        assert_eq!(block.language.as_deref(), Some("rust"));
        assert_eq!(block.code, "fn main() {}");
    }

    #[test]
    fn test_extract_code_block_without_language() {
        let block = extract_code_block("```\nplain code\n```").unwrap();
        assert!(block.language.is_none());
        assert_eq!(block.code, "plain code");
    }

    #[test]
    fn test_extract_takes_first_block() {
        let block = extract_code_block("```py\nfirst\n```\n```rs\nsecond\n```").unwrap();
        assert_eq!(block.code, "first");
    }

    #[test]
    fn test_no_block_returns_none() {
        assert!(extract_code_block("prose only, no code").is_none());
    }

    #[tokio::test]
    async fn test_coding_reply_extracts_metadata() {
        let llm = Arc::new(MockLlmProvider::with_response(
            "```rust\nfn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n```",
        ));
        let persona = CodingPersona::new(llm);

        let reply = persona
            .handle(AgentId::new_v4(), "Write an add function", &json!({}))
            .await
            .unwrap();

        assert_eq!(reply.confidence, 0.9);
        assert_eq!(reply.metadata["language"], "rust");
        assert_eq!(reply.metadata["lines_of_code"], 3);
    }

    #[tokio::test]
    async fn test_missing_code_lowers_confidence() {
        let llm = Arc::new(MockLlmProvider::with_response("I would use a for loop."));
        let persona = CodingPersona::new(llm);

        let reply = persona
            .handle(AgentId::new_v4(), "Write a loop", &json!({}))
            .await
            .unwrap();

        assert_eq!(reply.confidence, 0.6);
    }
}
