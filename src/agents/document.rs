use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::agents::{build_messages, Persona};
use crate::providers::llm::{LlmError, LlmProvider};
use crate::types::{AgentId, AgentKind, AgentReply};

const SYSTEM_PROMPT: &str = "\
You are a professional document analyst. You process, summarize, and organize \
written content, and you generate well-structured documents on request.

Your responses should be well-organized, clearly formatted with headings and \
sections, and maintain a professional tone. When processing documents, provide:
1. Document summary and key points
2. Structural analysis
3. Key insights
4. Recommendations for improvement";

pub struct DocumentPersona {
    llm: Arc<dyn LlmProvider>,
}

impl DocumentPersona {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

/// Confidence from response substance: very short answers to document
/// tasks are usually refusals or misses.
fn assess_confidence(response: &str) -> f32 {
    let words = response.split_whitespace().count() as f32;
    (0.3 + words / 400.0).clamp(0.3, 0.9)
}

#[async_trait]
impl Persona for DocumentPersona {
    fn kind(&self) -> AgentKind {
        AgentKind::Document
    }

    fn name(&self) -> &str {
        "Document Agent"
    }

    fn description(&self) -> &str {
        "Processes, summarizes, and generates documents"
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "Content summarization",
            "Information extraction",
            "Document analysis",
            "Report writing",
            "Keyword extraction",
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

        let confidence = assess_confidence(&response);
        let word_count = response.split_whitespace().count();

        Ok(AgentReply::new(agent_id, self.kind(), response)
            .with_confidence(confidence)
            .with_reasoning("Document analysis with length-based confidence")
            .with_metadata(json!({ "word_count": word_count })))
    }
}
