use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::agents::{build_messages, Persona};
use crate::providers::llm::{LlmError, LlmProvider};
use crate::types::{AgentId, AgentKind, AgentReply};

const SYSTEM_PROMPT: &str = "\
You are a professional research agent. You conduct comprehensive research, \
fact-check and verify information, and synthesize findings from multiple angles.

Your responses should be factual, objective, and structured with clear headings \
and bullet points. Always provide:
1. Executive summary
2. Key findings
3. Detailed analysis
4. Recommendations (if applicable)
5. Sources and references where known";

pub struct ResearchPersona {
    llm: Arc<dyn LlmProvider>,
}

impl ResearchPersona {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

/// Crude quality heuristic over the report text: length, structure,
/// specificity, and objectivity each contribute a fixed share.
fn assess_quality(content: &str) -> f32 {
    let word_count = content.split_whitespace().count();
    let lower = content.to_lowercase();

    let mut score = 0.0;
    if word_count > 300 {
        score += 0.2;
    }
    if ["summary", "finding", "analysis", "conclusion"]
        .iter()
        .any(|h| lower.contains(h))
    {
        score += 0.2;
    }
    score += if word_count > 600 { 0.2 } else { 0.1 };
    if content.chars().any(|c| c.is_ascii_digit()) {
        score += 0.2;
    }
    if !["i think", "i believe", "personally"]
        .iter()
        .any(|s| lower.contains(s))
    {
        score += 0.2;
    }
    score
}

fn extract_key_findings(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| {
            (line.starts_with('-') || line.starts_with('*') || line.starts_with('\u{2022}'))
                && line.len() > 20
        })
        .take(10)
        .map(String::from)
        .collect()
}

#[async_trait]
impl Persona for ResearchPersona {
    fn kind(&self) -> AgentKind {
        AgentKind::Research
    }

    fn name(&self) -> &str {
        "Research Agent"
    }

    fn description(&self) -> &str {
        "Conducts research, fact-checking, and information gathering"
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "Information research and gathering",
            "Fact-checking and verification",
            "Trend analysis",
            "Data synthesis",
            "Report generation",
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

        let confidence = assess_quality(&response);
        let findings = extract_key_findings(&response);

        Ok(AgentReply::new(agent_id, self.kind(), response)
            .with_confidence(confidence)
            .with_reasoning("Structured research report with quality-based confidence")
            .with_metadata(json!({
                "key_findings": findings,
            })))
    }
}
