use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::agents::{build_messages, Persona};
use crate::providers::llm::{LlmError, LlmProvider};
use crate::types::{AgentId, AgentKind, AgentReply};

const SYSTEM_PROMPT: &str = "\
You are a professional data analyst. You perform statistical analysis, pattern \
recognition, and risk assessment, and you turn raw information into actionable \
insight.

Structure your analysis as:
- Executive summary (2-3 sentences)
- Key findings (with evidence)
- Patterns observed
- Recommendations
- Confidence: a value from 0.0 to 1.0 based on data quality and completeness";

pub struct AnalystPersona {
    llm: Arc<dyn LlmProvider>,
}

#[derive(Debug, Default)]
struct ParsedAnalysis {
    summary: String,
    findings: Vec<String>,
    patterns: Vec<String>,
    recommendations: Vec<String>,
    confidence: Option<f32>,
}

impl AnalystPersona {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

/// Section-based parse of the model's structured analysis. Headings are
/// matched loosely; bullets under each heading are collected verbatim.
fn parse_analysis(response: &str) -> ParsedAnalysis {
    let mut parsed = ParsedAnalysis::default();
    let mut section = "";

    for raw in response.lines() {
        let line = raw.trim();
        let lower = line.to_lowercase();

        if lower.contains("summary") {
            section = "summary";
            continue;
        } else if lower.contains("finding") {
            section = "findings";
            continue;
        } else if lower.contains("pattern") {
            section = "patterns";
            continue;
        } else if lower.contains("recommendation") {
            section = "recommendations";
            continue;
        } else if lower.starts_with("confidence") {
            if let Some(value) = line.split(':').nth(1) {
                if let Ok(confidence) = value.trim().parse::<f32>() {
                    parsed.confidence = Some(confidence.clamp(0.0, 1.0));
                }
            }
            continue;
        }

        if line.is_empty() {
            continue;
        }

        let bullet = line
            .trim_start_matches('-')
            .trim_start_matches('*')
            .trim()
            .to_string();

        match section {
            "summary" => {
                if !parsed.summary.is_empty() {
                    parsed.summary.push(' ');
                }
                parsed.summary.push_str(line);
            }
            "findings" if line.starts_with('-') || line.starts_with('*') => {
                parsed.findings.push(bullet);
            }
            "patterns" if line.starts_with('-') || line.starts_with('*') => {
                parsed.patterns.push(bullet);
            }
            "recommendations" if line.starts_with('-') || line.starts_with('*') => {
                parsed.recommendations.push(bullet);
            }
            _ => {}
        }
    }

    if parsed.summary.is_empty() {
        parsed.summary = response.lines().take(3).collect::<Vec<_>>().join(" ");
    }

    parsed
}

#[async_trait]
impl Persona for AnalystPersona {
    fn kind(&self) -> AgentKind {
        AgentKind::Analyst
    }

    fn name(&self) -> &str {
        "Analyst Agent"
    }

    fn description(&self) -> &str {
        "Performs data analysis, insight generation, and pattern recognition"
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "Statistical analysis",
            "Trend analysis",
            "Pattern recognition",
            "Risk assessment",
            "Performance analysis",
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

        let parsed = parse_analysis(&response);
        let confidence = parsed.confidence.unwrap_or(0.8);

        Ok(AgentReply::new(agent_id, self.kind(), response)
            .with_confidence(confidence)
            .with_reasoning(parsed.summary.clone())
            .with_metadata(json!({
                "key_findings": parsed.findings,
                "patterns": parsed.patterns,
                "recommendations": parsed.recommendations,
            })))
    }
}
