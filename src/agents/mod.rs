pub mod analyst;
pub mod coding;
pub mod document;
pub mod research;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::providers::llm::{ChatMessage, LlmError, LlmProvider};
use crate::types::{AgentId, AgentKind, AgentReply};

pub use analyst::AnalystPersona;
pub use coding::CodingPersona;
pub use document::DocumentPersona;
pub use research::ResearchPersona;

/// A persona is a system-prompt template plus post-processing over a
/// single completion call. No tool use, no multi-turn planning.
#[async_trait]
pub trait Persona: Send + Sync {
    fn kind(&self) -> AgentKind;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn capabilities(&self) -> Vec<String>;
    fn system_prompt(&self) -> &str;

    async fn handle(
        &self,
        agent_id: AgentId,
        prompt: &str,
        context: &Value,
    ) -> Result<AgentReply, LlmError>;
}

/// The fixed default persona set, one per kind.
pub fn build_personas(llm: Arc<dyn LlmProvider>) -> HashMap<AgentKind, Arc<dyn Persona>> {
    let mut personas: HashMap<AgentKind, Arc<dyn Persona>> = HashMap::new();
    personas.insert(
        AgentKind::Research,
        Arc::new(ResearchPersona::new(llm.clone())),
    );
    personas.insert(
        AgentKind::Analyst,
        Arc::new(AnalystPersona::new(llm.clone())),
    );
    personas.insert(AgentKind::Coding, Arc::new(CodingPersona::new(llm.clone())));
    personas.insert(AgentKind::Document, Arc::new(DocumentPersona::new(llm)));
    personas
}

/// Shared message assembly: system template, then the user prompt with
/// any prior-step context rendered inline.
pub(crate) fn build_messages(system_prompt: &str, prompt: &str, context: &Value) -> Vec<ChatMessage> {
    let mut user = prompt.to_string();

    if let Value::Object(entries) = context {
        if !entries.is_empty() {
            user.push_str("\n\nContext:");
            for (key, value) in entries {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                user.push_str(&format!("\n[{}]\n{}", key, rendered));
            }
        }
    }

    vec![
        ChatMessage::system(system_prompt.to_string()),
        ChatMessage::user(user),
    ]
}
