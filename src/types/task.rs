use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentId, AgentKind, TaskId, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub agent_id: Option<AgentId>,
    pub kind: AgentKind,
    pub prompt: String,
    pub context: Value,
    pub status: TaskStatus,
    pub response: Option<String>,
    pub error: Option<String>,
    pub confidence: Option<f32>,
    pub execution_time_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(kind: AgentKind, prompt: impl Into<String>, context: Value) -> Self {
        Self {
            id: TaskId::new_v4(),
            agent_id: None,
            kind,
            prompt: prompt.into(),
            context,
            status: TaskStatus::Pending,
            response: None,
            error: None,
            confidence: None,
            execution_time_secs: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn mark_running(&mut self, agent_id: AgentId) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Running));
        self.agent_id = Some(agent_id);
        self.status = TaskStatus::Running;
    }

    pub fn mark_completed(&mut self, response: String, confidence: f32, elapsed_secs: f64) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Completed));
        self.status = TaskStatus::Completed;
        self.response = Some(response);
        self.confidence = Some(confidence);
        self.execution_time_secs = Some(elapsed_secs);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Failed));
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        if self.status.can_transition_to(TaskStatus::Cancelled) {
            self.status = TaskStatus::Cancelled;
            self.completed_at = Some(Utc::now());
        }
    }
}

/// What a persona hands back from its single completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub agent_id: AgentId,
    pub kind: AgentKind,
    pub response: String,
    pub confidence: f32,
    pub reasoning: Option<String>,
    pub metadata: Value,
}

impl AgentReply {
    pub fn new(agent_id: AgentId, kind: AgentKind, response: impl Into<String>) -> Self {
        Self {
            agent_id,
            kind,
            response: response.into(),
            confidence: 0.5,
            reasoning: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The finished task record together with the reply that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: Task,
    pub reply: Option<AgentReply>,
}
