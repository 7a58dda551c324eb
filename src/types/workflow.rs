use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{AgentKind, RunId, RunStatus, TaskStatus, WorkflowId};

/// One workflow step: an agent kind plus a prompt template. The template
/// may reference the output of any *earlier* step as `{{step_id}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub kind: AgentKind,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub execution_count: u64,
    pub success_count: u64,
    pub last_executed: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        Self {
            id: WorkflowId::new_v4(),
            name: name.into(),
            description: description.into(),
            steps,
            created_at: Utc::now(),
            execution_count: 0,
            success_count: 0,
            last_executed: None,
        }
    }

    /// Step ids must be unique and non-empty, and every `{{placeholder}}`
    /// must name a step declared earlier in the list. Outputs flow
    /// forward only.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            bail!("workflow has no steps");
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                bail!("workflow step has an empty id");
            }
            if !seen.insert(step.id.as_str()) {
                bail!("duplicate workflow step id: {}", step.id);
            }
            for reference in placeholder_ids(&step.prompt) {
                if !seen.contains(reference.as_str()) || reference == step.id {
                    bail!(
                        "step {} references {{{{{}}}}} which is not an earlier step",
                        step.id,
                        reference
                    );
                }
            }
        }

        Ok(())
    }

    pub fn record_run(&mut self, success: bool) {
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        }
        self.last_executed = Some(Utc::now());
    }
}

/// Extract `{{id}}` placeholder names from a prompt template, in order.
pub fn placeholder_ids(template: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let id = after[..end].trim();
                if !id.is_empty() {
                    ids.push(id.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    ids
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: TaskStatus,
    pub response: Option<String>,
    pub confidence: Option<f32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    pub step_results: Vec<StepResult>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time_secs: Option<f64>,
}

impl WorkflowRun {
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            id: RunId::new_v4(),
            workflow_id,
            status: RunStatus::Running,
            step_results: Vec::new(),
            summary: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            execution_time_secs: None,
        }
    }

    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        let now = Utc::now();
        self.execution_time_secs = Some((now - self.started_at).num_milliseconds() as f64 / 1000.0);
        self.completed_at = Some(now);
    }
}

/// Periodic aggregate counters. Rows are appended, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub active_agents: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub avg_response_time_secs: f64,
    pub total_documents: usize,
    pub total_chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, prompt: &str) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            kind: AgentKind::Research,
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn test_placeholder_extraction() {
        let ids = placeholder_ids("use {{research}} and {{ analysis }} here");
        assert_eq!(ids, vec!["research", "analysis"]);
        assert!(placeholder_ids("no placeholders").is_empty());
        assert!(placeholder_ids("dangling {{open").is_empty());
    }

    #[test]
    fn test_validate_accepts_backward_references() {
        let wf = Workflow::new(
            "demo",
            "",
            vec![
                step("research", "Research topic X"),
                step("analysis", "Analyze: {{research}}"),
            ],
        );
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_forward_and_self_references() {
        let forward = Workflow::new(
            "demo",
            "",
            vec![
                step("first", "Use {{second}}"),
                step("second", "Do something"),
            ],
        );
        assert!(forward.validate().is_err());

        let own = Workflow::new("demo", "", vec![step("only", "Use {{only}}")]);
        assert!(own.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let wf = Workflow::new("demo", "", vec![step("a", "x"), step("a", "y")]);
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_workflow() {
        let wf = Workflow::new("empty", "", vec![]);
        assert!(wf.validate().is_err());
    }
}
