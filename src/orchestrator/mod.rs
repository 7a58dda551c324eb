use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Instant;
use tokio::sync::Semaphore;

use crate::agents::{build_personas, Persona};
use crate::providers::llm::LlmError;
use crate::providers::LlmProvider;
use crate::storage::Storage;
use crate::types::{
    AgentId, AgentKind, AgentProfile, AgentStatus, RunStatus, StepResult, Task, TaskOutcome,
    TaskStatus, Workflow, WorkflowId, WorkflowRun,
};

/// A reply below this confidence marks its task failed rather than
/// completed.
const CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on simultaneously executing LLM-backed tasks.
    pub max_concurrent_tasks: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no agent registered for kind: {0}")]
    UnknownAgentKind(String),
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub total_agents: usize,
    pub pending_tasks: u64,
    pub running_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub workflows: usize,
}

/// Dispatches tasks to the persona registry and sequences workflows.
///
/// Owns the permit pool: a submission awaits a free permit before its
/// persona runs, which is the only concurrency bound in the system.
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    personas: HashMap<AgentKind, Arc<dyn Persona>>,
    profile_ids: RwLock<HashMap<AgentKind, AgentId>>,
    semaphore: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LlmProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            storage,
            personas: build_personas(llm),
            profile_ids: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
        }
    }

    /// Register the default agent profiles. Call once at startup before
    /// accepting submissions.
    pub async fn initialize(&self) -> Result<()> {
        let existing = self.storage.list_agents().await?;
        let mut ids = HashMap::new();

        for (kind, persona) in &self.personas {
            let profile = match existing.iter().find(|a| a.kind == *kind) {
                Some(profile) => profile.clone(),
                None => {
                    let profile = AgentProfile::new(
                        *kind,
                        persona.name(),
                        persona.description(),
                        persona.capabilities(),
                    );
                    self.storage.create_agent(&profile).await?;
                    profile
                }
            };
            ids.insert(*kind, profile.id);
        }

        let count = ids.len();
        *self.profile_ids.write().unwrap() = ids;
        tracing::info!(agents = count, "orchestrator initialized");
        Ok(())
    }

    fn profile_id(&self, kind: AgentKind) -> Option<AgentId> {
        self.profile_ids.read().unwrap().get(&kind).copied()
    }

    /// Execute one task through the matching persona. Blocks
    /// cooperatively until a permit is free. The task record is
    /// persisted at every transition, so a failure is never lost.
    pub async fn submit(
        &self,
        kind: AgentKind,
        prompt: impl Into<String>,
        context: Value,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let persona = self
            .personas
            .get(&kind)
            .ok_or_else(|| OrchestratorError::UnknownAgentKind(kind.to_string()))?
            .clone();
        let agent_id = self
            .profile_id(kind)
            .ok_or_else(|| OrchestratorError::UnknownAgentKind(kind.to_string()))?;

        let mut task = Task::new(kind, prompt, context);
        self.storage.create_task(&task).await?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| OrchestratorError::Storage(anyhow::anyhow!("permit pool closed")))?;

        task.mark_running(agent_id);
        self.storage.update_task(&task).await?;
        self.set_agent_status(agent_id, AgentStatus::Busy).await?;

        let started = Instant::now();
        let result = persona.handle(agent_id, &task.prompt, &task.context).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(reply) => {
                let success = reply.confidence > CONFIDENCE_THRESHOLD;
                if success {
                    task.mark_completed(reply.response.clone(), reply.confidence, elapsed);
                } else {
                    task.response = Some(reply.response.clone());
                    task.confidence = Some(reply.confidence);
                    task.execution_time_secs = Some(elapsed);
                    task.mark_failed("response confidence below threshold");
                }
                self.storage.update_task(&task).await?;
                self.record_agent_outcome(agent_id, success, elapsed).await?;

                tracing::info!(
                    task_id = %task.id,
                    kind = %kind,
                    confidence = reply.confidence,
                    elapsed_secs = elapsed,
                    "task finished"
                );
                Ok(TaskOutcome {
                    task,
                    reply: Some(reply),
                })
            }
            Err(err) => {
                task.mark_failed(err.to_string());
                self.storage.update_task(&task).await?;
                self.record_agent_outcome(agent_id, false, elapsed).await?;

                tracing::error!(task_id = %task.id, kind = %kind, error = %err, "task failed");
                Err(err.into())
            }
        }
    }

    /// Run a stored workflow: steps strictly in declared order, each
    /// step's output substituted into later `{{placeholders}}` and
    /// passed forward as context. A failed step ends the run with the
    /// partial results kept; prior steps are not rolled back.
    pub async fn run_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowRun, OrchestratorError> {
        let mut workflow = self
            .storage
            .get_workflow(workflow_id)
            .await?
            .ok_or(OrchestratorError::WorkflowNotFound(workflow_id))?;
        workflow
            .validate()
            .map_err(|e| OrchestratorError::InvalidWorkflow(e.to_string()))?;

        let mut run = WorkflowRun::new(workflow.id);
        self.storage.create_run(&run).await?;
        tracing::info!(run_id = %run.id, workflow = %workflow.name, "workflow run started");

        let mut outputs: HashMap<String, String> = HashMap::new();
        let mut failure: Option<String> = None;

        for step in &workflow.steps {
            let resolved = resolve_template(&step.prompt, &outputs);
            let context = context_from_outputs(&outputs);

            match self.submit(step.kind, resolved, context).await {
                Ok(outcome) => {
                    let succeeded = outcome.task.status == TaskStatus::Completed;
                    run.step_results.push(StepResult {
                        step_id: step.id.clone(),
                        status: outcome.task.status,
                        response: outcome.task.response.clone(),
                        confidence: outcome.task.confidence,
                        error: outcome.task.error.clone(),
                    });

                    if !succeeded {
                        failure = Some(format!("step {} failed", step.id));
                        break;
                    }
                    if let Some(response) = outcome.task.response {
                        outputs.insert(step.id.clone(), response);
                    }
                }
                Err(err) => {
                    run.step_results.push(StepResult {
                        step_id: step.id.clone(),
                        status: TaskStatus::Failed,
                        response: None,
                        confidence: None,
                        error: Some(err.to_string()),
                    });
                    failure = Some(format!("step {}: {}", step.id, err));
                    break;
                }
            }
        }

        match failure {
            None => {
                run.summary = self.summarize_run(&workflow, &run).await;
                run.finish(RunStatus::Completed, None);
                workflow.record_run(true);
            }
            Some(error) => {
                tracing::warn!(run_id = %run.id, error = %error, "workflow run failed");
                run.finish(RunStatus::Failed, Some(error));
                workflow.record_run(false);
            }
        }

        self.storage.update_run(&run).await?;
        self.storage.update_workflow(&workflow).await?;
        Ok(run)
    }

    /// Digest of a completed run, produced by the research persona.
    /// Best-effort: a summary failure never fails the run.
    async fn summarize_run(&self, workflow: &Workflow, run: &WorkflowRun) -> Option<String> {
        let step_digest = run
            .step_results
            .iter()
            .map(|r| {
                format!(
                    "[{}]\n{}",
                    r.step_id,
                    r.response.as_deref().unwrap_or("(no output)")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Summarize this workflow execution concisely.\n\nWorkflow: {}\nDescription: {}\n\nStep results:\n{}\n\nProvide an executive summary, key achievements, and next steps.",
            workflow.name, workflow.description, step_digest
        );

        match self.submit(AgentKind::Research, prompt, json!({})).await {
            Ok(outcome) => outcome.task.response,
            Err(err) => {
                tracing::warn!(run_id = %run.id, error = %err, "run summary generation failed");
                None
            }
        }
    }

    pub async fn system_status(&self) -> Result<SystemStatus> {
        let agents = self.storage.list_agents().await?;
        Ok(SystemStatus {
            total_agents: agents.len(),
            pending_tasks: self.storage.count_tasks_by_status(TaskStatus::Pending).await?,
            running_tasks: self.storage.count_tasks_by_status(TaskStatus::Running).await?,
            completed_tasks: self
                .storage
                .count_tasks_by_status(TaskStatus::Completed)
                .await?,
            failed_tasks: self.storage.count_tasks_by_status(TaskStatus::Failed).await?,
            total_documents: self.storage.list_documents().await?.len(),
            total_chunks: self.storage.count_chunks().await?,
            workflows: self.storage.list_workflows().await?.len(),
        })
    }

    /// Append one metric snapshot row from current aggregates.
    pub async fn snapshot_metrics(&self) -> Result<()> {
        let agents = self.storage.list_agents().await?;
        let active_agents = agents
            .iter()
            .filter(|a| a.status != AgentStatus::Offline)
            .count();
        let avg_response_time_secs = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(|a| a.avg_response_time_secs).sum::<f64>() / agents.len() as f64
        };

        let snapshot = crate::types::MetricSnapshot {
            timestamp: chrono::Utc::now(),
            active_agents,
            completed_tasks: self
                .storage
                .count_tasks_by_status(TaskStatus::Completed)
                .await?,
            failed_tasks: self.storage.count_tasks_by_status(TaskStatus::Failed).await?,
            avg_response_time_secs,
            total_documents: self.storage.list_documents().await?.len(),
            total_chunks: self.storage.count_chunks().await?,
        };
        self.storage.record_metric(&snapshot).await
    }

    /// Cancel whatever has not finished. Called on shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        for mut task in self.storage.list_unfinished_tasks().await? {
            task.mark_cancelled();
            self.storage.update_task(&task).await?;
        }
        tracing::info!("orchestrator shut down");
        Ok(())
    }

    async fn set_agent_status(&self, agent_id: AgentId, status: AgentStatus) -> Result<()> {
        if let Some(mut profile) = self.storage.get_agent(agent_id).await? {
            profile.status = status;
            self.storage.update_agent(&profile).await?;
        }
        Ok(())
    }

    async fn record_agent_outcome(
        &self,
        agent_id: AgentId,
        success: bool,
        elapsed_secs: f64,
    ) -> Result<()> {
        if let Some(mut profile) = self.storage.get_agent(agent_id).await? {
            profile.record_outcome(success, elapsed_secs);
            profile.status = AgentStatus::Idle;
            self.storage.update_agent(&profile).await?;
        }
        Ok(())
    }
}

/// Substitute `{{step_id}}` placeholders with recorded outputs.
/// Unresolved placeholders are left in place.
fn resolve_template(template: &str, outputs: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let id = after[..end].trim();
                match outputs.get(id) {
                    Some(output) => result.push_str(output),
                    None => {
                        result.push_str("{{");
                        result.push_str(&after[..end]);
                        result.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                result.push_str("{{");
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}

fn context_from_outputs(outputs: &HashMap<String, String>) -> Value {
    let mut entries = serde_json::Map::new();
    for (key, value) in outputs {
        entries.insert(key.clone(), Value::String(value.clone()));
    }
    Value::Object(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::MockLlmProvider;
    use crate::storage::InMemoryStore;

    async fn orchestrator_with(llm: Arc<dyn LlmProvider>) -> (Orchestrator, Arc<InMemoryStore>) {
        let storage = Arc::new(InMemoryStore::new());
        let orchestrator = Orchestrator::new(
            storage.clone(),
            llm,
            OrchestratorConfig {
                max_concurrent_tasks: 2,
            },
        );
        orchestrator.initialize().await.unwrap();
        (orchestrator, storage)
    }

    #[test]
    fn test_resolve_template() {
        let mut outputs = HashMap::new();
        outputs.insert("research".to_string(), "FINDINGS".to_string());

        assert_eq!(
            resolve_template("Analyze: {{research}}", &outputs),
            "Analyze: FINDINGS"
        );
        assert_eq!(
            resolve_template("Missing {{other}} stays", &outputs),
            "Missing {{other}} stays"
        );
        assert_eq!(
            resolve_template("Spaced {{ research }}", &outputs),
            "Spaced FINDINGS"
        );
        assert_eq!(resolve_template("No braces", &outputs), "No braces");
    }

    #[tokio::test]
    async fn test_initialize_registers_default_agents() {
        let llm = Arc::new(MockLlmProvider::new());
        let (_orchestrator, storage) = orchestrator_with(llm).await;

        let agents = storage.list_agents().await.unwrap();
        assert_eq!(agents.len(), AgentKind::ALL.len());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let llm = Arc::new(MockLlmProvider::new());
        let (orchestrator, storage) = orchestrator_with(llm).await;

        orchestrator.initialize().await.unwrap();
        assert_eq!(storage.list_agents().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_submit_reaches_terminal_status() {
        let llm = Arc::new(MockLlmProvider::with_response(
            "A detailed, structured answer with summary and findings across 2024 data.",
        ));
        let (orchestrator, storage) = orchestrator_with(llm).await;

        let outcome = orchestrator
            .submit(AgentKind::Analyst, "Analyze the numbers", json!({}))
            .await
            .unwrap();

        assert!(outcome.task.status.is_terminal());
        let reply = outcome.reply.unwrap();
        assert!((0.0..=1.0).contains(&reply.confidence));

        let stored = storage.get_task(outcome.task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, outcome.task.status);
    }

    #[tokio::test]
    async fn test_llm_failure_marks_task_failed() {
        let llm = Arc::new(MockLlmProvider::new().failing_first(10));
        let (orchestrator, storage) = orchestrator_with(llm).await;

        let err = orchestrator
            .submit(AgentKind::Research, "Research X", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Llm(_)));

        let failed = storage
            .count_tasks_by_status(TaskStatus::Failed)
            .await
            .unwrap();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_submit_updates_agent_counters() {
        let llm = Arc::new(MockLlmProvider::with_response(
            "Summary: solid analysis of trends in 2024 with detailed findings throughout.",
        ));
        let (orchestrator, storage) = orchestrator_with(llm).await;

        orchestrator
            .submit(AgentKind::Document, "Summarize X", json!({}))
            .await
            .unwrap();

        let agents = storage.list_agents().await.unwrap();
        let document_agent = agents
            .iter()
            .find(|a| a.kind == AgentKind::Document)
            .unwrap();
        assert_eq!(document_agent.total_tasks(), 1);
        assert_eq!(document_agent.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_workflow_not_found() {
        let llm = Arc::new(MockLlmProvider::new());
        let (orchestrator, _storage) = orchestrator_with(llm).await;

        let err = orchestrator
            .run_workflow(WorkflowId::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkflowNotFound(_)));
    }
}
