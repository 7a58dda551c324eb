use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    AgentId, AgentProfile, Document, DocumentChunk, DocumentId, MetricSnapshot, RunId, Task,
    TaskId, TaskStatus, User, Workflow, WorkflowId, WorkflowRun,
};

#[async_trait]
pub trait Storage: Send + Sync {
    // Agent operations
    async fn create_agent(&self, agent: &AgentProfile) -> Result<()>;
    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentProfile>>;
    async fn update_agent(&self, agent: &AgentProfile) -> Result<()>;
    async fn list_agents(&self) -> Result<Vec<AgentProfile>>;

    // Task operations
    async fn create_task(&self, task: &Task) -> Result<()>;
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>>;
    async fn update_task(&self, task: &Task) -> Result<()>;
    async fn count_tasks_by_status(&self, status: TaskStatus) -> Result<u64>;
    async fn list_unfinished_tasks(&self) -> Result<Vec<Task>>;

    // Document operations
    async fn create_document(&self, document: &Document) -> Result<()>;
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>>;
    async fn update_document(&self, document: &Document) -> Result<()>;
    async fn list_documents(&self) -> Result<Vec<Document>>;
    /// Removes the document and its chunks. Returns false when the id is
    /// unknown.
    async fn delete_document(&self, id: DocumentId) -> Result<bool>;

    // Chunk operations
    async fn create_chunks(&self, chunks: &[DocumentChunk]) -> Result<()>;
    async fn count_chunks(&self) -> Result<usize>;
    /// Rank all stored chunks against the query fingerprint: descending
    /// cosine similarity, ties by insertion order, at most `top_k` rows.
    async fn search_chunks(
        &self,
        fingerprint: &[f32],
        top_k: usize,
    ) -> Result<Vec<(DocumentChunk, f32)>>;

    // Workflow operations
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()>;
    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>>;
    async fn update_workflow(&self, workflow: &Workflow) -> Result<()>;
    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    // Workflow run operations
    async fn create_run(&self, run: &WorkflowRun) -> Result<()>;
    async fn update_run(&self, run: &WorkflowRun) -> Result<()>;
    async fn get_run(&self, id: RunId) -> Result<Option<WorkflowRun>>;
    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowRun>>;

    // Metric snapshots (append-only)
    async fn record_metric(&self, snapshot: &MetricSnapshot) -> Result<()>;
    async fn latest_metric(&self) -> Result<Option<MetricSnapshot>>;

    // User operations
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
}
