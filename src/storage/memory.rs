use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::search::rank_chunks;
use crate::storage::traits::Storage;
use crate::types::{
    AgentId, AgentProfile, Document, DocumentChunk, DocumentId, MetricSnapshot, RunId, Task,
    TaskId, TaskStatus, User, Workflow, WorkflowId, WorkflowRun,
};

/// Storage backend for tests and database-less operation. Chunks live in
/// a Vec so search ties resolve by insertion order.
#[derive(Clone)]
pub struct InMemoryStore {
    agents: Arc<RwLock<HashMap<AgentId, AgentProfile>>>,
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    documents: Arc<RwLock<HashMap<DocumentId, Document>>>,
    chunks: Arc<RwLock<Vec<DocumentChunk>>>,
    workflows: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
    runs: Arc<RwLock<HashMap<RunId, WorkflowRun>>>,
    metrics: Arc<RwLock<Vec<MetricSnapshot>>>,
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            documents: Arc::new(RwLock::new(HashMap::new())),
            chunks: Arc::new(RwLock::new(Vec::new())),
            workflows: Arc::new(RwLock::new(HashMap::new())),
            runs: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(RwLock::new(Vec::new())),
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn create_agent(&self, agent: &AgentProfile) -> Result<()> {
        self.agents
            .write()
            .unwrap()
            .insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentProfile>> {
        Ok(self.agents.read().unwrap().get(&id).cloned())
    }

    async fn update_agent(&self, agent: &AgentProfile) -> Result<()> {
        self.agents
            .write()
            .unwrap()
            .insert(agent.id, agent.clone());
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<AgentProfile>> {
        let mut agents: Vec<AgentProfile> = self.agents.read().unwrap().values().cloned().collect();
        agents.sort_by_key(|a| a.created_at);
        Ok(agents)
    }

    async fn create_task(&self, task: &Task) -> Result<()> {
        self.tasks.write().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read().unwrap().get(&id).cloned())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        self.tasks.write().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn count_tasks_by_status(&self, status: TaskStatus) -> Result<u64> {
        Ok(self
            .tasks
            .read()
            .unwrap()
            .values()
            .filter(|t| t.status == status)
            .count() as u64)
    }

    async fn list_unfinished_tasks(&self) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .unwrap()
            .values()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn create_document(&self, document: &Document) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    async fn update_document(&self, document: &Document) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut documents: Vec<Document> =
            self.documents.read().unwrap().values().cloned().collect();
        documents.sort_by_key(|d| d.uploaded_at);
        Ok(documents)
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let removed = self.documents.write().unwrap().remove(&id).is_some();
        if removed {
            self.chunks
                .write()
                .unwrap()
                .retain(|chunk| chunk.document_id != id);
        }
        Ok(removed)
    }

    async fn create_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        self.chunks.write().unwrap().extend_from_slice(chunks);
        Ok(())
    }

    async fn count_chunks(&self) -> Result<usize> {
        Ok(self.chunks.read().unwrap().len())
    }

    async fn search_chunks(
        &self,
        fingerprint: &[f32],
        top_k: usize,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        let chunks = self.chunks.read().unwrap();
        Ok(rank_chunks(fingerprint, &chunks, top_k))
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.workflows
            .write()
            .unwrap()
            .insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().unwrap().get(&id).cloned())
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.workflows
            .write()
            .unwrap()
            .insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> =
            self.workflows.read().unwrap().values().cloned().collect();
        workflows.sort_by_key(|w| w.created_at);
        Ok(workflows)
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<()> {
        self.runs.write().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<()> {
        self.runs.write().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<WorkflowRun>> {
        Ok(self.runs.read().unwrap().get(&id).cloned())
    }

    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowRun>> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .read()
            .unwrap()
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }

    async fn record_metric(&self, snapshot: &MetricSnapshot) -> Result<()> {
        self.metrics.write().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn latest_metric(&self) -> Result<Option<MetricSnapshot>> {
        Ok(self.metrics.read().unwrap().last().cloned())
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        self.users
            .write()
            .unwrap()
            .insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.read().unwrap().get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fingerprint;
    use crate::types::AgentKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_agent_roundtrip() {
        let store = InMemoryStore::new();
        let agent = AgentProfile::new(AgentKind::Research, "Research Agent", "", vec![]);
        store.create_agent(&agent).await.unwrap();

        let fetched = store.get_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Research Agent");
        assert_eq!(store.list_agents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_task_status_counting() {
        let store = InMemoryStore::new();
        let mut task = Task::new(AgentKind::Coding, "p", json!({}));
        store.create_task(&task).await.unwrap();

        assert_eq!(
            store
                .count_tasks_by_status(TaskStatus::Pending)
                .await
                .unwrap(),
            1
        );

        task.mark_running(AgentId::new_v4());
        task.mark_completed("done".to_string(), 0.9, 0.1);
        store.update_task(&task).await.unwrap();

        assert_eq!(
            store
                .count_tasks_by_status(TaskStatus::Pending)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .count_tasks_by_status(TaskStatus::Completed)
                .await
                .unwrap(),
            1
        );
        assert!(store.list_unfinished_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_removes_chunks() {
        let store = InMemoryStore::new();
        let document = Document::new("a.txt");
        store.create_document(&document).await.unwrap();

        let chunk = DocumentChunk::new(document.id, 0, "text", fingerprint("text"), 0);
        store.create_chunks(&[chunk]).await.unwrap();
        assert_eq!(store.count_chunks().await.unwrap(), 1);

        assert!(store.delete_document(document.id).await.unwrap());
        assert_eq!(store.count_chunks().await.unwrap(), 0);
        assert!(!store.delete_document(document.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_search_respects_top_k() {
        let store = InMemoryStore::new();
        let document = Document::new("a.txt");
        store.create_document(&document).await.unwrap();

        let chunks: Vec<DocumentChunk> = (0..5)
            .map(|i| {
                let text = format!("chunk number {} about orchestration", i);
                DocumentChunk::new(document.id, i, &text, fingerprint(&text), 0)
            })
            .collect();
        store.create_chunks(&chunks).await.unwrap();

        let hits = store
            .search_chunks(&fingerprint("orchestration"), 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_metrics_append_only_latest_wins() {
        let store = InMemoryStore::new();
        let mut snapshot = MetricSnapshot {
            timestamp: chrono::Utc::now(),
            active_agents: 4,
            completed_tasks: 1,
            failed_tasks: 0,
            avg_response_time_secs: 0.5,
            total_documents: 0,
            total_chunks: 0,
        };
        store.record_metric(&snapshot).await.unwrap();
        snapshot.completed_tasks = 2;
        store.record_metric(&snapshot).await.unwrap();

        let latest = store.latest_metric().await.unwrap().unwrap();
        assert_eq!(latest.completed_tasks, 2);
    }

    #[tokio::test]
    async fn test_run_listing_by_workflow() {
        let store = InMemoryStore::new();
        let workflow = Workflow::new("wf", "", vec![]);
        store.create_workflow(&workflow).await.unwrap();

        let run_a = WorkflowRun::new(workflow.id);
        let run_b = WorkflowRun::new(WorkflowId::new_v4());
        store.create_run(&run_a).await.unwrap();
        store.create_run(&run_b).await.unwrap();

        let runs = store.list_runs(workflow.id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run_a.id);
    }
}
