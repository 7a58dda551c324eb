use anyhow::Result;
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::storage::traits::Storage;
use crate::types::{
    AgentId, AgentKind, AgentProfile, AgentStatus, Document, DocumentChunk, DocumentId,
    DocumentStatus, MetricSnapshot, RunId, RunStatus, Task, TaskId, TaskStatus, User, Workflow,
    WorkflowId, WorkflowRun,
};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/V001__initial_schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn create_agent(&self, agent: &AgentProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                id, kind, name, description, status, capabilities, tasks_completed,
                tasks_failed, success_rate, avg_response_time_secs, created_at, last_active_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(agent.id)
        .bind(agent.kind.as_str())
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(agent.status.as_str())
        .bind(serde_json::to_value(&agent.capabilities)?)
        .bind(agent.tasks_completed as i64)
        .bind(agent.tasks_failed as i64)
        .bind(agent.success_rate)
        .bind(agent.avg_response_time_secs)
        .bind(agent.created_at)
        .bind(agent.last_active_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<AgentProfile>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, name, description, status, capabilities, tasks_completed,
                   tasks_failed, success_rate, avg_response_time_secs, created_at, last_active_at
            FROM agents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_agent(&r)?)),
            None => Ok(None),
        }
    }

    async fn update_agent(&self, agent: &AgentProfile) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agents
            SET status = $2, tasks_completed = $3, tasks_failed = $4, success_rate = $5,
                avg_response_time_secs = $6, last_active_at = $7
            WHERE id = $1
            "#,
        )
        .bind(agent.id)
        .bind(agent.status.as_str())
        .bind(agent.tasks_completed as i64)
        .bind(agent.tasks_failed as i64)
        .bind(agent.success_rate)
        .bind(agent.avg_response_time_secs)
        .bind(agent.last_active_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<AgentProfile>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, name, description, status, capabilities, tasks_completed,
                   tasks_failed, success_rate, avg_response_time_secs, created_at, last_active_at
            FROM agents
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_agent).collect()
    }

    async fn create_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, agent_id, kind, prompt, context, status, response, error,
                confidence, execution_time_secs, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.id)
        .bind(task.agent_id)
        .bind(task.kind.as_str())
        .bind(&task.prompt)
        .bind(&task.context)
        .bind(task.status.as_str())
        .bind(&task.response)
        .bind(&task.error)
        .bind(task.confidence)
        .bind(task.execution_time_secs)
        .bind(task.created_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(
            r#"
            SELECT id, agent_id, kind, prompt, context, status, response, error,
                   confidence, execution_time_secs, created_at, completed_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_task(&r)?)),
            None => Ok(None),
        }
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET agent_id = $2, status = $3, response = $4, error = $5, confidence = $6,
                execution_time_secs = $7, completed_at = $8
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(task.agent_id)
        .bind(task.status.as_str())
        .bind(&task.response)
        .bind(&task.error)
        .bind(task.confidence)
        .bind(task.execution_time_secs)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_tasks_by_status(&self, status: TaskStatus) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM tasks WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn list_unfinished_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, agent_id, kind, prompt, context, status, response, error,
                   confidence, execution_time_secs, created_at, completed_at
            FROM tasks
            WHERE status IN ('pending', 'running')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn create_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, file_name, content, status, word_count, keywords, chunk_count,
                uploaded_at, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(document.id)
        .bind(&document.file_name)
        .bind(&document.content)
        .bind(document.status.as_str())
        .bind(document.word_count as i64)
        .bind(serde_json::to_value(&document.keywords)?)
        .bind(document.chunk_count as i64)
        .bind(document.uploaded_at)
        .bind(document.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, file_name, content, status, word_count, keywords, chunk_count,
                   uploaded_at, processed_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_document(&r)?)),
            None => Ok(None),
        }
    }

    async fn update_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET content = $2, status = $3, word_count = $4, keywords = $5,
                chunk_count = $6, processed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(document.id)
        .bind(&document.content)
        .bind(document.status.as_str())
        .bind(document.word_count as i64)
        .bind(serde_json::to_value(&document.keywords)?)
        .bind(document.chunk_count as i64)
        .bind(document.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_name, content, status, word_count, keywords, chunk_count,
                   uploaded_at, processed_at
            FROM documents
            ORDER BY uploaded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        // Chunks go with the document via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (
                    id, document_id, chunk_index, content, fingerprint,
                    start_offset, length, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(chunk.id)
            .bind(chunk.document_id)
            .bind(chunk.chunk_index as i32)
            .bind(&chunk.content)
            .bind(Vector::from(chunk.fingerprint.clone()))
            .bind(chunk.start_offset as i64)
            .bind(chunk.length as i64)
            .bind(chunk.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn count_chunks(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM document_chunks")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(count as usize)
    }

    async fn search_chunks(
        &self,
        fingerprint: &[f32],
        top_k: usize,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        // A zero query vector has no cosine ordering; nothing can match.
        if fingerprint.iter().all(|&x| x == 0.0) {
            return Ok(Vec::new());
        }

        let query_vec = Vector::from(fingerprint.to_vec());

        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, fingerprint, start_offset,
                   length, created_at,
                   1 - (fingerprint <=> $1::vector) AS score
            FROM document_chunks
            ORDER BY score DESC, seq ASC
            LIMIT $2
            "#,
        )
        .bind(query_vec)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let chunk = row_to_chunk(r)?;
                let score: f64 = r.get("score");
                Ok((chunk, score as f32))
            })
            .collect()
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (
                id, name, description, steps, created_at, execution_count,
                success_count, last_executed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(serde_json::to_value(&workflow.steps)?)
        .bind(workflow.created_at)
        .bind(workflow.execution_count as i64)
        .bind(workflow.success_count as i64)
        .bind(workflow.last_executed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, steps, created_at, execution_count,
                   success_count, last_executed
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_workflow(&r)?)),
            None => Ok(None),
        }
    }

    async fn update_workflow(&self, workflow: &Workflow) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workflows
            SET name = $2, description = $3, steps = $4, execution_count = $5,
                success_count = $6, last_executed = $7
            WHERE id = $1
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(serde_json::to_value(&workflow.steps)?)
        .bind(workflow.execution_count as i64)
        .bind(workflow.success_count as i64)
        .bind(workflow.last_executed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, steps, created_at, execution_count,
                   success_count, last_executed
            FROM workflows
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_workflow).collect()
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_runs (
                id, workflow_id, status, step_results, summary, error, started_at,
                completed_at, execution_time_secs
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id)
        .bind(run.workflow_id)
        .bind(run.status.as_str())
        .bind(serde_json::to_value(&run.step_results)?)
        .bind(&run.summary)
        .bind(&run.error)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.execution_time_secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = $2, step_results = $3, summary = $4, error = $5,
                completed_at = $6, execution_time_secs = $7
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.status.as_str())
        .bind(serde_json::to_value(&run.step_results)?)
        .bind(&run.summary)
        .bind(&run.error)
        .bind(run.completed_at)
        .bind(run.execution_time_secs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<WorkflowRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, workflow_id, status, step_results, summary, error, started_at,
                   completed_at, execution_time_secs
            FROM workflow_runs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_run(&r)?)),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workflow_id, status, step_results, summary, error, started_at,
                   completed_at, execution_time_secs
            FROM workflow_runs
            WHERE workflow_id = $1
            ORDER BY started_at ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_run).collect()
    }

    async fn record_metric(&self, snapshot: &MetricSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO system_metrics (
                timestamp, active_agents, completed_tasks, failed_tasks,
                avg_response_time_secs, total_documents, total_chunks
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.active_agents as i32)
        .bind(snapshot.completed_tasks as i64)
        .bind(snapshot.failed_tasks as i64)
        .bind(snapshot.avg_response_time_secs)
        .bind(snapshot.total_documents as i64)
        .bind(snapshot.total_chunks as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_metric(&self) -> Result<Option<MetricSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT timestamp, active_agents, completed_tasks, failed_tasks,
                   avg_response_time_secs, total_documents, total_chunks
            FROM system_metrics
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(MetricSnapshot {
                timestamp: r.get("timestamp"),
                active_agents: r.get::<i32, _>("active_agents") as usize,
                completed_tasks: r.get::<i64, _>("completed_tasks") as u64,
                failed_tasks: r.get::<i64, _>("failed_tasks") as u64,
                avg_response_time_secs: r.get("avg_response_time_secs"),
                total_documents: r.get::<i64, _>("total_documents") as usize,
                total_chunks: r.get::<i64, _>("total_chunks") as usize,
            })),
            None => Ok(None),
        }
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, is_active, tasks_created, documents_uploaded,
                workflows_created, created_at, last_login
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.is_active)
        .bind(user.tasks_created as i64)
        .bind(user.documents_uploaded as i64)
        .bind(user.workflows_created as i64)
        .bind(user.created_at)
        .bind(user.last_login)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, email, is_active, tasks_created, documents_uploaded,
                   workflows_created, created_at, last_login
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(User {
                id: r.get("id"),
                username: r.get("username"),
                email: r.get("email"),
                is_active: r.get("is_active"),
                tasks_created: r.get::<i64, _>("tasks_created") as u64,
                documents_uploaded: r.get::<i64, _>("documents_uploaded") as u64,
                workflows_created: r.get::<i64, _>("workflows_created") as u64,
                created_at: r.get("created_at"),
                last_login: r.get("last_login"),
            })),
            None => Ok(None),
        }
    }
}

fn row_to_agent(r: &sqlx::postgres::PgRow) -> Result<AgentProfile> {
    let kind_str: String = r.get("kind");
    let status_str: String = r.get("status");
    let capabilities: Vec<String> = serde_json::from_value(r.get("capabilities"))?;

    Ok(AgentProfile {
        id: r.get("id"),
        kind: AgentKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("unknown agent kind in row: {}", kind_str))?,
        name: r.get("name"),
        description: r.get("description"),
        status: AgentStatus::parse(&status_str).unwrap_or(AgentStatus::Offline),
        capabilities,
        tasks_completed: r.get::<i64, _>("tasks_completed") as u64,
        tasks_failed: r.get::<i64, _>("tasks_failed") as u64,
        success_rate: r.get("success_rate"),
        avg_response_time_secs: r.get("avg_response_time_secs"),
        created_at: r.get("created_at"),
        last_active_at: r.get("last_active_at"),
    })
}

fn row_to_task(r: &sqlx::postgres::PgRow) -> Result<Task> {
    let kind_str: String = r.get("kind");
    let status_str: String = r.get("status");

    Ok(Task {
        id: r.get("id"),
        agent_id: r.get("agent_id"),
        kind: AgentKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("unknown agent kind in row: {}", kind_str))?,
        prompt: r.get("prompt"),
        context: r.get("context"),
        status: TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Failed),
        response: r.get("response"),
        error: r.get("error"),
        confidence: r.get("confidence"),
        execution_time_secs: r.get("execution_time_secs"),
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    })
}

fn row_to_document(r: &sqlx::postgres::PgRow) -> Result<Document> {
    let status_str: String = r.get("status");
    let keywords: Vec<String> = serde_json::from_value(r.get("keywords"))?;

    Ok(Document {
        id: r.get("id"),
        file_name: r.get("file_name"),
        content: r.get("content"),
        status: DocumentStatus::parse(&status_str).unwrap_or(DocumentStatus::Failed),
        word_count: r.get::<i64, _>("word_count") as usize,
        keywords,
        chunk_count: r.get::<i64, _>("chunk_count") as usize,
        uploaded_at: r.get("uploaded_at"),
        processed_at: r.get("processed_at"),
    })
}

fn row_to_chunk(r: &sqlx::postgres::PgRow) -> Result<DocumentChunk> {
    let fingerprint: Vector = r.get("fingerprint");

    Ok(DocumentChunk {
        id: r.get("id"),
        document_id: r.get("document_id"),
        chunk_index: r.get::<i32, _>("chunk_index") as usize,
        content: r.get("content"),
        fingerprint: fingerprint.to_vec(),
        start_offset: r.get::<i64, _>("start_offset") as usize,
        length: r.get::<i64, _>("length") as usize,
        created_at: r.get("created_at"),
    })
}

fn row_to_workflow(r: &sqlx::postgres::PgRow) -> Result<Workflow> {
    let steps = serde_json::from_value(r.get("steps"))?;

    Ok(Workflow {
        id: r.get("id"),
        name: r.get("name"),
        description: r.get("description"),
        steps,
        created_at: r.get("created_at"),
        execution_count: r.get::<i64, _>("execution_count") as u64,
        success_count: r.get::<i64, _>("success_count") as u64,
        last_executed: r.get("last_executed"),
    })
}

fn row_to_run(r: &sqlx::postgres::PgRow) -> Result<WorkflowRun> {
    let status_str: String = r.get("status");
    let step_results = serde_json::from_value(r.get("step_results"))?;

    Ok(WorkflowRun {
        id: r.get("id"),
        workflow_id: r.get("workflow_id"),
        status: RunStatus::parse(&status_str).unwrap_or(RunStatus::Failed),
        step_results,
        summary: r.get("summary"),
        error: r.get("error"),
        started_at: r.get("started_at"),
        completed_at: r.get("completed_at"),
        execution_time_secs: r.get("execution_time_secs"),
    })
}
