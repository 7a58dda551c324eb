use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::ingest::DocumentProcessor;
use crate::search::{fingerprint, SearchResult};
use crate::storage::Storage;
use crate::types::{
    AgentKind, AgentProfile, Document, DocumentChunk, Task, Workflow, WorkflowRun, WorkflowStep,
};

pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

#[derive(Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub status: crate::orchestrator::SystemStatus,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, ApiError> {
    let status = state.orchestrator.system_status().await?;
    Ok(Json(MetricsResponse {
        status,
        timestamp: Utc::now(),
    }))
}

pub async fn agents_status(
    State(state): State<AppState>,
) -> Result<Json<Vec<AgentProfile>>, ApiError> {
    Ok(Json(state.storage.list_agents().await?))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AgentProfile>, ApiError> {
    state
        .storage
        .get_agent(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("agent {id} not found")))
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub task: Task,
    pub reply: Option<crate::types::AgentReply>,
}

pub async fn create_task(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let kind = AgentKind::parse(&kind)
        .ok_or_else(|| ApiError::NotFound(format!("no agent registered for kind: {kind}")))?;
    if request.prompt.trim().is_empty() {
        return Err(ApiError::Validation("prompt must not be empty".to_string()));
    }

    let context = match request.context {
        Some(Value::Object(entries)) => Value::Object(entries),
        Some(_) => {
            return Err(ApiError::Validation(
                "context must be a JSON object".to_string(),
            ))
        }
        None => Value::Object(Default::default()),
    };

    let outcome = state
        .orchestrator
        .submit(kind, request.prompt, context)
        .await?;
    Ok(Json(TaskResponse {
        task: outcome.task,
        reply: outcome.reply,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    state
        .storage
        .get_task(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))
}

#[derive(Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub file_name: String,
    pub status: crate::types::DocumentStatus,
    pub word_count: usize,
    pub chunk_count: usize,
    pub keywords: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<Document> for DocumentSummary {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            file_name: document.file_name,
            status: document.status,
            word_count: document.word_count,
            chunk_count: document.chunk_count,
            keywords: document.keywords,
            uploaded_at: document.uploaded_at,
            processed_at: document.processed_at,
        }
    }
}

pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DocumentSummary>, ApiError> {
    let mut payload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        if let Some(file_name) = field.file_name().map(String::from) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("failed to read upload: {e}")))?;
            payload = Some((file_name, bytes.to_vec()));
            break;
        }
    }

    let Some((file_name, bytes)) = payload else {
        return Err(ApiError::Validation(
            "multipart body contains no file field".to_string(),
        ));
    };
    if !DocumentProcessor::supports(&file_name) {
        return Err(ApiError::Validation(format!(
            "unsupported file format: {file_name}"
        )));
    }

    // The record is created first so a failed extraction still leaves an
    // inspectable document row.
    let mut document = Document::new(&file_name);
    state.storage.create_document(&document).await?;

    match state.processor.process(&file_name, &bytes) {
        Ok(processed) => {
            let chunks: Vec<DocumentChunk> = processed
                .chunks
                .iter()
                .enumerate()
                .map(|(index, span)| {
                    DocumentChunk::new(
                        document.id,
                        index,
                        &span.text,
                        fingerprint(&span.text),
                        span.start_offset,
                    )
                })
                .collect();

            document.mark_ready(
                processed.content,
                processed.word_count,
                processed.keywords,
                chunks.len(),
            );
            state.storage.create_chunks(&chunks).await?;
            state.storage.update_document(&document).await?;

            tracing::info!(
                document_id = %document.id,
                file_name = %document.file_name,
                chunks = document.chunk_count,
                "document ingested"
            );
            Ok(Json(DocumentSummary::from(document)))
        }
        Err(err) => {
            document.mark_failed();
            state.storage.update_document(&document).await?;
            tracing::warn!(document_id = %document.id, error = %err, "document processing failed");
            Err(ApiError::Validation(err.to_string()))
        }
    }
}

pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let documents = state.storage.list_documents().await?;
    Ok(Json(
        documents.into_iter().map(DocumentSummary::from).collect(),
    ))
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

pub async fn search_documents(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResult>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::Validation("query must not be empty".to_string()));
    }
    let top_k = request.top_k.unwrap_or(state.top_k).max(1);

    let query_fingerprint = fingerprint(&request.query);
    let ranked = state
        .storage
        .search_chunks(&query_fingerprint, top_k)
        .await?;
    Ok(Json(SearchResult::from_ranked(request.query, ranked)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if state.storage.delete_document(id).await? {
        Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
    } else {
        Err(ApiError::NotFound(format!("document {id} not found")))
    }
}

#[derive(Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
}

pub async fn create_workflow(
    State(state): State<AppState>,
    Json(request): Json<CreateWorkflowRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = Workflow::new(request.name, request.description, request.steps);
    workflow
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    state.storage.create_workflow(&workflow).await?;
    Ok(Json(workflow))
}

pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<Vec<Workflow>>, ApiError> {
    Ok(Json(state.storage.list_workflows().await?))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .storage
        .get_workflow(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("workflow {id} not found")))
}

pub async fn run_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowRun>, ApiError> {
    let run = state.orchestrator.run_workflow(id).await?;
    Ok(Json(run))
}

pub async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WorkflowRun>>, ApiError> {
    if state.storage.get_workflow(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("workflow {id} not found")));
    }
    Ok(Json(state.storage.list_runs(id).await?))
}
