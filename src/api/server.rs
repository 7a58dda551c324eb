use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::ingest::DocumentProcessor;
use crate::orchestrator::Orchestrator;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub storage: Arc<dyn Storage>,
    pub processor: DocumentProcessor,
    pub top_k: usize,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
        .route("/agents/status", get(handlers::agents_status))
        // The :id segment carries an agent kind for task submission; the
        // router requires one parameter name per position.
        .route("/agents/:id", get(handlers::get_agent))
        .route("/agents/:id/tasks", post(handlers::create_task))
        .route("/tasks/:id", get(handlers::get_task))
        .route("/documents", post(handlers::upload_document))
        .route("/documents", get(handlers::list_documents))
        .route("/documents/search", post(handlers::search_documents))
        .route("/documents/:id", delete(handlers::delete_document))
        .route("/workflows", post(handlers::create_workflow))
        .route("/workflows", get(handlers::list_workflows))
        .route("/workflows/:id", get(handlers::get_workflow))
        .route("/workflows/:id/run", post(handlers::run_workflow))
        .route("/workflows/:id/runs", get(handlers::list_runs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16, metrics_interval: Duration) -> Result<()> {
    spawn_metrics_loop(state.orchestrator.clone(), metrics_interval);

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(%host, port, "maestro API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Append a metric snapshot on a fixed cadence for as long as the
/// server lives.
fn spawn_metrics_loop(orchestrator: Arc<Orchestrator>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            if let Err(err) = orchestrator.snapshot_metrics().await {
                tracing::warn!(error = %err, "metric snapshot failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::orchestrator::OrchestratorConfig;
    use crate::providers::llm::MockLlmProvider;
    use crate::storage::InMemoryStore;

    fn confident_answer() -> String {
        format!(
            "Summary: the findings for 2024 are structured and detailed below. {}",
            "Each finding is supported by concrete evidence and careful analysis. ".repeat(20)
        )
    }

    async fn create_test_app() -> (Router, Arc<MockLlmProvider>, Arc<InMemoryStore>) {
        let llm = Arc::new(MockLlmProvider::with_response(confident_answer()));
        let storage = Arc::new(InMemoryStore::new());
        let orchestrator = Arc::new(Orchestrator::new(
            storage.clone(),
            llm.clone(),
            OrchestratorConfig {
                max_concurrent_tasks: 4,
            },
        ));
        orchestrator.initialize().await.unwrap();

        let state = AppState {
            orchestrator,
            storage: storage.clone() as Arc<dyn Storage>,
            processor: DocumentProcessor::new(200, 40),
            top_k: 5,
        };
        (create_router(state), llm, storage)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_metrics() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total_agents"], 4);
        assert_eq!(json["completed_tasks"], 0);
    }

    #[tokio::test]
    async fn test_agents_status_lists_default_set() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/agents/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_submit_task_roundtrip() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/agents/document/tasks",
                json!({"prompt": "Summarize X"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["task"]["status"], "completed");
        let confidence = json["reply"]["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[tokio::test]
    async fn test_unknown_agent_kind_is_404_without_llm_call() {
        let (app, llm, _) = create_test_app().await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/agents/ghost/tasks",
                json!({"prompt": "boo"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_validation_error() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/agents/research/tasks",
                json!({"prompt": "   "}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    fn multipart_upload(uri: &str, file_name: &str, content: &str) -> Request<Body> {
        let boundary = "maestro-test-boundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n--{boundary}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_document_upload_list_search_delete() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .clone()
            .oneshot(multipart_upload(
                "/documents",
                "notes.txt",
                "Maestro routes agent tasks through a permit pool and chunks documents for search.",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let uploaded = body_json(response).await;
        assert_eq!(uploaded["status"], "ready");
        let document_id = uploaded["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/documents")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/documents/search",
                json!({"query": "permit pool agent tasks", "top_k": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let search = body_json(response).await;
        assert!(!search["hits"].as_array().unwrap().is_empty());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/documents/{document_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/documents/{document_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_dedup_creates_two_documents() {
        let (app, _, _) = create_test_app().await;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(multipart_upload(
                    "/documents",
                    "same.txt",
                    "identical content uploaded twice",
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/documents")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_upload_format_is_rejected() {
        let (app, _, storage) = create_test_app().await;

        let response = app
            .oneshot(multipart_upload("/documents", "report.pdf", "%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(storage.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_with_empty_query_is_rejected() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/documents/search",
                json!({"query": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_workflow_create_run_and_history() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/workflows",
                json!({
                    "name": "research then analyze",
                    "description": "two phase demo",
                    "steps": [
                        {"id": "research", "kind": "research", "prompt": "Research topic X"},
                        {"id": "analysis", "kind": "analyst", "prompt": "Analyze: {{research}}"}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let workflow = body_json(response).await;
        let workflow_id = workflow["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/workflows/{workflow_id}/run"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let run = body_json(response).await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["step_results"].as_array().unwrap().len(), 2);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/workflows/{workflow_id}/runs"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let runs = body_json(response).await;
        assert_eq!(runs.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_workflow_with_forward_reference_is_rejected() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/workflows",
                json!({
                    "name": "broken",
                    "steps": [
                        {"id": "first", "kind": "research", "prompt": "Needs {{second}}"},
                        {"id": "second", "kind": "analyst", "prompt": "Analyze"}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_run_unknown_workflow_is_404() {
        let (app, _, _) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/workflows/00000000-0000-0000-0000-000000000000/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
