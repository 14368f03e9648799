use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use knowledge_server::api::{create_router, AppState};
use knowledge_server::application::{
    ChatService, IngestionCoordinator, IngestionDeps, IngestionSettings, RagService,
};
use knowledge_server::domain::ports::EmbeddingService;
use knowledge_server::domain::{DomainError, Embedding, TokenChunker};
use knowledge_server::infrastructure::config::{GenerationConfig, RegistryConfig};
use knowledge_server::infrastructure::{
    AppConfig, FsDocumentSource, HashingEmbedding, HttpRegistryNotifier, InMemoryStatusStore,
    InMemoryVectorStore, OpenAiChatClient,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIM: usize = 64;

struct TestApp {
    router: Router,
    docs: TempDir,
    registry: MockServer,
    llm: MockServer,
}

/// Embedder whose batches never finish, keeping ingestion workers busy.
struct StalledEmbedding;

#[async_trait::async_trait]
impl EmbeddingService for StalledEmbedding {
    async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
        std::future::pending().await
    }

    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        std::future::pending().await
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

impl TestApp {
    async fn new() -> Self {
        Self::with_ingestion(
            Arc::new(HashingEmbedding::new(DIM).unwrap()),
            IngestionSettings::default(),
        )
        .await
    }

    async fn with_ingestion(
        ingest_embedding: Arc<dyn EmbeddingService>,
        settings: IngestionSettings,
    ) -> Self {
        let docs = TempDir::new().unwrap();
        let registry = MockServer::start().await;
        let llm = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&registry)
            .await;

        let embedding = Arc::new(HashingEmbedding::new(DIM).unwrap());
        let vector_store = Arc::new(InMemoryVectorStore::new(DIM));
        let notifier = HttpRegistryNotifier::new(
            registry.uri(),
            &RegistryConfig {
                base_url: Some(registry.uri()),
                timeout_seconds: 2,
                max_attempts: 1,
                backoff_millis: 10,
            },
        )
        .unwrap();

        let ingestion = IngestionCoordinator::start(
            IngestionDeps {
                documents: Arc::new(FsDocumentSource::new(docs.path())),
                embedding: ingest_embedding,
                vector_store: vector_store.clone(),
                status_store: Arc::new(InMemoryStatusStore::new()),
                notifier: Some(Arc::new(notifier)),
            },
            TokenChunker::default(),
            settings,
        )
        .unwrap();

        let generation = OpenAiChatClient::new(&GenerationConfig {
            base_url: format!("{}/v1", llm.uri()),
            model: "test-model".to_string(),
            api_key: None,
            timeout_seconds: 2,
        })
        .unwrap();

        let rag = Arc::new(RagService::new(embedding, vector_store.clone(), 5));
        let chat = Arc::new(ChatService::new(rag.clone(), Arc::new(generation)));
        let state = AppState::new(
            Arc::new(ingestion),
            rag,
            chat,
            vector_store,
            AppConfig::default(),
        );

        Self {
            router: create_router(state),
            docs,
            registry,
            llm,
        }
    }

    fn write(&self, agent: &str, name: &str, content: &str) {
        let dir = self.docs.path().join(agent);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_until_idle(&self, agent: &str) -> Value {
        for _ in 0..500 {
            let (status, body) = self
                .send("GET", &format!("/agents/{agent}/status"), None)
                .await;
            if status == StatusCode::OK && body["status"] != "IN_PROGRESS" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("agent {agent} never left IN_PROGRESS");
    }
}

/// Message content arrives either as a string or as text parts.
fn text_of(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

#[tokio::test]
async fn health_reports_version() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn ready_without_redis_checks_vector_store() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", "/ready", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vector_store"], "connected");
    assert!(body.get("redis").is_none());
}

#[tokio::test]
async fn generate_then_query_returns_indexed_text() {
    let app = TestApp::new().await;
    app.write("support", "refunds.txt", "Refunds are issued within 30 days.");
    app.write("support", "shipping.txt", "Orders ship in five business days.");

    let (status, body) = app
        .send("POST", "/generate", Some(json!({ "agent_name": "Support" })))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["agent_name"], "support");

    let settled = app.wait_until_idle("support").await;
    assert_eq!(settled["status"], "IDLE");
    assert_eq!(settled["chunks"], 2);

    let (status, body) = app
        .send(
            "POST",
            "/query",
            Some(json!({
                "agent_name": "support",
                "prompt": "Refunds are issued within 30 days.",
                "top_k": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!(["Refunds are issued within 30 days."]));
}

#[tokio::test]
async fn completed_run_notifies_registry() {
    let app = TestApp::new().await;
    app.write("notes", "a.txt", "remember the milk");

    app.send("POST", "/generate", Some(json!({ "agent_name": "notes" })))
        .await;
    app.wait_until_idle("notes").await;

    for _ in 0..200 {
        let requests = app.registry.received_requests().await.unwrap_or_default();
        if let Some(request) = requests.first() {
            assert_eq!(
                request.url.path(),
                "/api/agents/notes/update-embeddings-status"
            );
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            assert_eq!(
                body,
                json!({ "agent_name": "notes", "embeddings_status": "IDLE" })
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry was never notified");
}

#[tokio::test]
async fn generate_unknown_agent_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send("POST", "/generate", Some(json!({ "agent_name": "nobody" })))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn invalid_agent_name_is_bad_request() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send("POST", "/generate", Some(json!({ "agent_name": "!!!" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_of_untriggered_agent_is_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app.send("GET", "/agents/fresh/status", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_for_agent_without_documents_is_empty() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(
            "POST",
            "/query",
            Some(json!({ "agent_name": "empty", "prompt": "anything" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn chat_returns_backend_reply() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello!" },
                "finish_reason": "stop"
            }]
        })))
        .mount(&app.llm)
        .await;

    let (status, body) = app
        .send(
            "POST",
            "/chat/helper",
            Some(json!({
                "instructions": "You are helpful",
                "input": "Hi",
                "messages": [{ "role": "user", "content": "earlier" }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": true, "role": "assistant", "content": "Hello!" })
    );

    let requests = app.llm.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let turns: Vec<(String, String)> = sent["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| (m["role"].as_str().unwrap().to_string(), text_of(&m["content"])))
        .collect();
    assert_eq!(
        turns,
        vec![
            ("system".to_string(), "You are helpful".to_string()),
            ("user".to_string(), "earlier".to_string()),
            ("user".to_string(), "Hi".to_string()),
        ]
    );
}

#[tokio::test]
async fn chat_backend_failure_is_reported_in_body() {
    let app = TestApp::new().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&app.llm)
        .await;

    let (status, body) = app
        .send(
            "POST",
            "/chat/helper",
            Some(json!({ "instructions": "sys", "input": "Hi" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["role"], "assistant");
}

#[tokio::test]
async fn delete_collection_empties_agent_index() {
    let app = TestApp::new().await;
    app.write("temp", "a.txt", "short lived knowledge");

    app.send("POST", "/generate", Some(json!({ "agent_name": "temp" })))
        .await;
    app.wait_until_idle("temp").await;

    let (status, _) = app.send("DELETE", "/agents/temp/collection", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app
        .send(
            "POST",
            "/query",
            Some(json!({ "agent_name": "temp", "prompt": "short lived knowledge" })),
        )
        .await;
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn full_ingestion_queue_is_service_unavailable() {
    let app = TestApp::with_ingestion(
        Arc::new(StalledEmbedding),
        IngestionSettings {
            workers: 1,
            queue_capacity: 1,
            ..Default::default()
        },
    )
    .await;

    let mut statuses = Vec::new();
    for i in 0..6 {
        let agent = format!("busy{i}");
        app.write(&agent, "doc.txt", "waiting for a worker");
        let (status, body) = app
            .send("POST", "/generate", Some(json!({ "agent_name": agent })))
            .await;
        statuses.push(status);
        if status == StatusCode::SERVICE_UNAVAILABLE {
            assert!(body["error"].as_str().is_some());
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(statuses.last(), Some(&StatusCode::SERVICE_UNAVAILABLE));
    assert!(statuses[..statuses.len() - 1]
        .iter()
        .all(|s| *s == StatusCode::ACCEPTED));
}
