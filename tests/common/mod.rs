//! Mock backend agents shared by the integration tests.
//!
//! One axum server plays all five agents. Behaviour per route:
//!
//! | Route | Reply |
//! |-------|-------|
//! | `GET /api/health` | 200 JSON |
//! | `POST /api/files/upload` | 200 JSON, with `extracted_data` when the file name contains `extract` |
//! | `POST /api/knowledge/search` | 200 JSON echoing the query |
//! | `GET /api/analytics/` | 200 JSON |
//! | `GET /api/transformer/health` | 500 |
//! | `GET /api/orchestrator/status` | 200 with a plain-text body |

#![allow(dead_code)]

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Requests seen by the mock.
#[derive(Default)]
pub struct Recorded {
    pub knowledge_bodies: Mutex<Vec<Value>>,
    pub uploads: Mutex<Vec<(String, usize)>>,
}

pub fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// A running mock. The server task is aborted on drop.
pub struct MockAgents {
    pub port: u16,
    pub recorded: Arc<Recorded>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockAgents {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for MockAgents {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start the mock. Every route sleeps for `delay` before answering.
pub async fn start_mock_agents(delay: Duration) -> MockAgents {
    let recorded = Arc::new(Recorded::default());
    let state = (recorded.clone(), delay);

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/health", get(collector_health))
        .route("/api/files/upload", post(upload))
        .route("/api/knowledge/search", post(knowledge_search))
        .route("/api/analytics/", get(analytics))
        .route("/api/transformer/health", get(transformer_health))
        .route("/api/orchestrator/status", get(orchestrator_status))
        .with_state(state);

    let port = find_free_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    wait_for_server(port).await;

    MockAgents {
        port,
        recorded,
        handle,
    }
}

type MockState = (Arc<Recorded>, Duration);

async fn collector_health(State((_, delay)): State<MockState>) -> Json<Value> {
    tokio::time::sleep(delay).await;
    Json(json!({"status": "healthy", "service": "data-collector"}))
}

async fn upload(
    State((recorded, delay)): State<MockState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    tokio::time::sleep(delay).await;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        recorded
            .uploads
            .lock()
            .unwrap()
            .push((name.clone(), bytes.len()));

        if name.contains("reject") {
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
        let extracted = if name.contains("extract") {
            json!({"text": "Quarterly revenue grew", "pages": 2})
        } else {
            Value::Null
        };
        return Ok(Json(json!({
            "file_id": "f-1",
            "filename": name,
            "size": bytes.len(),
            "extracted_data": extracted,
        })));
    }
    Err(StatusCode::BAD_REQUEST)
}

async fn knowledge_search(
    State((recorded, delay)): State<MockState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    tokio::time::sleep(delay).await;
    let query = body["query"].clone();
    recorded.knowledge_bodies.lock().unwrap().push(body);
    Json(json!({
        "query": query,
        "results": [{"title": "Vendor Onboarding Guide", "score": 0.91}],
    }))
}

async fn analytics(State((_, delay)): State<MockState>) -> Json<Value> {
    tokio::time::sleep(delay).await;
    Json(json!({"total_products": 1200, "units_sold": 127}))
}

async fn transformer_health(State((_, delay)): State<MockState>) -> StatusCode {
    tokio::time::sleep(delay).await;
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn orchestrator_status(State((_, delay)): State<MockState>) -> &'static str {
    tokio::time::sleep(delay).await;
    "all systems nominal"
}
