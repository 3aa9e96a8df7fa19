//! HTTP chat API.
//!
//! Serves one conversation [`Session`] over JSON so that a browser or any
//! other HTTP client can drive the console the same way `acon chat` does.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/targets` | The five agents with their configured base URLs |
//! | `GET`  | `/transcript` | Transcript export document |
//! | `POST` | `/messages` | Send a message (JSON `{"text"}` or multipart `text` + `file`) |
//! | `GET`  | `/attachment` | The staged attachment, if any |
//! | `PUT`  | `/attachment` | Stage a file (multipart field `file`) |
//! | `DELETE` | `/attachment` | Drop the staged attachment |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "busy", "message": "a message is already being sent" } }
//! ```
//!
//! Error codes: `bad_request` (400), `empty_message` (400), `busy` (409),
//! `internal` (500).
//! A backend failure is not an HTTP error: `POST /messages` answers 200 with
//! `succeeded: false` in the report.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::dispatch::{Attachment, HttpDispatcher};
use crate::export::TranscriptExport;
use crate::session::{AttachmentRef, SendError, SendReport, Session};
use crate::target::Target;

/// Largest request body accepted, attachments included.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    session: Arc<Session>,
}

/// Starts the chat API server.
///
/// Binds to `[server].bind` and serves a fresh session backed by
/// [`HttpDispatcher`] until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let dispatcher = HttpDispatcher::new(config)?;
    let session = Arc::new(Session::new(Arc::new(dispatcher)));
    let app = router(Arc::new(config.clone()), session);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(bind = %bind_addr, "chat API listening");
    println!("Chat API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router for `session`.
pub fn router(config: Arc<Config>, session: Arc<Session>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/targets", get(handle_targets))
        .route("/transcript", get(handle_transcript))
        .route("/messages", post(handle_send))
        .route(
            "/attachment",
            get(handle_get_attachment)
                .put(handle_put_attachment)
                .delete(handle_delete_attachment),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(AppState { config, session })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<SendError> for AppError {
    fn from(e: SendError) -> Self {
        let (status, code) = match e {
            SendError::Busy => (StatusCode::CONFLICT, "busy"),
            SendError::Empty => (StatusCode::BAD_REQUEST, "empty_message"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: e.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /targets ============

#[derive(Serialize)]
struct TargetEntry {
    id: Target,
    display_name: &'static str,
    tag: &'static str,
    description: &'static str,
    base_url: String,
}

#[derive(Serialize)]
struct TargetListResponse {
    targets: Vec<TargetEntry>,
}

async fn handle_targets(State(state): State<AppState>) -> Json<TargetListResponse> {
    let targets = Target::ALL
        .into_iter()
        .map(|t| {
            let info = t.info();
            TargetEntry {
                id: t,
                display_name: info.display_name,
                tag: info.tag,
                description: info.description,
                base_url: state.config.targets.base_url(t).to_string(),
            }
        })
        .collect();
    Json(TargetListResponse { targets })
}

// ============ GET /transcript ============

async fn handle_transcript(State(state): State<AppState>) -> Json<TranscriptExport> {
    Json(TranscriptExport::of(&state.session))
}

// ============ POST /messages ============

#[derive(Deserialize)]
struct SendRequest {
    #[serde(default)]
    text: String,
}

/// Handler for `POST /messages`.
///
/// A multipart `file` field replaces any staged attachment before the send.
/// Once started, the send completes even if the client goes away.
async fn handle_send(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<SendReport>, AppError> {
    let text = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        let (text, file) = read_form(multipart).await?;
        if let Some(file) = file {
            state.session.stage_pending_file(file)?;
        }
        text.unwrap_or_default()
    } else {
        let Json(body) = Json::<SendRequest>::from_request(request, &state)
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        body.text
    };

    // Runs on its own task so a dropped connection cannot cancel the send
    // between the user turn and the agent turn.
    let session = state.session.clone();
    let report = tokio::spawn(async move { session.send(&text).await })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "send task failed");
            internal_error(e.to_string())
        })?
        .map_err(|e| {
            tracing::debug!(error = %e, "send rejected");
            AppError::from(e)
        })?;
    tracing::debug!(agent = %report.target, succeeded = report.succeeded, "POST /messages");
    Ok(Json(report))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// Collect the `text` and `file` fields of a form. Other fields are ignored.
async fn read_form(mut multipart: Multipart) -> Result<(Option<String>, Option<Attachment>), AppError> {
    let mut text = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        match field.name() {
            Some("text") => {
                text = Some(field.text().await.map_err(|e| bad_request(e.body_text()))?);
            }
            Some("file") => {
                let name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or("upload")
                    .to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| bad_request(e.body_text()))?;
                let mut attachment = Attachment::new(name, bytes.to_vec());
                if let Some(ct) = content_type {
                    attachment = attachment.with_content_type(ct);
                }
                file = Some(attachment);
            }
            _ => {}
        }
    }

    Ok((text, file))
}

// ============ /attachment ============

#[derive(Serialize)]
struct AttachmentResponse {
    pending: Option<AttachmentRef>,
    /// The attachment that was replaced or removed by this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<AttachmentRef>,
}

async fn handle_get_attachment(State(state): State<AppState>) -> Json<AttachmentResponse> {
    Json(AttachmentResponse {
        pending: state.session.pending_file(),
        previous: None,
    })
}

async fn handle_put_attachment(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AttachmentResponse>, AppError> {
    let (_, file) = read_form(multipart).await?;
    let file = file.ok_or_else(|| bad_request("multipart field 'file' is required"))?;
    let replaced = state.session.stage_pending_file(file)?;
    Ok(Json(AttachmentResponse {
        pending: state.session.pending_file(),
        previous: replaced.as_ref().map(AttachmentRef::from),
    }))
}

async fn handle_delete_attachment(State(state): State<AppState>) -> Json<AttachmentResponse> {
    let removed = state.session.clear_pending_file();
    Json(AttachmentResponse {
        pending: None,
        previous: removed.as_ref().map(AttachmentRef::from),
    })
}
