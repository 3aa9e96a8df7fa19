//! Sends one HTTP request to a backend agent and normalizes the outcome.
//!
//! # Routes
//!
//! | Target | Method | Path | Body |
//! |--------|--------|------|------|
//! | collector (with file) | `POST` | `/api/files/upload` | multipart field `file` |
//! | collector | `GET` | `/api/health` | none |
//! | knowledge | `POST` | `/api/knowledge/search` | `{"query": <message>, "max_results": 5}` |
//! | database | `GET` | `/api/analytics/` | none |
//! | transformer | `GET` | `/api/transformer/health` | none |
//! | orchestrator | `GET` | `/api/orchestrator/status` | none |
//!
//! # Failure handling
//!
//! Every call makes exactly one attempt. Failures never escape as errors:
//! they are typed internally as [`DispatchError`] and turned into a
//! [`DispatchResult`] with `succeeded == false` and a readable message.
//!
//! - non-2xx → `"<Agent> is currently unavailable. Please try again later."`
//! - connection error, timeout, or a body that is not JSON → the agent name
//!   plus the underlying error text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::{Config, TargetsConfig};
use crate::respond;
use crate::target::Target;

/// File extensions offered by the attachment pickers. Not enforced here.
pub const ADVISORY_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "csv", "xlsx", "jpg", "jpeg", "png",
];

/// Upload endpoint on the collector.
pub const UPLOAD_PATH: &str = "/api/files/upload";

/// Number of results requested from the knowledge search.
pub const KNOWLEDGE_MAX_RESULTS: u32 = 5;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a file from disk, naming the attachment after its file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attachment: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("attachment path has no file name: {}", path.display()))?;
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the extension is one the pickers offer.
    pub fn has_advisory_extension(&self) -> bool {
        match self.name.rsplit_once('.') {
            Some((_, ext)) => ADVISORY_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
            None => false,
        }
    }
}

/// Normalized outcome of a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub succeeded: bool,
    pub display_text: String,
    /// Parsed response body on success.
    pub raw_payload: Option<Value>,
}

impl DispatchResult {
    fn ok(display_text: String, payload: Value) -> Self {
        Self {
            succeeded: true,
            display_text,
            raw_payload: Some(payload),
        }
    }

    fn failed(display_text: String) -> Self {
        Self {
            succeeded: false,
            display_text,
            raw_payload: None,
        }
    }
}

/// Why a backend call failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP {status}")]
    Status { status: StatusCode },

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    #[error("response was not valid JSON: {0}")]
    Decode(String),
}

/// HTTP method used by a [`Route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Fixed endpoint for a target when no file is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: &'static str,
}

pub fn route_for(target: Target) -> Route {
    match target {
        Target::Collector => Route {
            method: Method::Get,
            path: "/api/health",
        },
        Target::Knowledge => Route {
            method: Method::Post,
            path: "/api/knowledge/search",
        },
        Target::Database => Route {
            method: Method::Get,
            path: "/api/analytics/",
        },
        Target::Transformer => Route {
            method: Method::Get,
            path: "/api/transformer/health",
        },
        Target::Orchestrator => Route {
            method: Method::Get,
            path: "/api/orchestrator/status",
        },
    }
}

/// JSON body sent with the request, if the route takes one.
pub fn request_body(target: Target, message: &str) -> Option<Value> {
    match target {
        Target::Knowledge => Some(serde_json::json!({
            "query": message,
            "max_results": KNOWLEDGE_MAX_RESULTS,
        })),
        _ => None,
    }
}

/// Something that can carry a message to a backend agent.
///
/// Implementations must not fail: every problem is reported through
/// [`DispatchResult::succeeded`].
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        target: Target,
        message: &str,
        file: Option<Attachment>,
    ) -> DispatchResult;
}

/// [`Dispatch`] implementation backed by `reqwest`.
pub struct HttpDispatcher {
    client: reqwest::Client,
    targets: TargetsConfig,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = config.dispatch.timeout();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            targets: config.targets.clone(),
            timeout,
        })
    }

    /// Full URL for `path` on `target`.
    pub fn url(&self, target: Target, path: &str) -> String {
        format!("{}{}", self.targets.base_url(target), path)
    }

    async fn upload(&self, file: Attachment) -> std::result::Result<Value, DispatchError> {
        let url = self.url(Target::Collector, UPLOAD_PATH);
        let mut part = Part::bytes(file.bytes).file_name(file.name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| DispatchError::Transport(error_chain(&e)))?;
        }
        let form = Form::new().part("file", part);
        tracing::debug!(%url, "POST multipart");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        read_json(response).await
    }

    async fn call(&self, target: Target, message: &str) -> std::result::Result<Value, DispatchError> {
        let route = route_for(target);
        let url = self.url(target, route.path);

        let request = match route.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let request = match request_body(target, message) {
            Some(body) => request
                .header("Content-Type", "application/json")
                .json(&body),
            None => request,
        };

        tracing::debug!(agent = %target, method = ?route.method, %url, "calling agent");
        let response = request.send().await.map_err(|e| self.send_error(e))?;
        tracing::debug!(agent = %target, status = %response.status(), "agent responded");
        read_json(response).await
    }

    fn send_error(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout(self.timeout)
        } else {
            DispatchError::Transport(error_chain(&e))
        }
    }
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn dispatch(
        &self,
        target: Target,
        message: &str,
        file: Option<Attachment>,
    ) -> DispatchResult {
        let started = Instant::now();

        let result = match (target, file) {
            (Target::Collector, Some(file)) => {
                let name = file.name.clone();
                tracing::info!(agent = %target, file = %name, bytes = file.size(), "uploading attachment");
                let outcome = self.upload(file).await;
                upload_result(&name, outcome)
            }
            (_, file) => {
                if let Some(file) = file {
                    tracing::debug!(agent = %target, file = %file.name, "attachment not sent to this target");
                }
                let outcome = self.call(target, message).await;
                call_result(target, message, outcome)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if result.succeeded {
            tracing::info!(agent = %target, elapsed_ms, "dispatch succeeded");
        } else {
            tracing::warn!(agent = %target, elapsed_ms, text = %result.display_text, "dispatch failed");
        }
        result
    }
}

/// Turn the outcome of an upload into a [`DispatchResult`].
pub fn upload_result(
    file_name: &str,
    outcome: std::result::Result<Value, DispatchError>,
) -> DispatchResult {
    let collector = Target::Collector.display_name();
    match outcome {
        Ok(payload) => {
            let extracted = payload
                .get("extracted_data")
                .is_some_and(|v| !v.is_null());
            let detail = if extracted {
                "Extracted content and metadata are available."
            } else {
                "No extracted content was returned yet; processing may still be running."
            };
            DispatchResult::ok(
                format!("Uploaded \"{}\" to the {}. {}", file_name, collector, detail),
                payload,
            )
        }
        Err(DispatchError::Status { status }) => DispatchResult::failed(format!(
            "Upload of \"{}\" failed: the {} responded with HTTP {}.",
            file_name, collector, status
        )),
        Err(e) => DispatchResult::failed(format!(
            "Upload of \"{}\" failed: could not reach the {} ({}).",
            file_name, collector, e
        )),
    }
}

/// Turn the outcome of a regular call into a [`DispatchResult`].
pub fn call_result(
    target: Target,
    message: &str,
    outcome: std::result::Result<Value, DispatchError>,
) -> DispatchResult {
    let name = target.display_name();
    match outcome {
        Ok(payload) => DispatchResult::ok(respond::format(target, message, &payload), payload),
        Err(DispatchError::Status { status }) => {
            tracing::debug!(agent = %target, %status, "backend returned error status");
            DispatchResult::failed(format!(
                "{} is currently unavailable. Please try again later.",
                name
            ))
        }
        Err(e) => DispatchResult::failed(format!("Error connecting to {}: {}", name, e)),
    }
}

async fn read_json(response: reqwest::Response) -> std::result::Result<Value, DispatchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(DispatchError::Status { status });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| DispatchError::Transport(error_chain(&e)))?;
    serde_json::from_slice(&bytes).map_err(|e| DispatchError::Decode(e.to_string()))
}

/// Render an error together with its sources, e.g.
/// `error sending request: connection refused`.
pub(crate) fn error_chain(e: &dyn std::error::Error) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let inner_text = inner.to_string();
        if !text.contains(&inner_text) {
            text.push_str(": ");
            text.push_str(&inner_text);
        }
        source = inner.source();
    }
    text
}
