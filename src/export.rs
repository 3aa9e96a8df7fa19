//! Export a conversation transcript as JSON.
//!
//! The document has the shape
//! `{"session_id": ..., "exported_at": ..., "messages": [...]}` and is used by
//! `acon chat --transcript-out`, the `/export` chat command and the server's
//! `GET /transcript` endpoint.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::session::{Message, Session};

#[derive(Debug, Serialize)]
pub struct TranscriptExport {
    pub session_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl TranscriptExport {
    pub fn of(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            exported_at: Utc::now(),
            messages: session.transcript().messages().to_vec(),
        }
    }
}

/// Write the transcript of `session` as pretty JSON.
///
/// If `output` is `Some`, writes to that file path (creating parent
/// directories). Otherwise writes to stdout.
pub fn run_export(session: &Session, output: Option<&Path>) -> Result<()> {
    let export = TranscriptExport::of(session);
    let json = serde_json::to_string_pretty(&export)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write transcript: {}", path.display()))?;
            eprintln!(
                "Exported {} messages to {}",
                export.messages.len(),
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
