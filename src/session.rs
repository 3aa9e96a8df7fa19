//! Conversation state: the transcript, the staged attachment and the
//! send flow that ties classification and dispatch together.
//!
//! # Send flow
//!
//! ```text
//!  Idle ──send(text)──▶ Sending ──dispatch done──▶ Idle
//!            │              │
//!            │              ├─ append user message (immediately)
//!            │              ├─ classify text (or "upload file <name>")
//!            │              ├─ await dispatcher
//!            │              └─ append agent message
//!            │
//!            ├─ already sending → SendError::Busy
//!            └─ blank text, no file → SendError::Empty (nothing recorded)
//! ```
//!
//! Only one send can be in flight: the session holds a single-permit
//! semaphore for the duration of the dispatch. The lock around the
//! transcript is never held across an `.await`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::classify;
use crate::dispatch::{Attachment, Dispatch, DispatchResult};
use crate::target::Target;

/// Greeting that opens every transcript.
pub const WELCOME_TEXT: &str = "Welcome! I route your requests to the right agent: \
upload files or scrape pages, search the knowledge base, ask for analytics \
and backups, or transform product data between marketplace formats. \
What would you like to do?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// What a user message remembers about its attachment. The bytes
/// themselves are handed to the dispatcher and not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub name: String,
    pub size_bytes: u64,
}

impl From<&Attachment> for AttachmentRef {
    fn from(file: &Attachment) -> Self {
        Self {
            name: file.name.clone(),
            size_bytes: file.size(),
        }
    }
}

/// One transcript entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: Uuid,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<AttachmentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            attachment: None,
            target: None,
            outcome: None,
            payload: None,
        }
    }

    pub fn user(content: impl Into<String>, attachment: Option<AttachmentRef>) -> Self {
        Self {
            attachment,
            ..Self::new(Role::User, content.into())
        }
    }

    pub fn agent(target: Target, result: DispatchResult) -> Self {
        let outcome = if result.succeeded {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        };
        Self {
            target: Some(target),
            outcome: Some(outcome),
            payload: result.raw_payload,
            ..Self::new(Role::Agent, result.display_text)
        }
    }

    pub fn system(target: Target, content: impl Into<String>) -> Self {
        Self {
            target: Some(target),
            ..Self::new(Role::System, content.into())
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn content(&self) -> &str {
        &self.content
    }
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn attachment(&self) -> Option<&AttachmentRef> {
        self.attachment.as_ref()
    }
    pub fn target(&self) -> Option<Target> {
        self.target
    }
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// `Some(true/false)` for agent messages, `None` otherwise.
    pub fn succeeded(&self) -> Option<bool> {
        self.outcome.map(|o| o == Outcome::Succeeded)
    }
}

/// Append-only, chronologically ordered list of messages.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// A transcript holding only the welcome message.
    pub fn seeded() -> Self {
        Self {
            messages: vec![Message::system(Target::Orchestrator, WELCOME_TEXT)],
        }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Why a send did not happen.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("a message is already being sent")]
    Busy,
    #[error("nothing to send: type a message or attach a file")]
    Empty,
}

/// Result of a completed send.
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub target: Target,
    pub succeeded: bool,
    pub user_message: Message,
    pub agent_message: Message,
}

struct SessionState {
    transcript: Transcript,
    pending: Option<Attachment>,
}

/// A single conversation.
pub struct Session {
    id: Uuid,
    dispatcher: Arc<dyn Dispatch>,
    state: Mutex<SessionState>,
    in_flight: Semaphore,
}

impl Session {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "session started");
        Self {
            id,
            dispatcher,
            state: Mutex::new(SessionState {
                transcript: Transcript::seeded(),
                pending: None,
            }),
            in_flight: Semaphore::new(1),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the transcript.
    pub fn transcript(&self) -> Transcript {
        self.state().transcript.clone()
    }

    /// Messages appended after the first `from` entries.
    pub fn messages_since(&self, from: usize) -> Vec<Message> {
        self.state()
            .transcript
            .messages()
            .iter()
            .skip(from)
            .cloned()
            .collect()
    }

    pub(crate) fn append_message(&self, message: Message) {
        self.state().transcript.push(message);
    }

    /// Stage `file` for the next send, returning the one it replaced.
    ///
    /// Refused with [`SendError::Busy`] while a send is in flight.
    pub fn stage_pending_file(&self, file: Attachment) -> Result<Option<Attachment>, SendError> {
        let mut state = self.state();
        if self.is_sending() {
            return Err(SendError::Busy);
        }
        tracing::debug!(session = %self.id, file = %file.name, "attachment staged");
        Ok(state.pending.replace(file))
    }

    /// Drop the staged attachment, if any.
    pub fn clear_pending_file(&self) -> Option<Attachment> {
        self.state().pending.take()
    }

    pub fn pending_file(&self) -> Option<AttachmentRef> {
        self.state().pending.as_ref().map(AttachmentRef::from)
    }

    /// Whether a send is currently waiting on a backend.
    pub fn is_sending(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    /// Send `text` (and the staged attachment, if any).
    ///
    /// Appends the user message before awaiting the dispatcher and the agent
    /// message after it. Backend failures are recorded as failed agent
    /// messages, not returned as errors.
    pub async fn send(&self, text: &str) -> Result<SendReport, SendError> {
        let _permit = self.in_flight.try_acquire().map_err(|_| SendError::Busy)?;
        let text = text.trim();

        let (file, user_message) = {
            let mut state = self.state();
            if text.is_empty() && state.pending.is_none() {
                return Err(SendError::Empty);
            }
            let file = state.pending.take();
            let message = Message::user(text, file.as_ref().map(AttachmentRef::from));
            state.transcript.push(message.clone());
            (file, message)
        };

        let routed_text = match &file {
            Some(f) if text.is_empty() => format!("upload file {}", f.name),
            _ => text.to_string(),
        };
        let classification = classify::explain(&routed_text);
        let target = classification.target;
        tracing::info!(
            session = %self.id,
            agent = %target,
            keyword = classification.matched_keyword.unwrap_or("<fallback>"),
            "message classified"
        );

        let result = self.dispatcher.dispatch(target, text, file).await;
        let succeeded = result.succeeded;
        let agent_message = Message::agent(target, result);
        self.append_message(agent_message.clone());

        Ok(SendReport {
            target,
            succeeded,
            user_message,
            agent_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    /// Records every call and answers with a fixed outcome.
    struct StubDispatcher {
        calls: Mutex<Vec<(Target, String, Option<String>)>>,
        succeed: bool,
    }

    impl StubDispatcher {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                succeed,
            })
        }

        fn calls(&self) -> Vec<(Target, String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dispatch for StubDispatcher {
        async fn dispatch(
            &self,
            target: Target,
            message: &str,
            file: Option<Attachment>,
        ) -> DispatchResult {
            self.calls.lock().unwrap().push((
                target,
                message.to_string(),
                file.map(|f| f.name),
            ));
            DispatchResult {
                succeeded: self.succeed,
                display_text: format!("{} replied", target.display_name()),
                raw_payload: self.succeed.then(|| json!({"ok": true})),
            }
        }
    }

    /// Blocks until released, to observe the in-flight state.
    struct GatedDispatcher {
        gate: Notify,
    }

    #[async_trait]
    impl Dispatch for GatedDispatcher {
        async fn dispatch(&self, target: Target, _: &str, _: Option<Attachment>) -> DispatchResult {
            self.gate.notified().await;
            DispatchResult {
                succeeded: true,
                display_text: format!("{} done", target),
                raw_payload: None,
            }
        }
    }

    #[test]
    fn test_new_session_has_only_greeting() {
        let session = Session::new(StubDispatcher::new(true));
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 1);
        let greeting = &transcript.messages()[0];
        assert_eq!(greeting.role(), Role::System);
        assert_eq!(greeting.target(), Some(Target::Orchestrator));
        assert_eq!(greeting.content(), WELCOME_TEXT);
        assert_eq!(greeting.outcome(), None);
    }

    #[tokio::test]
    async fn test_text_send_appends_user_then_agent() {
        let stub = StubDispatcher::new(true);
        let session = Session::new(stub.clone());

        let report = session.send("  Transform BestBuy data  ").await.unwrap();
        assert_eq!(report.target, Target::Transformer);
        assert!(report.succeeded);

        let messages = session.transcript().messages().to_vec();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role(), Role::User);
        assert_eq!(messages[1].content(), "Transform BestBuy data");
        assert_eq!(messages[1].target(), None);
        assert_eq!(messages[2].role(), Role::Agent);
        assert_eq!(messages[2].target(), Some(Target::Transformer));
        assert_eq!(messages[2].succeeded(), Some(true));
        assert_eq!(messages[2].payload(), Some(&json!({"ok": true})));
        assert_eq!(messages[2].id(), report.agent_message.id());
        assert!(messages[1].timestamp() <= messages[2].timestamp());

        assert_eq!(
            stub.calls(),
            vec![(Target::Transformer, "Transform BestBuy data".to_string(), None)]
        );
    }

    #[tokio::test]
    async fn test_file_only_send_routes_to_collector() {
        let stub = StubDispatcher::new(true);
        let session = Session::new(stub.clone());
        session.stage_pending_file(Attachment::new("q3.xlsx", vec![1, 2, 3])).unwrap();

        let report = session.send("").await.unwrap();
        assert_eq!(report.target, Target::Collector);
        assert_eq!(
            report.user_message.attachment(),
            Some(&AttachmentRef {
                name: "q3.xlsx".to_string(),
                size_bytes: 3
            })
        );
        assert!(session.pending_file().is_none());
        assert_eq!(
            stub.calls(),
            vec![(Target::Collector, String::new(), Some("q3.xlsx".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_text_and_file_classifies_on_text() {
        let stub = StubDispatcher::new(true);
        let session = Session::new(stub.clone());
        session.stage_pending_file(Attachment::new("notes.txt", vec![])).unwrap();

        let report = session.send("how to publish a listing").await.unwrap();
        assert_eq!(report.target, Target::Knowledge);
        assert_eq!(session.transcript().len(), 3);
        // The file still travels with the request; the dispatcher decides.
        assert_eq!(stub.calls()[0].2.as_deref(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn test_every_send_kind_adds_two_entries() {
        let session = Session::new(StubDispatcher::new(true));
        let mut expected = 1;

        session.send("hello").await.unwrap();
        expected += 2;
        assert_eq!(session.transcript().len(), expected);

        session.stage_pending_file(Attachment::new("a.pdf", vec![0])).unwrap();
        session.send("").await.unwrap();
        expected += 2;
        assert_eq!(session.transcript().len(), expected);

        session.stage_pending_file(Attachment::new("b.pdf", vec![0])).unwrap();
        session.send("scrape this").await.unwrap();
        expected += 2;
        let transcript = session.transcript();
        assert_eq!(transcript.len(), expected);

        let roles: Vec<Role> = transcript.messages().iter().map(|m| m.role()).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Agent,
                Role::User,
                Role::Agent,
                Role::User,
                Role::Agent
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_send_is_inert() {
        let stub = StubDispatcher::new(true);
        let session = Session::new(stub.clone());
        assert_eq!(session.send("   ").await.unwrap_err(), SendError::Empty);
        assert_eq!(session.transcript().len(), 1);
        assert!(stub.calls().is_empty());
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_recorded() {
        let session = Session::new(StubDispatcher::new(false));
        let report = session.send("database backup").await.unwrap();
        assert!(!report.succeeded);
        let last = session.transcript().last().cloned().unwrap();
        assert_eq!(last.outcome(), Some(Outcome::Failed));
        assert!(last.content().contains("Database Manager"));
        assert!(last.payload().is_none());
    }

    #[test]
    fn test_staging_replaces_and_clear_removes() {
        let session = Session::new(StubDispatcher::new(true));
        let first = session.stage_pending_file(Attachment::new("one.csv", vec![]));
        assert!(first.unwrap().is_none());
        let replaced = session
            .stage_pending_file(Attachment::new("two.csv", vec![9]))
            .unwrap();
        assert_eq!(replaced.map(|f| f.name), Some("one.csv".to_string()));
        assert_eq!(session.pending_file().unwrap().name, "two.csv");

        let cleared = session.clear_pending_file();
        assert_eq!(cleared.map(|f| f.name), Some("two.csv".to_string()));
        assert!(session.pending_file().is_none());
        assert!(session.clear_pending_file().is_none());
    }

    #[tokio::test]
    async fn test_second_send_while_in_flight_is_busy() {
        let dispatcher = Arc::new(GatedDispatcher {
            gate: Notify::new(),
        });
        let session = Arc::new(Session::new(dispatcher.clone()));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.send("status please").await })
        };

        while !session.is_sending() {
            tokio::task::yield_now().await;
        }
        // The user message is visible before the agent answers.
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(session.send("another").await.unwrap_err(), SendError::Busy);
        assert_eq!(
            session
                .stage_pending_file(Attachment::new("late.pdf", vec![]))
                .unwrap_err(),
            SendError::Busy
        );
        assert!(session.pending_file().is_none());
        assert_eq!(session.transcript().len(), 2);

        dispatcher.gate.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.target, Target::Orchestrator);
        assert!(!session.is_sending());
        assert_eq!(session.transcript().len(), 3);
    }

    #[tokio::test]
    async fn test_earlier_messages_unchanged_by_later_sends() {
        let session = Session::new(StubDispatcher::new(true));
        session.send("find the returns policy").await.unwrap();
        let before = session.transcript().messages().to_vec();
        session.send("convert to walmart").await.unwrap();
        let after = session.transcript();
        assert_eq!(&after.messages()[..before.len()], &before[..]);
        assert_eq!(session.messages_since(before.len()).len(), 2);
    }
}
