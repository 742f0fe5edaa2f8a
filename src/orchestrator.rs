//! Chat orchestrator
//!
//! Handles user input end to end: appends the user turn and a pending reply
//! to the current session, streams the reply into that message on a spawned
//! task, settles it, and then kicks off background compaction (topic
//! inference and history summarization).
//!
//! Every request is registered in the [`RequestRegistry`] under a stable slot
//! so that it can be cancelled by identity. Only the task owning a slot writes
//! to that slot's target.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::compaction::{needs_topic, plan_summary, topic_request, trim_topic, SummaryPlan};
use crate::decoder::StreamEvent;
use crate::error::Result;
use crate::history::build_request_messages;
use crate::providers::{CompletionRequest, CompletionTransport};
use crate::registry::{RequestRegistry, Slot};
use crate::store::{ChatStore, Message, MessageId, SessionId};

/// Appended to a reply that failed mid-stream
pub const ERROR_SUFFIX: &str = "\n\nSomething went wrong, please try again later.";

/// How a foreground exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The reply streamed to completion
    Completed,
    /// The reply was cancelled; partial content is kept
    Cancelled,
    /// The transport failed; the reply carries the error suffix
    Failed,
}

/// Handle onto a spawned exchange
#[derive(Debug)]
pub struct ExchangeHandle {
    /// Session the exchange belongs to
    pub session_id: SessionId,
    /// Assistant message receiving the reply
    pub message_id: MessageId,
    task: JoinHandle<ExchangeOutcome>,
}

impl ExchangeHandle {
    /// Wait for the reply to settle
    pub async fn wait(self) -> ExchangeOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Exchange task for {} ended abnormally: {}", self.message_id, e);
                ExchangeOutcome::Failed
            }
        }
    }
}

enum StreamEnd {
    Completed,
    Cancelled,
    Failed(anyhow::Error),
}

/// Coordinates the store, the registry and the completion transport
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use chatline::orchestrator::{ChatOrchestrator, ExchangeOutcome};
/// use chatline::providers::fake::{ScriptedTransport, StreamScript};
/// use chatline::store::ChatStore;
///
/// # #[tokio::main]
/// # async fn main() -> chatline::error::Result<()> {
/// let transport = ScriptedTransport::new();
/// transport.push_stream(StreamScript::reply(&["he", "llo"]));
///
/// let store = ChatStore::new();
/// let orchestrator = ChatOrchestrator::new(store.clone(), Arc::new(transport));
/// let handle = orchestrator.submit("hi")?;
/// assert_eq!(handle.wait().await, ExchangeOutcome::Completed);
///
/// let session = store.current_session();
/// assert_eq!(session.messages.last().unwrap().content, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: ChatStore,
    transport: Arc<dyn CompletionTransport>,
    registry: RequestRegistry,
}

impl ChatOrchestrator {
    /// Creates an orchestrator with an empty registry
    pub fn new(store: ChatStore, transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            store,
            transport,
            registry: RequestRegistry::new(),
        }
    }

    /// The store this orchestrator writes to
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// In-flight request registry
    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// Submit user input to the current session
    ///
    /// Appends the user message and an empty streaming reply, then spawns the
    /// task that streams the reply. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::SlotAlreadyRegistered` if the reply slot is
    /// already live; nothing is appended or sent in that case
    pub fn submit(&self, content: &str) -> Result<ExchangeHandle> {
        let session = self.store.current_session();
        let config = self.store.config();

        let user_message = Message::user(content);
        let reply = Message::pending_reply();
        let messages = build_request_messages(&session, &config, &user_message);
        let request = CompletionRequest::new(messages, config.model_config.clone());

        let session_id = session.id;
        let message_id = reply.id;
        let slot = Slot::message(session_id, message_id);
        let token = self.registry.register(slot).map_err(|e| {
            error!("Refusing to submit into {}: {}", slot, e);
            e
        })?;

        self.store
            .push_messages(session_id, vec![user_message, reply]);
        debug!(
            "Submitting exchange in session {}: {} context messages",
            session_id,
            request.messages.len()
        );

        let this = self.clone();
        let task = tokio::spawn(async move {
            this.run_exchange(session_id, message_id, request, token)
                .await
        });

        Ok(ExchangeHandle {
            session_id,
            message_id,
            task,
        })
    }

    /// Cancel the reply streaming into `message_id`; a no-op if it already settled
    pub fn cancel(&self, session_id: SessionId, message_id: MessageId) {
        self.registry.cancel(Slot::message(session_id, message_id));
    }

    /// Remove the session at `index` and cancel its in-flight requests
    pub fn remove_session(&self, index: usize) -> SessionId {
        let removed = self.store.remove_session(index);
        self.registry.cancel_session(removed);
        removed
    }

    /// Cancel everything and reset the store to its default state
    pub fn clear_all_data(&self) {
        self.registry.cancel_all();
        self.store.clear_all_data();
    }

    /// Cancel every in-flight request
    pub fn shutdown(&self) {
        self.registry.cancel_all();
    }

    async fn run_exchange(
        &self,
        session_id: SessionId,
        message_id: MessageId,
        request: CompletionRequest,
        token: CancellationToken,
    ) -> ExchangeOutcome {
        let end = self
            .drive_stream(&request, &token, |text| {
                self.store
                    .update_message(session_id, message_id, |m| m.content.push_str(text));
            })
            .await;
        self.registry.remove(Slot::message(session_id, message_id));

        let outcome = match end {
            StreamEnd::Completed => ExchangeOutcome::Completed,
            StreamEnd::Cancelled => {
                debug!("Reply {} cancelled", message_id);
                ExchangeOutcome::Cancelled
            }
            StreamEnd::Failed(e) => {
                warn!("Reply {} failed: {}", message_id, e);
                self.store.update_message(session_id, message_id, |m| {
                    m.content.push_str(ERROR_SUFFIX);
                    m.streaming = false;
                    m.is_error = true;
                });
                return ExchangeOutcome::Failed;
            }
        };

        let settled = self
            .store
            .update_message(session_id, message_id, |m| m.streaming = false);
        if !settled {
            debug!("Session {} was removed before reply {} settled", session_id, message_id);
            return outcome;
        }

        if let Some(message) = self
            .store
            .session(session_id)
            .and_then(|s| s.message(message_id).cloned())
        {
            self.store.on_new_message(session_id, &message);
        }
        self.trigger_compaction(session_id);

        outcome
    }

    /// Pump a reply stream until it ends, is cancelled, or fails
    async fn drive_stream(
        &self,
        request: &CompletionRequest,
        token: &CancellationToken,
        mut on_delta: impl FnMut(&str),
    ) -> StreamEnd {
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return StreamEnd::Cancelled,
            opened = self.transport.stream(request) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return StreamEnd::Failed(e),
        };

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => match next {
                    Some(Ok(StreamEvent::Delta(text))) => on_delta(&text),
                    Some(Ok(StreamEvent::Done)) | None => return StreamEnd::Completed,
                    Some(Err(e)) => return StreamEnd::Failed(e),
                },
            }
        }
    }

    /// Start whatever background compaction the session is due for
    fn trigger_compaction(&self, session_id: SessionId) {
        let Some(session) = self.store.session(session_id) else {
            return;
        };
        let config = self.store.config();

        if needs_topic(&session) {
            self.spawn_topic(session_id, topic_request(&session, &config));
        }

        if let Some(plan) = plan_summary(&session, &config) {
            self.spawn_summary(session_id, plan);
        }
    }

    fn spawn_topic(&self, session_id: SessionId, request: CompletionRequest) {
        let slot = Slot::topic(session_id);
        let token = match self.registry.register(slot) {
            Ok(token) => token,
            Err(_) => {
                debug!("Topic inference already running for session {}", session_id);
                return;
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = this.transport.complete(&request) => Some(result),
            };

            match result {
                None => debug!("Topic inference for session {} cancelled", session_id),
                Some(Ok(raw)) => match trim_topic(&raw) {
                    Some(topic) => {
                        info!("Session {} topic: {}", session_id, topic);
                        this.store
                            .update_session(session_id, |session| session.topic = topic);
                    }
                    None => warn!("Topic inference for session {} returned nothing", session_id),
                },
                Some(Err(e)) => {
                    warn!("Topic inference for session {} failed: {}", session_id, e)
                }
            }
            this.registry.release(slot, &token);
        });
    }

    fn spawn_summary(&self, session_id: SessionId, plan: SummaryPlan) {
        let slot = Slot::summary(session_id);
        let token = match self.registry.register(slot) {
            Ok(token) => token,
            Err(_) => {
                debug!("Summarization already running for session {}", session_id);
                return;
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            let mut summary = String::new();
            let end = this
                .drive_stream(&plan.request, &token, |text| {
                    summary.push_str(text);
                    let partial = summary.clone();
                    this.store
                        .update_session(session_id, |session| session.memory_summary = partial);
                })
                .await;

            match end {
                StreamEnd::Completed => {
                    debug!(
                        "Session {} summarized up to message {}",
                        session_id, plan.summarized_up_to
                    );
                    this.store.update_session(session_id, |session| {
                        session.last_summarized_offset =
                            plan.summarized_up_to.min(session.messages.len());
                    });
                }
                StreamEnd::Cancelled => {
                    debug!("Summarization for session {} cancelled", session_id)
                }
                StreamEnd::Failed(e) => {
                    warn!("Summarization for session {} failed: {}", session_id, e)
                }
            }
            this.registry.release(slot, &token);
        });
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("in_flight", &self.registry.len())
            .finish()
    }
}
