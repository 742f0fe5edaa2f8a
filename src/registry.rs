//! Request lifecycle registry
//!
//! Tracks one cancellation handle per in-flight request. Requests are keyed on
//! stable identifiers: the owning session plus either the assistant message
//! being streamed or one of the per-session background tasks.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::error::{ChatlineError, Result};
use crate::store::{MessageId, SessionId};

/// What a registered request writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotTarget {
    /// Foreground reply streaming into an assistant message
    Message(MessageId),
    /// Background summarization of the session history
    Summary,
    /// Background topic inference
    Topic,
}

/// Registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    /// Owning session
    pub session: SessionId,
    /// Request target within the session
    pub target: SlotTarget,
}

impl Slot {
    /// Slot for a foreground reply
    pub fn message(session: SessionId, message: MessageId) -> Self {
        Self {
            session,
            target: SlotTarget::Message(message),
        }
    }

    /// Slot for the session's summarization task
    pub fn summary(session: SessionId) -> Self {
        Self {
            session,
            target: SlotTarget::Summary,
        }
    }

    /// Slot for the session's topic task
    pub fn topic(session: SessionId) -> Self {
        Self {
            session,
            target: SlotTarget::Topic,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            SlotTarget::Message(id) => write!(f, "{}/message/{}", self.session, id),
            SlotTarget::Summary => write!(f, "{}/summary", self.session),
            SlotTarget::Topic => write!(f, "{}/topic", self.session),
        }
    }
}

/// Registry of in-flight requests
///
/// Cloning yields another handle onto the same table.
///
/// # Examples
///
/// ```
/// use chatline::registry::{RequestRegistry, Slot};
/// use chatline::store::SessionId;
///
/// let registry = RequestRegistry::new();
/// let slot = Slot::summary(SessionId(1));
/// let token = registry.register(slot).unwrap();
/// assert!(registry.register(slot).is_err());
///
/// registry.cancel(slot);
/// assert!(token.is_cancelled());
/// assert!(!registry.contains(slot));
///
/// // Cancelling again is a no-op.
/// registry.cancel(slot);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    entries: Arc<Mutex<HashMap<Slot, CancellationToken>>>,
}

impl RequestRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Slot, CancellationToken>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a request and hand out its cancellation token
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::SlotAlreadyRegistered` if the slot already has
    /// a live request
    pub fn register(&self, slot: Slot) -> Result<CancellationToken> {
        let mut entries = self.lock();
        if entries.contains_key(&slot) {
            return Err(ChatlineError::SlotAlreadyRegistered(slot.to_string()).into());
        }

        let token = CancellationToken::new();
        entries.insert(slot, token.clone());
        tracing::debug!("Registered request slot {}", slot);
        Ok(token)
    }

    /// Cancel the request in `slot`, if any, and deregister it
    pub fn cancel(&self, slot: Slot) {
        if let Some(token) = self.lock().remove(&slot) {
            tracing::debug!("Cancelling request slot {}", slot);
            token.cancel();
        }
    }

    /// Deregister `slot` without cancelling it
    pub fn remove(&self, slot: Slot) {
        self.lock().remove(&slot);
    }

    /// Deregister `slot` once the request holding `token` is finished
    ///
    /// Skipped when the token was cancelled: cancellation already removed the
    /// entry, and the slot may since belong to a newer request.
    pub fn release(&self, slot: Slot, token: &CancellationToken) {
        let mut entries = self.lock();
        if !token.is_cancelled() {
            entries.remove(&slot);
        }
    }

    /// Returns true if `slot` has a live request
    pub fn contains(&self, slot: Slot) -> bool {
        self.lock().contains_key(&slot)
    }

    /// Number of live requests
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no request is live
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cancel every live request belonging to `session`
    pub fn cancel_session(&self, session: SessionId) {
        let mut entries = self.lock();
        entries.retain(|slot, token| {
            if slot.session == session {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Cancel every live request
    pub fn cancel_all(&self) {
        let mut entries = self.lock();
        if !entries.is_empty() {
            tracing::debug!("Cancelling {} in-flight requests", entries.len());
        }
        for (_, token) in entries.drain() {
            token.cancel();
        }
    }
}
