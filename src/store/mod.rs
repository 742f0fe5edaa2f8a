//! Conversation session store
//!
//! [`ChatStore`] owns the ordered session list, the current-session index and
//! the chat settings. It is a cheap `Clone` handle: every clone sees the same
//! state. All mutation goes through the store's update methods, and every
//! write publishes a fresh [`StoreState`] snapshot to subscribers.
//!
//! Index arguments are clamped into range rather than rejected, and updates
//! addressed to a session that no longer exists are skipped.

pub mod chat_config;
pub mod session;

pub use chat_config::{is_valid_model, ChatConfig, ModelEntry, SubmitKey, ALL_MODELS, HISTORY_ALL};
pub use session::{ChatStat, Message, MessageId, Session, SessionId, BOT_HELLO, DEFAULT_TOPIC};

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;
use crate::storage::StateStorage;

/// Everything the store persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    /// Chat settings
    #[serde(default)]
    pub config: ChatConfig,
    /// Sessions, most recently created first
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Index of the current session
    #[serde(default)]
    pub current_session_index: usize,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            config: ChatConfig::default(),
            sessions: vec![Session::new(SessionId::now())],
            current_session_index: 0,
        }
    }
}

impl StoreState {
    /// Restore the structural invariants on rehydrated state
    ///
    /// An empty session list gets a fresh session, the index and summarized
    /// offsets are clamped, and replies interrupted mid-stream are settled.
    pub fn normalize(mut self) -> Self {
        if self.sessions.is_empty() {
            self.sessions.push(Session::new(SessionId::now()));
        }
        for session in &mut self.sessions {
            session.normalize();
        }
        self.current_session_index = clamp_index(self.current_session_index, self.sessions.len());
        self
    }

    fn current(&self) -> &Session {
        &self.sessions[clamp_index(self.current_session_index, self.sessions.len())]
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn newest_id(&self) -> Option<SessionId> {
        self.sessions.iter().map(|s| s.id).max()
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

/// Shared handle onto the conversation state
///
/// # Examples
///
/// ```
/// use chatline::store::ChatStore;
///
/// let store = ChatStore::new();
/// assert_eq!(store.sessions().len(), 1);
///
/// store.new_session();
/// assert_eq!(store.sessions().len(), 2);
/// assert_eq!(store.current_session_index(), 0);
///
/// store.remove_session(0);
/// store.remove_session(0);
/// assert_eq!(store.sessions().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ChatStore {
    state: Arc<Mutex<StoreState>>,
    snapshots: Arc<watch::Sender<Arc<StoreState>>>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    /// Creates a store holding the default single-session state
    pub fn new() -> Self {
        Self::from_state(StoreState::default())
    }

    /// Creates a store from existing state, normalizing it first
    pub fn from_state(state: StoreState) -> Self {
        let state = state.normalize();
        let (tx, _rx) = watch::channel(Arc::new(state.clone()));
        Self {
            state: Arc::new(Mutex::new(state)),
            snapshots: Arc::new(tx),
        }
    }

    /// Load the persisted state, or the default state if none was saved
    ///
    /// # Errors
    ///
    /// Returns error if the stored state cannot be read or decoded
    pub fn load(storage: &StateStorage) -> Result<Self> {
        let state = storage.load_state()?.unwrap_or_default();
        Ok(Self::from_state(state))
    }

    /// Persist the current state
    ///
    /// # Errors
    ///
    /// Returns error if the state cannot be encoded or written
    pub fn save(&self, storage: &StateStorage) -> Result<()> {
        storage.save_state(&self.snapshot())
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.lock())
    }

    fn write<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.snapshots.send_replace(Arc::new(state.clone()));
        result
    }

    /// Owned copy of the whole state
    pub fn snapshot(&self) -> StoreState {
        self.read(|state| state.clone())
    }

    /// Receiver that observes a snapshot after every write
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreState>> {
        self.snapshots.subscribe()
    }

    /// Prepend a fresh session and select it
    ///
    /// # Returns
    ///
    /// Returns the new session's identity
    pub fn new_session(&self) -> SessionId {
        self.write(|state| {
            let id = SessionId::after(state.newest_id());
            state.sessions.insert(0, Session::new(id));
            state.current_session_index = 0;
            tracing::debug!("Created session {}", id);
            id
        })
    }

    /// Remove the session at `index` (clamped)
    ///
    /// Removing the only session replaces it with a fresh one. When the
    /// removed session is at or before the current index, the selection moves
    /// back by one so that it stays on a neighbouring session.
    ///
    /// # Returns
    ///
    /// Returns the identity of the removed session
    pub fn remove_session(&self, index: usize) -> SessionId {
        self.write(|state| {
            let index = clamp_index(index, state.sessions.len());

            if state.sessions.len() == 1 {
                let removed = state.sessions[0].id;
                let id = SessionId::after(Some(removed));
                state.sessions[0] = Session::new(id);
                state.current_session_index = 0;
                tracing::debug!("Replaced last session {} with {}", removed, id);
                return removed;
            }

            let removed = state.sessions.remove(index).id;
            if index <= state.current_session_index {
                state.current_session_index = state.current_session_index.saturating_sub(1);
            }
            state.current_session_index =
                clamp_index(state.current_session_index, state.sessions.len());
            tracing::debug!("Removed session {}", removed);
            removed
        })
    }

    /// Select the session at `index` (clamped)
    pub fn select_session(&self, index: usize) {
        self.write(|state| {
            state.current_session_index = clamp_index(index, state.sessions.len());
        });
    }

    /// Index of the current session
    pub fn current_session_index(&self) -> usize {
        self.read(|state| clamp_index(state.current_session_index, state.sessions.len()))
    }

    /// Snapshot of the current session
    pub fn current_session(&self) -> Session {
        self.read(|state| state.current().clone())
    }

    /// Snapshot of every session
    pub fn sessions(&self) -> Vec<Session> {
        self.read(|state| state.sessions.clone())
    }

    /// Snapshot of one session, if it still exists
    pub fn session(&self, id: SessionId) -> Option<Session> {
        self.read(|state| state.sessions.iter().find(|s| s.id == id).cloned())
    }

    /// Mutate the current session
    pub fn update_current_session(&self, f: impl FnOnce(&mut Session)) {
        self.write(|state| {
            let index = clamp_index(state.current_session_index, state.sessions.len());
            f(&mut state.sessions[index]);
        });
    }

    /// Mutate a session by identity
    ///
    /// # Returns
    ///
    /// Returns false, without publishing, if the session no longer exists
    pub fn update_session(&self, id: SessionId, f: impl FnOnce(&mut Session)) -> bool {
        let mut state = self.lock();
        match state.session_mut(id) {
            Some(session) => {
                f(session);
                self.snapshots.send_replace(Arc::new(state.clone()));
                true
            }
            None => {
                tracing::debug!("Skipping update for missing session {}", id);
                false
            }
        }
    }

    /// Mutate one message by identity
    ///
    /// # Returns
    ///
    /// Returns false if the session or message no longer exists
    pub fn update_message(
        &self,
        session_id: SessionId,
        message_id: MessageId,
        f: impl FnOnce(&mut Message),
    ) -> bool {
        let mut state = self.lock();
        let Some(message) = state
            .session_mut(session_id)
            .and_then(|session| session.message_mut(message_id))
        else {
            tracing::debug!(
                "Skipping update for missing message {} in session {}",
                message_id,
                session_id
            );
            return false;
        };

        f(message);
        message.date = Utc::now();
        self.snapshots.send_replace(Arc::new(state.clone()));
        true
    }

    /// Append messages to a session
    pub fn push_messages(&self, session_id: SessionId, messages: Vec<Message>) -> bool {
        self.update_session(session_id, |session| session.messages.extend(messages))
    }

    /// Record a settled reply: touch the session and update its statistics
    pub fn on_new_message(&self, session_id: SessionId, message: &Message) -> bool {
        self.update_session(session_id, |session| {
            session.last_update = Utc::now();
            session.stat.record(&message.content);
        })
    }

    /// Add a message's text to a session's statistics
    pub fn update_stat(&self, session_id: SessionId, message: &Message) -> bool {
        self.update_session(session_id, |session| session.stat.record(&message.content))
    }

    /// Current chat settings
    pub fn config(&self) -> ChatConfig {
        self.read(|state| state.config.clone())
    }

    /// Restore default chat settings
    pub fn reset_config(&self) {
        self.write(|state| state.config = ChatConfig::default());
    }

    /// Apply a settings update, dropping out-of-range fields
    ///
    /// # Returns
    ///
    /// Returns the settings as accepted
    pub fn update_config(&self, f: impl FnOnce(&mut ChatConfig)) -> ChatConfig {
        self.write(|state| {
            let mut candidate = state.config.clone();
            f(&mut candidate);
            state.config = candidate.validated_against(&state.config);
            state.config.clone()
        })
    }

    /// Return to the default single-session state with default settings
    pub fn clear_all_data(&self) {
        self.write(|state| {
            let id = SessionId::after(state.newest_id());
            *state = StoreState {
                config: ChatConfig::default(),
                sessions: vec![Session::new(id)],
                current_session_index: 0,
            };
        });
        tracing::info!("Cleared all conversation data");
    }
}
