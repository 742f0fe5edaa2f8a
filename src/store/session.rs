//! Session and message types
//!
//! A [`Session`] exclusively owns its ordered message log together with the
//! derived statistics and the compaction bookkeeping (memory summary and the
//! offset of the last summarized message).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::{ChatMessage, Role};

/// Placeholder topic of a fresh session
pub const DEFAULT_TOPIC: &str = "new chat";

/// Assistant greeting every fresh session starts with
pub const BOT_HELLO: &str = "How can I help you?";

/// Session identity: creation time in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Identity for a session created now
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis().max(0) as u64)
    }

    /// Identity for a session created now that sorts after `newest`
    pub fn after(newest: Option<SessionId>) -> Self {
        let now = Self::now();
        match newest {
            Some(newest) if newest >= now => Self(newest.0 + 1),
            _ => now,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable message identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message in a session log
///
/// Assistant replies start out with `streaming` set and empty content, are
/// mutated in place as deltas arrive and settle exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identity
    #[serde(default)]
    pub id: MessageId,
    /// Author
    pub role: Role,
    /// Text; grows while streaming
    pub content: String,
    /// Creation or last mutation time
    pub date: DateTime<Utc>,
    /// True until the reply settles
    #[serde(default)]
    pub streaming: bool,
    /// True if the reply settled because of a failure
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    /// Creates a settled message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            date: Utc::now(),
            streaming: false,
            is_error: false,
        }
    }

    /// Creates a settled user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a settled assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates an empty assistant message awaiting a streamed reply
    pub fn pending_reply() -> Self {
        Self {
            streaming: true,
            ..Self::assistant("")
        }
    }

    /// Wire form sent to the completion service
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Running statistics over settled assistant replies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStat {
    /// Characters
    pub char_count: usize,
    /// Whitespace-separated words
    pub word_count: usize,
    /// Estimated tokens (characters / 4, rounded up)
    pub token_count: usize,
}

impl ChatStat {
    /// Add one message's text to the totals
    ///
    /// # Examples
    ///
    /// ```
    /// use chatline::store::ChatStat;
    ///
    /// let mut stat = ChatStat::default();
    /// stat.record("hello world");
    /// assert_eq!(stat.char_count, 11);
    /// assert_eq!(stat.word_count, 2);
    /// assert_eq!(stat.token_count, 3);
    /// ```
    pub fn record(&mut self, content: &str) {
        let chars = content.chars().count();
        self.char_count += chars;
        self.word_count += content.split_whitespace().count();
        self.token_count += chars.div_ceil(4);
    }
}

/// One conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identity
    pub id: SessionId,
    /// Human-readable label; [`DEFAULT_TOPIC`] until inferred
    pub topic: String,
    /// Rolling summary of already-compacted history
    #[serde(default)]
    pub memory_summary: String,
    /// Ordered message log
    pub messages: Vec<Message>,
    /// Statistics over settled replies
    #[serde(default)]
    pub stat: ChatStat,
    /// Time of the last settled exchange
    pub last_update: DateTime<Utc>,
    /// Messages before this offset are covered by `memory_summary`
    #[serde(default)]
    pub last_summarized_offset: usize,
}

impl Session {
    /// Creates a fresh session holding only the greeting
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            topic: DEFAULT_TOPIC.to_string(),
            memory_summary: String::new(),
            messages: vec![Message::assistant(BOT_HELLO)],
            stat: ChatStat::default(),
            last_update: Utc::now(),
            last_summarized_offset: 0,
        }
    }

    /// Returns true while the topic is still the placeholder
    pub fn has_default_topic(&self) -> bool {
        self.topic == DEFAULT_TOPIC
    }

    /// Looks up a message by identity
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Mutable lookup by identity
    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Clamp bookkeeping and settle replies left streaming by an interrupted run
    pub fn normalize(&mut self) {
        self.last_summarized_offset = self.last_summarized_offset.min(self.messages.len());
        for message in self.messages.iter_mut().filter(|m| m.streaming) {
            message.streaming = false;
        }
    }

    /// Render the session as a Markdown document
    ///
    /// # Examples
    ///
    /// ```
    /// use chatline::store::{Session, SessionId};
    ///
    /// let session = Session::new(SessionId(1));
    /// let markdown = session.export_markdown();
    /// assert!(markdown.starts_with("# new chat\n"));
    /// assert!(markdown.contains("How can I help you?"));
    /// ```
    pub fn export_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.topic);
        for message in &self.messages {
            let author = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            out.push_str(&format!(
                "\n## {} ({})\n\n{}\n",
                author,
                message.date.format("%Y-%m-%d %H:%M:%S"),
                message.content
            ));
        }
        out
    }
}
