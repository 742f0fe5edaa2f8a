//! History window builder
//!
//! Derives the bounded list of messages sent with each new turn: an optional
//! memory-summary preamble followed by the most recent raw messages. The
//! window is a pure function of the session and the settings.

use crate::providers::{ChatMessage, Role};
use crate::store::{ChatConfig, Message, Session, HISTORY_ALL};

/// Prefix of the synthetic system message carrying the memory summary
pub const MEMORY_PREAMBLE: &str =
    "This is a summary of the chat history between you and the user: ";

/// Synthetic system message embedding `summary`
pub fn memory_message(summary: &str) -> ChatMessage {
    ChatMessage::system(format!("{}{}", MEMORY_PREAMBLE, summary))
}

/// The last `count` messages; every message for [`HISTORY_ALL`] (or any
/// negative count)
pub fn recent_messages(messages: &[Message], count: i32) -> &[Message] {
    if count == HISTORY_ALL || count < 0 {
        return messages;
    }
    let count = count as usize;
    &messages[messages.len().saturating_sub(count)..]
}

/// Build the context window for the next turn
///
/// # Examples
///
/// ```
/// use chatline::history::build_window;
/// use chatline::providers::Role;
/// use chatline::store::{ChatConfig, Message, Session, SessionId};
///
/// let mut session = Session::new(SessionId(1));
/// for i in 0..9 {
///     session.messages.push(Message::user(format!("m{}", i)));
/// }
/// session.memory_summary = "talked about crabs".to_string();
///
/// let window = build_window(&session, &ChatConfig::default());
/// assert_eq!(window.len(), 5);
/// assert_eq!(window[0].role, Role::System);
/// assert_eq!(window[4].content, "m8");
/// ```
pub fn build_window(session: &Session, config: &ChatConfig) -> Vec<ChatMessage> {
    let recent = recent_messages(&session.messages, config.history_message_count);

    let mut window = Vec::with_capacity(recent.len() + 1);
    if !session.memory_summary.is_empty() {
        window.push(memory_message(&session.memory_summary));
    }
    window.extend(recent.iter().map(Message::to_chat_message));
    window
}

/// Build the outgoing message list: window plus the new user message
///
/// Assistant entries are filtered out when bot messages are not sent back.
pub fn build_request_messages(
    session: &Session,
    config: &ChatConfig,
    user_message: &Message,
) -> Vec<ChatMessage> {
    let mut messages = build_window(session, config);
    messages.push(user_message.to_chat_message());

    if !config.send_bot_messages {
        messages.retain(|m| m.role != Role::Assistant);
    }
    messages
}
