//! Compaction planning: topic inference and history summarization
//!
//! After every settled exchange the orchestrator asks this module whether the
//! session needs a topic and whether enough unsummarized history has piled
//! up to warrant a new memory summary. The functions here are pure; spawning
//! and applying the requests is the orchestrator's job.

use crate::history::{memory_message, recent_messages};
use crate::providers::{ChatMessage, CompletionRequest};
use crate::store::{ChatConfig, Session};

/// Messages a session needs before a topic is inferred
pub const TOPIC_MIN_MESSAGES: usize = 3;

/// Unsummarized characters above which only the most recent messages are
/// summarized
pub const SUMMARY_HARD_CEILING: usize = 4000;

/// Appended as a user message to ask for a topic
pub const TOPIC_PROMPT: &str = "Use four to five words to directly return the topic of this \
conversation, with no explanation, no punctuation and no filler. If there is no clear topic, \
return \"Chitchat\".";

/// Appended as a system message to ask for a summary
pub const SUMMARY_PROMPT: &str = "Summarize the conversation so far briefly, to be used as \
context for the rest of the conversation. Keep it within 50 characters.";

/// Returns true if the session still has the placeholder topic and enough
/// messages to name
pub fn needs_topic(session: &Session) -> bool {
    session.has_default_topic() && session.messages.len() >= TOPIC_MIN_MESSAGES
}

/// Non-streaming request asking for the session topic
pub fn topic_request(session: &Session, config: &ChatConfig) -> CompletionRequest {
    let mut messages: Vec<ChatMessage> = session
        .messages
        .iter()
        .map(|m| m.to_chat_message())
        .collect();
    messages.push(ChatMessage::user(TOPIC_PROMPT));
    CompletionRequest::new(messages, config.model_config.clone())
}

const TOPIC_QUOTES: &[char] = &['"', '“', '”'];

/// Strip surrounding quotes and trailing punctuation from a model-produced topic
///
/// Returns `None` when nothing usable is left.
///
/// # Examples
///
/// ```
/// use chatline::compaction::trim_topic;
///
/// assert_eq!(trim_topic("  Rust Borrow Checker.\n").as_deref(), Some("Rust Borrow Checker"));
/// assert_eq!(trim_topic("\"Travel Plans\"").as_deref(), Some("Travel Plans"));
/// assert_eq!(trim_topic("。！"), None);
/// ```
pub fn trim_topic(raw: &str) -> Option<String> {
    let unquoted = raw.trim().trim_matches(TOPIC_QUOTES).trim();
    let stripped = match regex::Regex::new(r#"[，。！？”“"、,.!?\s]*$"#) {
        Ok(re) => re.replace(unquoted, "").to_string(),
        Err(_) => unquoted.to_string(),
    };
    let trimmed = stripped.trim().trim_matches(TOPIC_QUOTES).trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A summarization the session is due for
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPlan {
    /// Streaming request to issue
    pub request: CompletionRequest,
    /// Offset to record once the summary completes
    pub summarized_up_to: usize,
}

/// Decide whether the session needs a new memory summary
///
/// Measures the characters of every message since the last summarized
/// offset. Above [`SUMMARY_HARD_CEILING`] only the most recent
/// `history_message_count` of them are sent for summarization. A summary is
/// due when the measured length exceeds the configured threshold.
///
/// # Examples
///
/// ```
/// use chatline::compaction::plan_summary;
/// use chatline::store::{ChatConfig, Message, Session, SessionId};
///
/// let mut session = Session::new(SessionId(1));
/// let config = ChatConfig::default();
/// assert!(plan_summary(&session, &config).is_none());
///
/// session.messages.push(Message::user("x".repeat(1200)));
/// let plan = plan_summary(&session, &config).unwrap();
/// assert_eq!(plan.summarized_up_to, 2);
/// ```
pub fn plan_summary(session: &Session, config: &ChatConfig) -> Option<SummaryPlan> {
    let offset = session.last_summarized_offset.min(session.messages.len());
    let mut pending = &session.messages[offset..];

    let pending_length: usize = pending.iter().map(|m| m.content.chars().count()).sum();
    if pending_length <= config.compress_message_length_threshold {
        return None;
    }

    if pending_length > SUMMARY_HARD_CEILING {
        pending = recent_messages(pending, config.history_message_count);
    }

    let mut messages = Vec::with_capacity(pending.len() + 2);
    if !session.memory_summary.is_empty() {
        messages.push(memory_message(&session.memory_summary));
    }
    messages.extend(pending.iter().map(|m| m.to_chat_message()));
    messages.push(ChatMessage::system(SUMMARY_PROMPT));

    Some(SummaryPlan {
        request: CompletionRequest::new(messages, config.model_config.clone()),
        summarized_up_to: session.messages.len(),
    })
}
