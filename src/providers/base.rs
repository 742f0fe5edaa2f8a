//! Completion transport trait and wire types for chatline
//!
//! This module defines the [`CompletionTransport`] trait that every chat
//! completion backend implements, along with the request and message types
//! that cross that boundary.

use crate::decoder::StreamEvent;
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and synthetic context (memory summary, prompts)
    System,
    /// The human side of the conversation
    User,
    /// The model side of the conversation
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message as sent to the completion service
///
/// # Examples
///
/// ```
/// use chatline::providers::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Hello!");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.content, "Hello!");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Creates a new message with an explicit role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling parameters sent with every completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier
    pub model: String,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Presence penalty (-2.0-2.0)
    pub presence_penalty: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 1.0,
            max_tokens: 2000,
            presence_penalty: 0.0,
        }
    }
}

/// A chat completion request: the ordered message window plus model parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Ordered messages, oldest first
    pub messages: Vec<ChatMessage>,
    /// Model parameters
    pub model_config: ModelConfig,
}

impl CompletionRequest {
    /// Creates a new request
    ///
    /// # Examples
    ///
    /// ```
    /// use chatline::providers::{ChatMessage, CompletionRequest, ModelConfig};
    ///
    /// let request = CompletionRequest::new(vec![ChatMessage::user("hi")], ModelConfig::default());
    /// assert_eq!(request.messages.len(), 1);
    /// assert_eq!(request.model_config.model, "gpt-3.5-turbo");
    /// ```
    pub fn new(messages: Vec<ChatMessage>, model_config: ModelConfig) -> Self {
        Self {
            messages,
            model_config,
        }
    }
}

/// Lazily decoded reply stream
///
/// Yields content deltas in arrival order and ends after the first
/// [`StreamEvent::Done`] or the first error.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Completion transport trait
///
/// Implemented by the HTTP client for OpenAI-compatible endpoints and by the
/// scripted in-process fake used in tests. Implementations are shared between
/// the foreground reply task and background compaction tasks through
/// `Arc<dyn CompletionTransport>`.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use chatline::error::Result;
/// use chatline::providers::{CompletionRequest, CompletionTransport, DeltaStream};
///
/// struct EchoTransport;
///
/// #[async_trait]
/// impl CompletionTransport for EchoTransport {
///     async fn complete(&self, request: &CompletionRequest) -> Result<String> {
///         Ok(request.messages.last().map(|m| m.content.clone()).unwrap_or_default())
///     }
///
///     async fn stream(&self, _request: &CompletionRequest) -> Result<DeltaStream> {
///         unimplemented!()
///     }
/// }
/// ```
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Requests one full completion and returns the reply text
    ///
    /// Used for low-latency auxiliary tasks such as topic inference.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the service answers with a
    /// non-success status, or the body does not contain a reply
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Opens a streaming completion
    ///
    /// Resolves once the response headers have arrived. Dropping the returned
    /// stream aborts the underlying request.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails before any body bytes arrive
    async fn stream(&self, request: &CompletionRequest) -> Result<DeltaStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::System.to_string(), "system");
    }

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, Role::System);
        assert_eq!(ChatMessage::user("u").role, Role::User);
        let msg = ChatMessage::assistant("a");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "a");
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let value = serde_json::to_value(ChatMessage::user("hello")).unwrap();
        assert_eq!(value, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_model_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.presence_penalty, 0.0);
    }
}
