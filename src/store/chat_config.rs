//! Per-user chat settings persisted with the conversation state
//!
//! Updates are validated field by field: an out-of-range value is dropped
//! (the previous value is kept and a warning is logged) instead of rejecting
//! the whole update.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChatlineError, Result};
use crate::providers::ModelConfig;

/// `history_message_count` value meaning "send the whole log"
pub const HISTORY_ALL: i32 = -1;

/// Accepted range for `history_message_count` (besides [`HISTORY_ALL`])
pub const HISTORY_COUNT_RANGE: std::ops::RangeInclusive<i32> = 2..=20;

/// Accepted range for `compress_message_length_threshold`
pub const COMPRESS_THRESHOLD_RANGE: std::ops::RangeInclusive<usize> = 500..=4000;

/// Accepted range for `max_tokens`
pub const MAX_TOKENS_RANGE: std::ops::RangeInclusive<u32> = 100..=4000;

/// Accepted range for `temperature`
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=1.0;

/// Accepted range for `presence_penalty`
pub const PRESENCE_PENALTY_RANGE: std::ops::RangeInclusive<f32> = -2.0..=2.0;

/// A model the completion service offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelEntry {
    /// Model identifier
    pub name: &'static str,
    /// Whether requests may use it
    pub available: bool,
}

/// Known models
pub const ALL_MODELS: &[ModelEntry] = &[
    ModelEntry {
        name: "gpt-4",
        available: false,
    },
    ModelEntry {
        name: "gpt-4-0314",
        available: false,
    },
    ModelEntry {
        name: "gpt-4-32k",
        available: false,
    },
    ModelEntry {
        name: "gpt-4-32k-0314",
        available: false,
    },
    ModelEntry {
        name: "gpt-3.5-turbo",
        available: true,
    },
    ModelEntry {
        name: "gpt-3.5-turbo-0301",
        available: true,
    },
];

/// Returns true if `name` is a known, available model
///
/// # Examples
///
/// ```
/// use chatline::store::is_valid_model;
///
/// assert!(is_valid_model("gpt-3.5-turbo"));
/// assert!(!is_valid_model("gpt-4"));
/// assert!(!is_valid_model("llama"));
/// ```
pub fn is_valid_model(name: &str) -> bool {
    ALL_MODELS.iter().any(|m| m.name == name && m.available)
}

/// Key chord that submits input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SubmitKey {
    /// Enter
    Enter,
    /// Ctrl + Enter
    #[default]
    CtrlEnter,
    /// Shift + Enter
    ShiftEnter,
    /// Alt + Enter
    AltEnter,
}

impl fmt::Display for SubmitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "Enter"),
            Self::CtrlEnter => write!(f, "Ctrl + Enter"),
            Self::ShiftEnter => write!(f, "Shift + Enter"),
            Self::AltEnter => write!(f, "Alt + Enter"),
        }
    }
}

impl FromStr for SubmitKey {
    type Err = ChatlineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '+' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "enter" => Ok(Self::Enter),
            "ctrlenter" => Ok(Self::CtrlEnter),
            "shiftenter" => Ok(Self::ShiftEnter),
            "altenter" => Ok(Self::AltEnter),
            _ => Err(ChatlineError::Config(format!("Unknown submit key: {}", s))),
        }
    }
}

/// Chat settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Raw messages included in each request; [`HISTORY_ALL`] for all
    #[serde(default = "default_history_message_count")]
    pub history_message_count: i32,

    /// Unsummarized characters that trigger summarization
    #[serde(default = "default_compress_threshold")]
    pub compress_message_length_threshold: usize,

    /// Whether assistant replies are sent back as context
    #[serde(default = "default_send_bot_messages")]
    pub send_bot_messages: bool,

    /// Submit key chord
    #[serde(default)]
    pub submit_key: SubmitKey,

    /// Model parameters
    #[serde(default)]
    pub model_config: ModelConfig,
}

fn default_history_message_count() -> i32 {
    4
}

fn default_compress_threshold() -> usize {
    1000
}

fn default_send_bot_messages() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_message_count: default_history_message_count(),
            compress_message_length_threshold: default_compress_threshold(),
            send_bot_messages: default_send_bot_messages(),
            submit_key: SubmitKey::default(),
            model_config: ModelConfig::default(),
        }
    }
}

impl ChatConfig {
    /// Merge a candidate update over `previous`, keeping previous values for
    /// every out-of-range field
    ///
    /// # Examples
    ///
    /// ```
    /// use chatline::store::ChatConfig;
    ///
    /// let previous = ChatConfig::default();
    /// let mut candidate = previous.clone();
    /// candidate.model_config.temperature = 7.0;
    /// candidate.history_message_count = 8;
    ///
    /// let accepted = candidate.validated_against(&previous);
    /// assert_eq!(accepted.model_config.temperature, 1.0);
    /// assert_eq!(accepted.history_message_count, 8);
    /// ```
    pub fn validated_against(mut self, previous: &ChatConfig) -> ChatConfig {
        if self.history_message_count != HISTORY_ALL
            && !HISTORY_COUNT_RANGE.contains(&self.history_message_count)
        {
            tracing::warn!(
                "Dropping history_message_count={}: expected -1 or {}..={}",
                self.history_message_count,
                HISTORY_COUNT_RANGE.start(),
                HISTORY_COUNT_RANGE.end()
            );
            self.history_message_count = previous.history_message_count;
        }

        if !COMPRESS_THRESHOLD_RANGE.contains(&self.compress_message_length_threshold) {
            tracing::warn!(
                "Dropping compress_message_length_threshold={}: expected {}..={}",
                self.compress_message_length_threshold,
                COMPRESS_THRESHOLD_RANGE.start(),
                COMPRESS_THRESHOLD_RANGE.end()
            );
            self.compress_message_length_threshold = previous.compress_message_length_threshold;
        }

        let model = &mut self.model_config;
        let prev_model = &previous.model_config;

        if !is_valid_model(&model.model) {
            tracing::warn!("Dropping model={}: not an available model", model.model);
            model.model = prev_model.model.clone();
        }

        if !MAX_TOKENS_RANGE.contains(&model.max_tokens) {
            tracing::warn!(
                "Dropping max_tokens={}: expected {}..={}",
                model.max_tokens,
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end()
            );
            model.max_tokens = prev_model.max_tokens;
        }

        if !TEMPERATURE_RANGE.contains(&model.temperature) {
            tracing::warn!("Dropping temperature={}: expected 0..=1", model.temperature);
            model.temperature = prev_model.temperature;
        }

        if !PRESENCE_PENALTY_RANGE.contains(&model.presence_penalty) {
            tracing::warn!(
                "Dropping presence_penalty={}: expected -2..=2",
                model.presence_penalty
            );
            model.presence_penalty = prev_model.presence_penalty;
        }

        self
    }

    /// Set one field from its textual form
    ///
    /// Only parses the value; range checks happen when the update is applied
    /// through the store.
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::Config` for an unknown field or an unparsable value
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<()> {
        fn parse<T: FromStr>(field: &str, value: &str) -> Result<T> {
            value.trim().parse::<T>().map_err(|_| {
                ChatlineError::Config(format!("Invalid value for {}: {}", field, value)).into()
            })
        }

        match field {
            "history" | "history_message_count" => {
                self.history_message_count = parse(field, value)?
            }
            "threshold" | "compress_message_length_threshold" => {
                self.compress_message_length_threshold = parse(field, value)?
            }
            "send_bot_messages" => self.send_bot_messages = parse(field, value)?,
            "submit_key" => self.submit_key = value.parse()?,
            "model" => self.model_config.model = value.trim().to_string(),
            "temperature" => self.model_config.temperature = parse(field, value)?,
            "max_tokens" => self.model_config.max_tokens = parse(field, value)?,
            "presence_penalty" => self.model_config.presence_penalty = parse(field, value)?,
            _ => {
                return Err(ChatlineError::Config(format!("Unknown setting: {}", field)).into())
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.history_message_count, 4);
        assert_eq!(config.compress_message_length_threshold, 1000);
        assert!(config.send_bot_messages);
        assert_eq!(config.submit_key, SubmitKey::CtrlEnter);
        assert_eq!(config.model_config.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_defaults_pass_validation_unchanged() {
        let config = ChatConfig::default();
        assert_eq!(config.clone().validated_against(&config), config);
    }

    #[test]
    fn test_invalid_fields_keep_previous_values() {
        let previous = ChatConfig::default();
        let mut candidate = previous.clone();
        candidate.history_message_count = 50;
        candidate.compress_message_length_threshold = 10;
        candidate.model_config.model = "gpt-4".to_string();
        candidate.model_config.max_tokens = 5000;
        candidate.model_config.presence_penalty = -3.0;
        candidate.send_bot_messages = false;

        let accepted = candidate.validated_against(&previous);
        assert_eq!(accepted.history_message_count, 4);
        assert_eq!(accepted.compress_message_length_threshold, 1000);
        assert_eq!(accepted.model_config.model, "gpt-3.5-turbo");
        assert_eq!(accepted.model_config.max_tokens, 2000);
        assert_eq!(accepted.model_config.presence_penalty, 0.0);
        assert!(!accepted.send_bot_messages);
    }

    #[test]
    fn test_history_all_is_accepted() {
        let previous = ChatConfig::default();
        let mut candidate = previous.clone();
        candidate.history_message_count = HISTORY_ALL;
        assert_eq!(
            candidate.validated_against(&previous).history_message_count,
            HISTORY_ALL
        );
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let previous = ChatConfig::default();
        let mut candidate = previous.clone();
        candidate.history_message_count = 20;
        candidate.compress_message_length_threshold = 500;
        candidate.model_config.max_tokens = 4000;
        candidate.model_config.temperature = 0.0;
        candidate.model_config.presence_penalty = 2.0;

        let accepted = candidate.clone().validated_against(&previous);
        assert_eq!(accepted, candidate);
    }

    #[test]
    fn test_submit_key_parsing() {
        assert_eq!("Enter".parse::<SubmitKey>().unwrap(), SubmitKey::Enter);
        assert_eq!("ctrl+enter".parse::<SubmitKey>().unwrap(), SubmitKey::CtrlEnter);
        assert_eq!("Shift + Enter".parse::<SubmitKey>().unwrap(), SubmitKey::ShiftEnter);
        assert_eq!("alt-enter".parse::<SubmitKey>().unwrap(), SubmitKey::AltEnter);
        assert!("space".parse::<SubmitKey>().is_err());
        assert_eq!(SubmitKey::CtrlEnter.to_string(), "Ctrl + Enter");
    }

    #[test]
    fn test_set_field() {
        let mut config = ChatConfig::default();
        config.set_field("history", "10").unwrap();
        config.set_field("temperature", "0.5").unwrap();
        config.set_field("send_bot_messages", "false").unwrap();
        config.set_field("submit_key", "enter").unwrap();
        config.set_field("model", "gpt-3.5-turbo-0301").unwrap();

        assert_eq!(config.history_message_count, 10);
        assert_eq!(config.model_config.temperature, 0.5);
        assert!(!config.send_bot_messages);
        assert_eq!(config.submit_key, SubmitKey::Enter);
        assert_eq!(config.model_config.model, "gpt-3.5-turbo-0301");
    }

    #[test]
    fn test_set_field_rejects_unknown_and_unparsable() {
        let mut config = ChatConfig::default();
        assert!(config.set_field("colour", "blue").is_err());
        assert!(config.set_field("max_tokens", "lots").is_err());
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_model_catalogue() {
        assert_eq!(ALL_MODELS.len(), 6);
        assert_eq!(ALL_MODELS.iter().filter(|m| m.available).count(), 2);
        assert!(is_valid_model("gpt-3.5-turbo-0301"));
        assert!(!is_valid_model("gpt-4-32k"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ChatConfig = serde_json::from_str(r#"{"send_bot_messages":false}"#).unwrap();
        assert!(!config.send_bot_messages);
        assert_eq!(config.history_message_count, 4);
        assert_eq!(config.model_config.max_tokens, 2000);
    }
}
