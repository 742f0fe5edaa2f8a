//! Completion transports for chatline
//!
//! This module contains the transport abstraction and its implementations:
//! the HTTP client for OpenAI-compatible endpoints and a scripted fake for
//! tests.

pub mod base;
pub mod fake;
pub mod openai;

pub use base::{
    ChatMessage, CompletionRequest, CompletionTransport, DeltaStream, ModelConfig, Role,
};
pub use fake::{ScriptedTransport, StreamScript};
pub use openai::OpenAiTransport;

use crate::config::ProviderConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create the HTTP transport from configuration
///
/// # Arguments
///
/// * `config` - Provider configuration
///
/// # Returns
///
/// Returns a shareable transport instance
///
/// # Errors
///
/// Returns error if the HTTP client cannot be initialized
pub fn create_transport(config: &ProviderConfig) -> Result<Arc<dyn CompletionTransport>> {
    Ok(Arc::new(OpenAiTransport::new(config.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_transport_from_default_config() {
        assert!(create_transport(&ProviderConfig::default()).is_ok());
    }
}
