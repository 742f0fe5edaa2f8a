//! OpenAI-compatible HTTP transport for chatline
//!
//! Sends chat completion requests to `{api_base}/v1/chat/completions`, either
//! as a single JSON exchange or as a `text/event-stream` reply that is handed
//! to the [`crate::decoder`] for incremental decoding.

use crate::config::ProviderConfig;
use crate::decoder::decode_event_stream;
use crate::error::{ChatlineError, Result};
use crate::providers::{ChatMessage, CompletionRequest, CompletionTransport, DeltaStream};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Path appended to the configured API base
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// HTTP transport for OpenAI-compatible chat completion endpoints
///
/// # Examples
///
/// ```
/// use chatline::config::ProviderConfig;
/// use chatline::providers::OpenAiTransport;
///
/// let transport = OpenAiTransport::new(ProviderConfig::default()).unwrap();
/// assert_eq!(transport.endpoint(), "https://api.openai.com/v1/chat/completions");
/// ```
pub struct OpenAiTransport {
    client: Client,
    config: ProviderConfig,
}

/// Request body for `/v1/chat/completions`
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    presence_penalty: f32,
    stream: bool,
}

/// Non-streaming response body
#[derive(Debug, Deserialize)]
struct CompletionResponseBody {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiTransport {
    /// Create a new transport
    ///
    /// Only connection establishment is bounded by a timeout; reply streams
    /// may run as long as the service keeps sending.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(concat!("chatline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatlineError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized completion transport: api_base={}", config.api_base);

        Ok(Self { client, config })
    }

    /// Full URL of the completions endpoint
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.api_base.trim_end_matches('/'),
            COMPLETIONS_PATH
        )
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let config = &request.model_config;
        let body = CompletionBody {
            model: &config.model,
            messages: &request.messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            presence_penalty: config.presence_penalty,
            stream,
        };

        let url = self.endpoint();
        tracing::debug!(
            "Sending completion request: url={}, model={}, messages={}, stream={}",
            url,
            config.model,
            request.messages.len(),
            stream
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Completion request failed: {}", e);
            ChatlineError::Provider(format!("Completion request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Completion service returned {}: {}", status, error_text);
            return Err(ChatlineError::Provider(format!(
                "Completion service returned {}: {}",
                status, error_text
            ))
            .into());
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self.send(request, false).await?;

        let body: CompletionResponseBody = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse completion response: {}", e);
            ChatlineError::Provider(format!("Failed to parse completion response: {}", e))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ChatlineError::Provider("Completion response contained no message".to_string())
                    .into()
            })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<DeltaStream> {
        let response = self.send(request, true).await?;
        Ok(decode_event_stream(response.bytes_stream()))
    }
}
