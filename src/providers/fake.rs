//! Scripted in-process transport for unit and integration tests
//!
//! [`ScriptedTransport`] replaces the network in tests. Each call to
//! [`CompletionTransport::stream`] takes the next matching [`StreamScript`]
//! from a queue and replays it step by step; each call to
//! [`CompletionTransport::complete`] takes the next queued completion. Every
//! request is recorded so tests can assert on what the orchestrator sent.
//!
//! # Example
//!
//! ```
//! use chatline::providers::fake::{ScriptedTransport, StreamScript};
//! use chatline::providers::{ChatMessage, CompletionRequest, CompletionTransport, ModelConfig};
//! use futures::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let transport = ScriptedTransport::new();
//! transport.push_stream(StreamScript::reply(&["Hi", " there"]));
//!
//! let request = CompletionRequest::new(vec![ChatMessage::user("hello")], ModelConfig::default());
//! let events: Vec<_> = transport.stream(&request).await.unwrap().collect().await;
//! assert_eq!(events.len(), 3);
//! assert_eq!(transport.requests().len(), 1);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::decoder::StreamEvent;
use crate::error::{ChatlineError, Result};
use crate::providers::{CompletionRequest, CompletionTransport, DeltaStream};

/// One step of a scripted reply stream
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Emit a content delta
    Delta(String),
    /// Emit the terminator and end
    Done,
    /// Emit a provider failure and end
    Fail(String),
    /// Wait before the next step
    Delay(Duration),
    /// Never produce another item
    Hang,
}

/// A scripted reply to one streaming request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamScript {
    steps: Vec<ScriptStep>,
    refuse: Option<String>,
}

impl StreamScript {
    /// Creates an empty script; a stream that simply ends
    pub fn new() -> Self {
        Self::default()
    }

    /// Deltas followed by the terminator
    pub fn reply(deltas: &[&str]) -> Self {
        deltas
            .iter()
            .fold(Self::new(), |script, delta| script.delta(*delta))
            .done()
    }

    /// A stream that is refused before any body arrives
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            refuse: Some(message.into()),
        }
    }

    /// Append a delta step
    pub fn delta(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Delta(text.into()));
        self
    }

    /// Append the terminator
    pub fn done(mut self) -> Self {
        self.steps.push(ScriptStep::Done);
        self
    }

    /// Append a mid-stream failure
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Fail(message.into()));
        self
    }

    /// Append a pause
    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Delay(duration));
        self
    }

    /// Append a step that never completes
    pub fn hang(mut self) -> Self {
        self.steps.push(ScriptStep::Hang);
        self
    }
}

/// Which transport method a recorded request went through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `stream`
    Stream,
    /// `complete`
    Complete,
}

/// A request captured by the fake
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Method used
    pub kind: RequestKind,
    /// The request as received
    pub request: CompletionRequest,
}

#[derive(Debug, Default)]
struct Inner {
    streams: VecDeque<(Option<String>, StreamScript)>,
    completions: VecDeque<std::result::Result<String, String>>,
    requests: Vec<RecordedRequest>,
}

/// In-process fake for [`CompletionTransport`]
///
/// Cloning yields another handle onto the same queues and request log, so a
/// test can keep one handle while the orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTransport {
    /// Creates a transport with empty queues
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a script for the next streaming request
    pub fn push_stream(&self, script: StreamScript) {
        self.lock().streams.push_back((None, script));
    }

    /// Queue a script for the next streaming request whose final message
    /// contains `needle`
    ///
    /// Lets tests tell foreground replies apart from background summary
    /// requests whose relative order is not fixed.
    pub fn push_stream_matching(&self, needle: impl Into<String>, script: StreamScript) {
        self.lock().streams.push_back((Some(needle.into()), script));
    }

    /// Queue the reply for the next non-streaming request
    pub fn push_completion(&self, text: impl Into<String>) {
        self.lock().completions.push_back(Ok(text.into()));
    }

    /// Queue a failure for the next non-streaming request
    pub fn push_completion_failure(&self, message: impl Into<String>) {
        self.lock().completions.push_back(Err(message.into()));
    }

    /// All requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests received through `stream`
    pub fn stream_requests(&self) -> Vec<CompletionRequest> {
        self.requests_of(RequestKind::Stream)
    }

    /// Requests received through `complete`
    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.requests_of(RequestKind::Complete)
    }

    fn requests_of(&self, kind: RequestKind) -> Vec<CompletionRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.request.clone())
            .collect()
    }

    fn record(&self, kind: RequestKind, request: &CompletionRequest) {
        self.lock().requests.push(RecordedRequest {
            kind,
            request: request.clone(),
        });
    }

    fn take_stream_script(&self, request: &CompletionRequest) -> Option<StreamScript> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let mut inner = self.lock();
        let position = inner.streams.iter().position(|(needle, _)| match needle {
            Some(needle) => last.contains(needle.as_str()),
            None => true,
        })?;
        inner.streams.remove(position).map(|(_, script)| script)
    }
}

fn replay(steps: Vec<ScriptStep>) -> DeltaStream {
    Box::pin(futures::stream::unfold(
        steps.into_iter(),
        |mut steps| async move {
            loop {
                let item: Result<StreamEvent> = match steps.next()? {
                    ScriptStep::Delta(text) => Ok(StreamEvent::Delta(text)),
                    ScriptStep::Done => Ok(StreamEvent::Done),
                    ScriptStep::Fail(message) => Err(ChatlineError::Provider(message).into()),
                    ScriptStep::Delay(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    ScriptStep::Hang => {
                        futures::future::pending::<()>().await;
                        continue;
                    }
                };

                if !matches!(item, Ok(StreamEvent::Delta(_))) {
                    // Terminal item; drop the remaining steps.
                    steps = Vec::new().into_iter();
                }
                return Some((item, steps));
            }
        },
    ))
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.record(RequestKind::Complete, request);
        match self.lock().completions.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ChatlineError::Provider(message).into()),
            None => Err(ChatlineError::Provider("no scripted completion".to_string()).into()),
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<DeltaStream> {
        self.record(RequestKind::Stream, request);
        let script = self
            .take_stream_script(request)
            .ok_or_else(|| ChatlineError::Provider("no scripted stream".to_string()))?;

        if let Some(message) = script.refuse {
            return Err(ChatlineError::Provider(message).into());
        }

        Ok(replay(script.steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, ModelConfig};
    use futures::StreamExt;

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user(content)], ModelConfig::default())
    }

    #[tokio::test]
    async fn test_reply_script_yields_deltas_then_done() {
        let transport = ScriptedTransport::new();
        transport.push_stream(StreamScript::reply(&["a", "b"]));

        let events: Vec<StreamEvent> = transport
            .stream(&request("x"))
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("a".to_string()),
                StreamEvent::Delta("b".to_string()),
                StreamEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_step_ends_stream() {
        let transport = ScriptedTransport::new();
        transport.push_stream(StreamScript::new().delta("a").fail("boom").delta("never"));

        let events: Vec<_> = transport.stream(&request("x")).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].is_err());
    }

    #[tokio::test]
    async fn test_refused_script_fails_open() {
        let transport = ScriptedTransport::new();
        transport.push_stream(StreamScript::refused("503"));
        assert!(transport.stream(&request("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_matching_script_is_selected_by_last_message() {
        let transport = ScriptedTransport::new();
        transport.push_stream_matching("summarize", StreamScript::reply(&["summary"]));
        transport.push_stream(StreamScript::reply(&["answer"]));

        let mut stream = transport.stream(&request("question")).await.unwrap();
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::Delta("answer".to_string())
        );

        let mut stream = transport.stream(&request("please summarize")).await.unwrap();
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            StreamEvent::Delta("summary".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_queue_is_an_error() {
        let transport = ScriptedTransport::new();
        assert!(transport.stream(&request("x")).await.is_err());
        assert!(transport.complete(&request("x")).await.is_err());
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_completions_are_recorded() {
        let transport = ScriptedTransport::new();
        transport.push_completion("Topic");
        transport.push_completion_failure("down");

        assert_eq!(transport.complete(&request("one")).await.unwrap(), "Topic");
        assert!(transport.complete(&request("two")).await.is_err());

        let sent = transport.completion_requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].messages[0].content, "two");
        assert!(transport.stream_requests().is_empty());
    }

    #[tokio::test]
    async fn test_hang_never_completes() {
        let transport = ScriptedTransport::new();
        transport.push_stream(StreamScript::new().delta("a").hang());

        let mut stream = transport.stream(&request("x")).await.unwrap();
        assert!(stream.next().await.is_some());
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err());
    }
}
