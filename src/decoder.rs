//! Server-sent event decoder for streaming chat completions
//!
//! Turns the raw body of a `text/event-stream` completion response into a
//! lazy sequence of [`StreamEvent`]s. Events are separated by blank lines;
//! within an event block only `data:` lines matter. A `data:` value is either
//! the `[DONE]` terminator or a JSON chunk of the shape
//! `{"choices":[{"delta":{"content":"..."}}]}`.
//!
//! The decoded sequence is finite and cannot be restarted: it ends after the
//! terminator, after the first failure, or when the body ends.

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::{ChatlineError, Result};
use crate::providers::DeltaStream;

/// Terminator value carried by the final `data:` frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded item of a reply stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text fragment
    Delta(String),
    /// The reply is complete
    Done,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a single `data:` value
///
/// Returns `Ok(None)` for chunks that carry no text (the role-only opening
/// chunk, the finish chunk).
///
/// # Errors
///
/// Returns `ChatlineError::Decode` if the value is not JSON or lacks
/// `choices[0].delta`
///
/// # Examples
///
/// ```
/// use chatline::decoder::{decode_data, StreamEvent};
///
/// let event = decode_data(r#"{"choices":[{"delta":{"content":"A"}}]}"#).unwrap();
/// assert_eq!(event, Some(StreamEvent::Delta("A".to_string())));
/// assert_eq!(decode_data("[DONE]").unwrap(), Some(StreamEvent::Done));
/// assert!(decode_data(r#"{"object":"error"}"#).is_err());
/// ```
pub fn decode_data(data: &str) -> Result<Option<StreamEvent>> {
    if data == DONE_SENTINEL {
        return Ok(Some(StreamEvent::Done));
    }

    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| ChatlineError::Decode(format!("invalid completion chunk: {}", e)))?;

    let choice = chunk
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatlineError::Decode("completion chunk has no choices".to_string()))?;

    Ok(choice
        .delta
        .content
        .filter(|text| !text.is_empty())
        .map(StreamEvent::Delta))
}

/// Decode one event block (the text between two blank lines)
fn decode_block(block: &[u8]) -> Result<Option<StreamEvent>> {
    let text = std::str::from_utf8(block)
        .map_err(|e| ChatlineError::Decode(format!("event is not valid UTF-8: {}", e)))?;

    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<&str> = None;

    for line in text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
        // `id:`, `retry:` and `:` comment lines carry nothing we use.
    }

    if matches!(event_type, Some(et) if et.eq_ignore_ascii_case("ping")) {
        return Ok(None);
    }

    let data = data_lines.join("\n");
    if data.is_empty() {
        return Ok(None);
    }

    decode_data(&data)
}

/// Incremental SSE framer and chunk decoder
///
/// Buffers raw bytes until a blank line completes an event block, so event
/// boundaries and multi-byte characters may fall anywhere inside transport
/// chunks. Carriage returns are dropped on the way in, which makes CRLF
/// framing equivalent to LF framing.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    terminated: bool,
}

impl SseDecoder {
    /// Creates an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once a terminator or a failure has been produced
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed raw body bytes and collect every event completed by them
    ///
    /// Nothing is produced after a terminal item.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatline::decoder::{SseDecoder, StreamEvent};
    ///
    /// let mut decoder = SseDecoder::new();
    /// assert!(decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel").is_empty());
    /// let events = decoder.feed(b"lo\"}}]}\n\ndata: [DONE]\n\n");
    /// assert_eq!(events.len(), 2);
    /// assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("Hello".to_string()));
    /// assert_eq!(events[1].as_ref().unwrap(), &StreamEvent::Done);
    /// ```
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }

        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        while let Some(pos) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).take(pos).collect();
            if self.push_decoded(decode_block(&block), &mut events) {
                break;
            }
        }

        events
    }

    /// Flush a trailing event block left when the body ended without a blank line
    pub fn finish(&mut self) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        if self.terminated || self.buffer.is_empty() {
            return events;
        }

        let block = std::mem::take(&mut self.buffer);
        self.push_decoded(decode_block(&block), &mut events);
        events
    }

    /// Returns true when the pushed item ends the stream
    fn push_decoded(
        &mut self,
        decoded: Result<Option<StreamEvent>>,
        events: &mut Vec<Result<StreamEvent>>,
    ) -> bool {
        match decoded {
            Ok(None) => false,
            Ok(Some(event)) => {
                let done = event == StreamEvent::Done;
                events.push(Ok(event));
                if done {
                    self.terminate();
                }
                done
            }
            Err(e) => {
                events.push(Err(e));
                self.terminate();
                true
            }
        }
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.buffer.clear();
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamEvent>>,
    finished: bool,
}

/// Decode an SSE response body into a [`DeltaStream`]
///
/// A read error on the body becomes a `ChatlineError::Provider` item. A body
/// that ends without the terminator ends with a final [`StreamEvent::Done`]
/// after any trailing block has been decoded.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use chatline::decoder::{decode_event_stream, StreamEvent};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
///     b"data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\ndata: [DONE]\n\n",
/// ))]);
/// let events: Vec<_> = decode_event_stream(body).collect().await;
/// assert_eq!(events.len(), 2);
/// assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("A".to_string()));
/// assert_eq!(events[1].as_ref().unwrap(), &StreamEvent::Done);
/// # }
/// ```
pub fn decode_event_stream<S, E>(body: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if matches!(item, Ok(StreamEvent::Done) | Err(_)) {
                    st.finished = true;
                    st.pending.clear();
                }
                return Some((item, st));
            }

            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.pending.extend(st.decoder.feed(&chunk));
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(ChatlineError::Provider(format!(
                        "stream read failed: {}",
                        e
                    ))
                    .into()));
                }
                None => {
                    st.pending.extend(st.decoder.finish());
                    st.pending.push_back(Ok(StreamEvent::Done));
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> std::result::Result<Bytes, std::io::Error> {
        Ok(Bytes::from(text.to_string()))
    }

    fn delta_frame(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    async fn collect(chunks: Vec<std::result::Result<Bytes, std::io::Error>>) -> Vec<Result<StreamEvent>> {
        decode_event_stream(futures::stream::iter(chunks))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_single_delta_then_done() {
        let body = format!("{}data: [DONE]\n\n", delta_frame("A"));
        let events = collect(vec![chunk(&body)]).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("A".to_string()));
        assert_eq!(events[1].as_ref().unwrap(), &StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let body = format!("{}{}data: [DONE]\n\n", delta_frame("he"), delta_frame("llo"));
        let (a, b) = body.split_at(17);
        let events = collect(vec![chunk(a), chunk(b)]).await;

        let deltas: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::Delta(text)) => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["he".to_string(), "llo".to_string()]);
        assert_eq!(events.last().unwrap().as_ref().unwrap(), &StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let body = format!("{}data: [DONE]\n\n", delta_frame("你好"));
        let bytes = body.into_bytes();
        // Cut in the middle of the first three-byte character.
        let cut = bytes.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from(bytes[..cut].to_vec())),
            Ok(Bytes::from(bytes[cut..].to_vec())),
        ];
        let events = collect(chunks).await;

        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("你好".to_string()));
    }

    #[tokio::test]
    async fn test_crlf_framing() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n";
        let events = collect(vec![chunk(body)]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("A".to_string()));
    }

    #[tokio::test]
    async fn test_role_only_and_finish_chunks_produce_nothing() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = collect(vec![chunk(body)]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("ok".to_string()));
    }

    #[tokio::test]
    async fn test_event_lines_and_comments_are_ignored() {
        let body = format!(
            ": keep-alive\n\nevent: ping\ndata: ignored\n\nevent: message\nid: 7\n{}data: [DONE]\n\n",
            delta_frame("x")
        );
        let events = collect(vec![chunk(&body)]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("x".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_json_terminates_early() {
        let body = format!(
            "{}data: {{not json\n\n{}data: [DONE]\n\n",
            delta_frame("a"),
            delta_frame("b")
        );
        let events = collect(vec![chunk(&body)]).await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        let err = events[1].as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatlineError>(),
            Some(ChatlineError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_choices_is_a_decode_failure() {
        let events = collect(vec![chunk("data: {\"error\":\"overloaded\"}\n\n")]).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_empty_choices_is_a_decode_failure() {
        let events = collect(vec![chunk("data: {\"choices\":[]}\n\n")]).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_a_decode_failure() {
        let mut bytes = b"data: ".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b"\n\n");
        let events = collect(vec![Ok(Bytes::from(bytes))]).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_body_read_error_terminates_with_failure() {
        let chunks = vec![
            chunk(&delta_frame("partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            chunk(&delta_frame("never")),
        ];
        let events = collect(chunks).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("partial".to_string()));
        let err = events[1].as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatlineError>(),
            Some(ChatlineError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_body_without_terminator_ends_with_done() {
        // Trailing block has no blank line after it.
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let events = collect(vec![chunk(body)]).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("tail".to_string()));
        assert_eq!(events[1].as_ref().unwrap(), &StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_nothing_after_done() {
        let body = format!("data: [DONE]\n\n{}", delta_frame("late"));
        let events = collect(vec![chunk(&body), chunk(&delta_frame("later"))]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Done);
    }

    #[test]
    fn test_decoder_ignores_input_after_termination() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: [DONE]\n\n");
        assert_eq!(events.len(), 1);
        assert!(decoder.is_terminated());
        assert!(decoder.feed(delta_frame("x").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decode_data_empty_content_is_skipped() {
        let event = decode_data(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap();
        assert!(event.is_none());
    }
}
