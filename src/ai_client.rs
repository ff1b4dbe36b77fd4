use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AssistError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl ChatRequest {
    /// Streaming request with the fixed `[system, user]` role sequence.
    pub fn streaming(model: &str, instruction: &str, user_message: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: instruction.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_message.to_string(),
                },
            ],
            stream: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Ordered text fragments of one streamed completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Remote completion service. Implemented by [`AiClient`] and by test fakes.
pub trait CompletionService: Send + Sync {
    fn stream_chat<'a>(
        &'a self,
        api_key: &'a str,
        request: ChatRequest,
    ) -> BoxFuture<'a, Result<FragmentStream>>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct AiClient {
    client: Client,
    base_url: String,
}

impl AiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AssistError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl CompletionService for AiClient {
    fn stream_chat<'a>(
        &'a self,
        api_key: &'a str,
        request: ChatRequest,
    ) -> BoxFuture<'a, Result<FragmentStream>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint())
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| AssistError::Transport(format!("failed to send request: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                return Err(AssistError::Service(format!(
                    "request failed with status {}: {}",
                    status, error_text
                )));
            }

            Ok(decode_sse(response.bytes_stream()))
        })
    }
}

struct DecodeState<S> {
    stream: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

/// Turns a server-sent-events byte stream into content fragments.
///
/// Ends at `[DONE]` or at end of body. An error payload or a broken body is
/// yielded once as the final item.
pub fn decode_sse<S, E>(stream: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        stream: Box::pin(stream),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            let events = match state.stream.next().await {
                Some(Ok(chunk)) => state.decoder.push(&chunk),
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(AssistError::Transport(format!("stream error: {e}"))));
                    state.finished = true;
                    continue;
                }
                None => {
                    state.finished = true;
                    state.decoder.finish()
                }
            };

            for event in events {
                match event {
                    SseEvent::Content(content) => state.pending.push_back(Ok(content)),
                    SseEvent::Done => {
                        state.finished = true;
                        break;
                    }
                    SseEvent::Failed(message) => {
                        state.pending.push_back(Err(AssistError::Service(message)));
                        state.finished = true;
                        break;
                    }
                }
            }
        }
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Content(String),
    Done,
    Failed(String),
}

/// Line splitter for SSE bodies. Bytes are buffered until a full line is
/// available, so multi-byte characters split across chunks decode intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut last_newline = 0;
        for i in 0..self.buffer.len() {
            if self.buffer[i] == b'\n' {
                if let Some(event) = parse_sse_line(&self.buffer[last_newline..i]) {
                    events.push(event);
                }
                last_newline = i + 1;
            }
        }

        if last_newline > 0 {
            self.buffer.drain(..last_newline);
        }
        events
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_sse_line(&rest).into_iter().collect()
    }
}

fn parse_sse_line(line: &[u8]) -> Option<SseEvent> {
    let line_str = std::str::from_utf8(line).ok()?;
    let line_str = line_str.strip_suffix('\r').unwrap_or(line_str);

    let json_str = line_str.strip_prefix("data:")?.trim();

    if json_str == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let response = serde_json::from_str::<StreamResponse>(json_str).ok()?;
    if let Some(error) = response.error {
        return Some(SseEvent::Failed(error.message));
    }

    let content = response.choices.into_iter().next()?.delta.content?;
    if content.is_empty() {
        None
    } else {
        Some(SseEvent::Content(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}},\"finish_reason\":null}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    fn body(chunks: Vec<&str>) -> impl Stream<Item = std::result::Result<Bytes, String>> {
        futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from(c.to_string())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[test]
    fn test_request_has_system_then_user() {
        let request = ChatRequest::streaming("deepseek-chat", "be brief", "Summarize:\nabc");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Summarize:\nabc");
    }

    #[test]
    fn test_parse_content_line() {
        let line = data("Hel");
        assert_eq!(
            parse_sse_line(line.trim_end().as_bytes()),
            Some(SseEvent::Content("Hel".into()))
        );
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_sse_line(b"data: [DONE]"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line(b"data:[DONE]\r"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line(b""), None);
        assert_eq!(parse_sse_line(b": keep-alive"), None);
        assert_eq!(parse_sse_line(b"event: message"), None);
        assert_eq!(parse_sse_line(b"data: {not json"), None);
    }

    #[test]
    fn test_parse_role_only_delta_is_skipped() {
        let line = br#"data: {"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), None);
    }

    #[test]
    fn test_parse_error_payload() {
        let line = br#"data: {"error":{"message":"rate limited","type":"requests"}}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(SseEvent::Failed("rate limited".into()))
        );
    }

    #[test]
    fn test_decoder_handles_split_multibyte_text() {
        let line = data("总结");
        let bytes = line.as_bytes();
        let split = line.find('总').unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(
            decoder.push(&bytes[split..]),
            vec![SseEvent::Content("总结".into())]
        );
    }

    #[test]
    fn test_decoder_flushes_unterminated_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
    }

    #[tokio::test]
    async fn test_all_fragments_in_one_chunk_are_kept() {
        let chunk = format!("{}{}{}data: [DONE]\n\n", data("a"), data("b"), data("c"));
        let items = collect(decode_sse(body(vec![chunk.as_str()]))).await;

        let fragments: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(fragments, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_content_after_done_is_ignored() {
        let chunk = format!("{}data: [DONE]\n\n{}", data("a"), data("late"));
        let items = collect(decode_sse(body(vec![chunk.as_str()]))).await;

        assert_eq!(items, vec![Ok("a".to_string())]);
    }

    #[tokio::test]
    async fn test_end_of_body_without_done_ends_stream() {
        let first = data("Hel");
        let second = data("lo");
        let items = collect(decode_sse(body(vec![first.as_str(), second.as_str()]))).await;

        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_error_payload_ends_stream_with_service_error() {
        let chunk = format!(
            "{}data: {{\"error\":{{\"message\":\"overloaded\"}}}}\n\n{}",
            data("Hel"),
            data("lo")
        );
        let items = collect(decode_sse(body(vec![chunk.as_str()]))).await;

        assert_eq!(
            items,
            vec![
                Ok("Hel".to_string()),
                Err(AssistError::Service("overloaded".into()))
            ]
        );
    }

    #[tokio::test]
    async fn test_broken_body_ends_stream_with_transport_error() {
        let first = data("Hel");
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from(first)),
            Err("connection reset".to_string()),
            Ok(Bytes::from(data("lo"))),
        ]);
        let items = collect(decode_sse(stream)).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("Hel".to_string()));
        assert!(matches!(&items[1], Err(AssistError::Transport(msg)) if msg.contains("connection reset")));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = AiClient::new("https://api.example.com/v1/").unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
