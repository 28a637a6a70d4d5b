//! Anthropic API provider
//!
//! Uses reqwest for streaming chat completions via SSE.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{split_system, ChatProvider, CompletionResult, ProviderEvent};
use crate::agent::{Message, MessageRole};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Replies here are a single amount
const MAX_TOKENS: u32 = 64;

/// Anthropic API provider
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key and model
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).context("Invalid API key")?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn stream_completion(
        &self,
        messages: &[Message],
        event_tx: mpsc::Sender<ProviderEvent>,
        cancel_token: CancellationToken,
    ) -> Result<CompletionResult> {
        let (system, anthropic_messages) = convert_messages(messages);

        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: anthropic_messages,
            system,
            stream: Some(true),
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Anthropic API")?;

        if !response.status().is_success() {
            let error: AnthropicError = response.json().await?;
            return Err(anyhow::anyhow!(
                "Anthropic API error: {}",
                error.error.message
            ));
        }

        // Process SSE stream
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut text_content = String::new();
        let mut finished = false;

        while let Some(chunk_result) = stream.next().await {
            if cancel_token.is_cancelled() {
                break;
            }

            let chunk = chunk_result?;
            for event_data in decoder.push(&chunk) {
                for data in sse_data_lines(&event_data) {
                    let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
                        continue;
                    };
                    match event {
                        StreamEvent::ContentBlockDelta {
                            delta: ContentBlockDelta::TextDelta { text },
                            ..
                        } => {
                            let _ = event_tx.send(ProviderEvent::TextDelta(text.clone())).await;
                            text_content.push_str(&text);
                        }
                        StreamEvent::MessageStop => {
                            debug!("Message complete");
                            finished = true;
                        }
                        StreamEvent::Error { error } => {
                            let _ = event_tx
                                .send(ProviderEvent::Error(error.message.clone()))
                                .await;
                            return Err(anyhow::anyhow!("Anthropic error: {}", error.message));
                        }
                        _ => {}
                    }
                }
            }
        }

        if !finished && !cancel_token.is_cancelled() {
            let message = "Anthropic stream ended before the reply was complete".to_string();
            let _ = event_tx.send(ProviderEvent::Error(message.clone())).await;
            return Err(anyhow::anyhow!(message));
        }

        let _ = event_tx.send(ProviderEvent::Done).await;

        Ok(CompletionResult { text: text_content })
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Splits a byte stream into complete SSE events.
///
/// Bytes are buffered until the blank line that ends an event, so a UTF-8
/// sequence split across network chunks is decoded whole.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            events.push(String::from_utf8_lossy(&event[..end]).into_owned());
        }
        events
    }
}

/// Payloads of the `data:` lines in one SSE event, skipping the `[DONE]` marker
fn sse_data_lines(event: &str) -> impl Iterator<Item = &str> {
    event
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
}

/// Convert messages to Anthropic format, extracting the system prompt
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let (system, rest) = split_system(messages);
    let converted = rest
        .into_iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| AnthropicMessage {
            role: match m.role {
                MessageRole::Assistant => "assistant",
                _ => "user",
            }
            .to_string(),
            content: m.content.clone(),
        })
        .collect();
    (system, converted)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

// Stream event types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(dead_code)] // Fields required for deserialization but not all are read
enum StreamEvent {
    MessageStart {
        message: serde_json::Value,
    },
    ContentBlockStart {
        index: usize,
        content_block: serde_json::Value,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentBlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: serde_json::Value,
    },
    MessageStop,
    Ping,
    Error {
        error: AnthropicErrorDetail,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockDelta {
    TextDelta { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_moves_system_out() {
        let messages = vec![
            Message::system("Reply with the amount only."),
            Message::user("Your order total is $12.99"),
        ];
        let (system, converted) = convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("Reply with the amount only."));
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[0].content, "Your order total is $12.99");
    }

    #[test]
    fn test_convert_messages_drops_empty_turns() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant(""),
            Message::user("again"),
        ];
        let (_, converted) = convert_messages(&messages);
        assert_eq!(converted.len(), 2);
    }

    #[test]
    fn test_parse_text_delta_event() {
        let event = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"42.10\"}}";
        let data: Vec<&str> = sse_data_lines(event).collect();
        assert_eq!(data.len(), 1);
        let parsed: StreamEvent = serde_json::from_str(data[0]).unwrap();
        match parsed {
            StreamEvent::ContentBlockDelta {
                delta: ContentBlockDelta::TextDelta { text },
                ..
            } => assert_eq!(text, "42.10"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_keeps_split_characters_whole() {
        let event = "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"€12.00\"}}\n\n";
        let bytes = event.as_bytes();
        // Cut inside the three-byte euro sign
        let euro = event.find('€').unwrap();
        let (first, second) = bytes.split_at(euro + 2);

        let mut decoder = SseDecoder::default();
        assert!(decoder.push(first).is_empty());
        let events = decoder.push(second);
        assert_eq!(events.len(), 1);

        let data: Vec<&str> = sse_data_lines(&events[0]).collect();
        let parsed: StreamEvent = serde_json::from_str(data[0]).unwrap();
        match parsed {
            StreamEvent::ContentBlockDelta {
                delta: ContentBlockDelta::TextDelta { text },
                ..
            } => assert_eq!(text, "€12.00"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decoder_splits_multiple_events() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: a\n\ndata: b\n\ndata: c");
        assert_eq!(events, vec!["data: a", "data: b"]);
        assert_eq!(decoder.push(b"\n\n"), vec!["data: c"]);
    }

    #[test]
    fn test_unknown_delta_is_ignored() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{}"}}"#;
        assert!(serde_json::from_str::<StreamEvent>(data).is_err());
    }

    #[test]
    fn test_done_marker_is_skipped() {
        assert_eq!(sse_data_lines("data: [DONE]").count(), 0);
    }
}
