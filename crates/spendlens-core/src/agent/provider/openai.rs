//! OpenAI API provider
//!
//! Uses the Responses API via async-openai for streaming.

use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::responses::{
        CreateResponse, EasyInputContent, EasyInputMessage, InputItem, InputParam, MessageType,
        Role,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{split_system, ChatProvider, CompletionResult, ProviderEvent};
use crate::agent::{Message, MessageRole};

/// OpenAI API provider using the Responses API
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key and model
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    async fn stream_completion(
        &self,
        messages: &[Message],
        event_tx: mpsc::Sender<ProviderEvent>,
        cancel_token: CancellationToken,
    ) -> Result<CompletionResult> {
        let (instructions, input_items) = convert_messages(messages);

        let request = CreateResponse {
            model: Some(self.model.clone()),
            input: InputParam::Items(input_items),
            instructions,
            stream: Some(true),
            ..Default::default()
        };

        let mut stream = self
            .client
            .responses()
            .create_stream(request)
            .await
            .context("Failed to create response stream")?;

        let mut text_content = String::new();
        let mut finished = false;

        while let Some(event_result) = stream.next().await {
            if cancel_token.is_cancelled() {
                break;
            }

            let event = event_result.context("Stream error")?;

            use async_openai::types::responses::ResponseStreamEvent;

            match event {
                ResponseStreamEvent::ResponseOutputTextDelta(delta) => {
                    let _ = event_tx
                        .send(ProviderEvent::TextDelta(delta.delta.clone()))
                        .await;
                    text_content.push_str(&delta.delta);
                }

                ResponseStreamEvent::ResponseCompleted(_) => {
                    debug!("Response completed");
                    finished = true;
                }

                ResponseStreamEvent::ResponseFailed(failed) => {
                    let error_msg = format!("Response failed: {:?}", failed.response.error);
                    let _ = event_tx.send(ProviderEvent::Error(error_msg.clone())).await;
                    return Err(anyhow::anyhow!(error_msg));
                }

                ResponseStreamEvent::ResponseError(err) => {
                    let _ = event_tx
                        .send(ProviderEvent::Error(err.message.clone()))
                        .await;
                    return Err(anyhow::anyhow!("OpenAI error: {}", err.message));
                }

                _ => {}
            }
        }

        if !finished && !cancel_token.is_cancelled() {
            let message = "OpenAI stream ended before the response completed".to_string();
            let _ = event_tx.send(ProviderEvent::Error(message.clone())).await;
            return Err(anyhow::anyhow!(message));
        }

        let _ = event_tx.send(ProviderEvent::Done).await;

        Ok(CompletionResult { text: text_content })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Convert our Message format to Responses API instructions and input items
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<InputItem>) {
    let (instructions, rest) = split_system(messages);
    let items = rest
        .into_iter()
        .map(|m| {
            InputItem::EasyMessage(EasyInputMessage {
                r#type: MessageType::Message,
                role: match m.role {
                    MessageRole::Assistant => Role::Assistant,
                    _ => Role::User,
                },
                content: EasyInputContent::Text(m.content.clone()),
            })
        })
        .collect();
    (instructions, items)
}
