//! Local model provider using mistralrs

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mistralrs::{
    ChatCompletionChunkResponse, Delta, GgufModelBuilder, Model, RequestBuilder, Response,
    TextMessageRole,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ChatProvider, CompletionResult, ProviderEvent};
use crate::agent::{Message, MessageRole};

/// Local LLM provider using mistralrs
pub struct LocalProvider {
    model: Arc<Model>,
    model_id: String,
}

impl LocalProvider {
    /// Load a GGUF model from a local directory.
    ///
    /// `model_dir` must contain `gguf_file`; the tokenizer is resolved from
    /// `tokenizer_repo_id`.
    pub async fn load(model_dir: &Path, gguf_file: &str, tokenizer_repo_id: &str) -> Result<Self> {
        info!(model_dir = ?model_dir, gguf_file, "Loading local model");
        let model = GgufModelBuilder::new(
            model_dir.to_string_lossy().to_string(),
            vec![gguf_file.to_string()],
        )
        .with_tok_model_id(tokenizer_repo_id)
        .with_logging()
        .build()
        .await
        .context("Failed to load GGUF model")?;

        Ok(Self {
            model: Arc::new(model),
            model_id: gguf_file.to_string(),
        })
    }
}

#[async_trait]
impl ChatProvider for LocalProvider {
    async fn stream_completion(
        &self,
        messages: &[Message],
        event_tx: mpsc::Sender<ProviderEvent>,
        cancel_token: CancellationToken,
    ) -> Result<CompletionResult> {
        let request = build_request(messages);

        let mut stream = self.model.stream_chat_request(request).await?;

        let mut text_content = String::new();

        while let Some(chunk) = stream.next().await {
            if cancel_token.is_cancelled() {
                break;
            }

            match chunk {
                Response::Chunk(ChatCompletionChunkResponse { choices, .. }) => {
                    if let Some(choice) = choices.first() {
                        let Delta {
                            content: delta_content,
                            ..
                        } = &choice.delta;

                        if let Some(text) = delta_content {
                            if !text.is_empty() {
                                let _ = event_tx.send(ProviderEvent::TextDelta(text.clone())).await;
                                text_content.push_str(text);
                            }
                        }
                    }
                }
                Response::Done(_) => {
                    debug!("Streaming complete");
                    break;
                }
                Response::ModelError(msg, _) => {
                    let _ = event_tx.send(ProviderEvent::Error(msg.clone())).await;
                    return Err(anyhow::anyhow!("Model error: {}", msg));
                }
                _ => {}
            }
        }

        let _ = event_tx.send(ProviderEvent::Done).await;

        Ok(CompletionResult { text: text_content })
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Build a RequestBuilder from messages
fn build_request(messages: &[Message]) -> RequestBuilder {
    let mut request = RequestBuilder::new().enable_thinking(false);

    for msg in messages {
        let role = match msg.role {
            MessageRole::System => TextMessageRole::System,
            MessageRole::User => TextMessageRole::User,
            MessageRole::Assistant => TextMessageRole::Assistant,
        };
        request = request.add_message(role, &msg.content);
    }

    request
}
