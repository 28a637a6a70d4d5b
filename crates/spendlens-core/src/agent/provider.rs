//! Chat provider abstraction for LLM inference
//!
//! This module provides a unified interface for different LLM backends:
//! - Local GGUF models via mistralrs (`local` feature)
//! - OpenAI API
//! - Anthropic API

pub mod anthropic;
#[cfg(feature = "local")]
pub mod local;
pub mod openai;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Message;

/// Events emitted by providers during streaming
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Text content delta
    TextDelta(String),
    /// Generation is complete
    Done,
    /// An error occurred
    Error(String),
}

/// Unified chat provider interface
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stream a chat completion for the given transcript.
    ///
    /// The provider should emit events via `event_tx` as content streams in
    /// and return the accumulated text once generation finishes. A cancelled
    /// generation returns whatever text was produced so far.
    async fn stream_completion(
        &self,
        messages: &[Message],
        event_tx: mpsc::Sender<ProviderEvent>,
        cancel_token: CancellationToken,
    ) -> Result<CompletionResult>;

    /// Get the provider name (e.g., "local", "openai", "anthropic")
    fn provider_name(&self) -> &'static str;

    /// Get the model identifier
    fn model_id(&self) -> &str;
}

/// Result of a streaming completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResult {
    /// Accumulated text content
    pub text: String,
}

/// Provider configuration stored in settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// On-device GGUF model via mistralrs
    Local {
        model_dir: PathBuf,
        gguf_file: String,
        tokenizer_repo_id: String,
    },
    /// OpenAI API
    #[serde(rename = "openai")]
    OpenAI { api_key: String, model: String },
    /// Anthropic API
    Anthropic { api_key: String, model: String },
}

impl ProviderConfig {
    /// Get the provider type name
    pub fn provider_type(&self) -> &'static str {
        match self {
            ProviderConfig::Local { .. } => "local",
            ProviderConfig::OpenAI { .. } => "openai",
            ProviderConfig::Anthropic { .. } => "anthropic",
        }
    }

    /// Get the model ID
    pub fn model_id(&self) -> &str {
        match self {
            ProviderConfig::Local { gguf_file, .. } => gguf_file,
            ProviderConfig::OpenAI { model, .. } => model,
            ProviderConfig::Anthropic { model, .. } => model,
        }
    }

    /// Whether the provider runs on this machine (and has to load weights first)
    pub fn is_local(&self) -> bool {
        matches!(self, ProviderConfig::Local { .. })
    }
}

/// Construct a provider from its settings entry.
///
/// Remote providers are cheap to build. The local provider loads model
/// weights and can take a while.
pub async fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
    match config {
        ProviderConfig::OpenAI { api_key, model } => {
            Ok(Arc::new(openai::OpenAIProvider::new(api_key, model)))
        }
        ProviderConfig::Anthropic { api_key, model } => {
            Ok(Arc::new(anthropic::AnthropicProvider::new(api_key, model)))
        }
        #[cfg(feature = "local")]
        ProviderConfig::Local {
            model_dir,
            gguf_file,
            tokenizer_repo_id,
        } => {
            let provider =
                local::LocalProvider::load(model_dir, gguf_file, tokenizer_repo_id).await?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "local"))]
        ProviderConfig::Local { .. } => Err(anyhow::anyhow!(
            "Local models are not available: built without the `local` feature"
        )),
    }
}

/// Concatenate the text of all system messages.
///
/// Remote APIs take the system prompt as a separate request field.
pub(crate) fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == super::MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let rest = messages
        .iter()
        .filter(|m| m.role != super::MessageRole::System)
        .collect();

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}
