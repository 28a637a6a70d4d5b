//! The conversational client shared by the chat and analyzer screens.
//!
//! A [`ChatClient`] owns one [`Conversation`] and one optional provider. It is
//! ready once a provider is attached and busy while a reply is generating.
//! Reconfiguring replaces the whole conversation; sending appends a user turn,
//! waits for the full reply and appends it as the assistant turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::provider::{build_provider, ChatProvider, ProviderConfig, ProviderEvent};
use super::{Conversation, ConversationConfig, Message};

/// Errors surfaced by a conversational client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("No model is loaded")]
    NotReady,

    #[error("A reply is already being generated")]
    Busy,

    #[error("The reply was interrupted before it finished")]
    Cancelled,

    #[error("Model request failed: {0}")]
    Provider(String),
}

/// Interface the analysis pipeline drives.
///
/// `configure` resolves only once the new context is in place, so a
/// following `send_message` always runs against it.
#[async_trait]
pub trait ConversationalClient: Send + Sync {
    /// Whether a model is loaded and can accept messages
    async fn is_ready(&self) -> bool;

    /// Whether a reply is currently being generated
    async fn is_generating(&self) -> bool;

    /// Model download/load progress in `0.0..=1.0`
    async fn download_progress(&self) -> f32;

    /// Most recent failure, cleared by the next successful reply
    async fn error(&self) -> Option<String>;

    /// Replace the conversation with a fresh one built from `config`
    async fn configure(&self, config: ConversationConfig) -> Result<(), ClientError>;

    /// Send a user message and wait for the complete assistant reply
    async fn send_message(&self, text: &str) -> Result<String, ClientError>;

    /// Snapshot of the transcript, oldest first
    async fn message_history(&self) -> Vec<Message>;
}

/// Observable client state for presentation
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClientStatus {
    pub ready: bool,
    pub generating: bool,
    pub download_progress: f32,
    pub error: Option<String>,
    pub provider: Option<String>,
    pub model_id: Option<String>,
}

/// Resets the generating flag when a send finishes or is dropped
struct GeneratingGuard<'a>(&'a AtomicBool);

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Conversational client backed by a [`ChatProvider`]
pub struct ChatClient {
    provider: RwLock<Option<Arc<dyn ChatProvider>>>,
    conversation: RwLock<Conversation>,
    generating: AtomicBool,
    download_progress: RwLock<f32>,
    error: RwLock<Option<String>>,
    /// Cancellation token for the in-flight generation
    active_generation: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatClient {
    /// Create a client with no provider and the default chat conversation
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            provider: RwLock::new(None),
            conversation: RwLock::new(Conversation::default()),
            generating: AtomicBool::new(false),
            download_progress: RwLock::new(0.0),
            error: RwLock::new(None),
            active_generation: Mutex::new(None),
            events,
        }
    }

    /// Create a client that is immediately ready with `provider`
    pub fn with_provider(provider: Arc<dyn ChatProvider>) -> Self {
        let mut client = Self::new();
        *client.provider.get_mut() = Some(provider);
        *client.download_progress.get_mut() = 1.0;
        client
    }

    /// Build and attach the provider described by `config`.
    ///
    /// On failure the error is recorded and the client stays not ready.
    pub async fn load(&self, config: &ProviderConfig) -> anyhow::Result<()> {
        info!(
            provider = config.provider_type(),
            model = config.model_id(),
            "Loading chat provider"
        );
        *self.download_progress.write().await = 0.0;

        match build_provider(config).await {
            Ok(provider) => {
                self.set_provider(provider).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load chat provider");
                *self.error.write().await = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Attach an already constructed provider
    pub async fn set_provider(&self, provider: Arc<dyn ChatProvider>) {
        info!(
            provider = provider.provider_name(),
            model = provider.model_id(),
            "Chat provider ready"
        );
        *self.provider.write().await = Some(provider);
        *self.download_progress.write().await = 1.0;
        *self.error.write().await = None;
    }

    /// Receive streamed text deltas for every reply
    pub fn subscribe_events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// Stop the in-flight generation. Its `send_message` returns
    /// [`ClientError::Cancelled`] and no assistant turn is recorded.
    pub async fn cancel_generation(&self) {
        if let Some(token) = self.active_generation.lock().await.as_ref() {
            debug!("Cancelling generation");
            token.cancel();
        }
    }

    /// Text of the most recent assistant message in the transcript
    pub async fn last_assistant_text(&self) -> Option<String> {
        self.conversation
            .read()
            .await
            .last_assistant_text()
            .map(str::to_string)
    }

    pub async fn status(&self) -> ClientStatus {
        let provider = self.provider.read().await;
        ClientStatus {
            ready: provider.is_some(),
            generating: self.generating.load(Ordering::SeqCst),
            download_progress: *self.download_progress.read().await,
            error: self.error.read().await.clone(),
            provider: provider.as_ref().map(|p| p.provider_name().to_string()),
            model_id: provider.as_ref().map(|p| p.model_id().to_string()),
        }
    }
}

#[async_trait]
impl ConversationalClient for ChatClient {
    async fn is_ready(&self) -> bool {
        self.provider.read().await.is_some()
    }

    async fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    async fn download_progress(&self) -> f32 {
        *self.download_progress.read().await
    }

    async fn error(&self) -> Option<String> {
        self.error.read().await.clone()
    }

    async fn configure(&self, config: ConversationConfig) -> Result<(), ClientError> {
        if self.generating.load(Ordering::SeqCst) {
            return Err(ClientError::Busy);
        }
        let conversation = Conversation::new(config);
        debug!(conversation_id = %conversation.id, "Conversation reconfigured");
        *self.conversation.write().await = conversation;
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<String, ClientError> {
        let provider = self
            .provider
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotReady)?;

        if self
            .generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::Busy);
        }
        let _guard = GeneratingGuard(&self.generating);

        let (conversation_id, messages) = {
            let mut conversation = self.conversation.write().await;
            conversation.add_user_message(text.to_string());
            (conversation.id.clone(), conversation.messages.clone())
        };

        debug!(
            conversation_id = %conversation_id,
            message_len = text.len(),
            message_count = messages.len(),
            "Sending message"
        );

        let cancel_token = CancellationToken::new();
        *self.active_generation.lock().await = Some(cancel_token.clone());

        // Forward provider deltas to subscribers; ends when the provider drops its sender
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let events = self.events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let _ = events.send(event);
            }
        });

        let result = provider
            .stream_completion(&messages, event_tx, cancel_token.clone())
            .await;
        let _ = forwarder.await;
        *self.active_generation.lock().await = None;

        // Partial text from an interrupted stream is not a reply
        if cancel_token.is_cancelled() {
            info!(conversation_id = %conversation_id, "Generation cancelled");
            return Err(ClientError::Cancelled);
        }

        match result {
            Ok(completion) => {
                self.conversation
                    .write()
                    .await
                    .add_assistant_message(completion.text.clone());
                *self.error.write().await = None;
                debug!(
                    conversation_id = %conversation_id,
                    reply_len = completion.text.len(),
                    "Received reply"
                );
                Ok(completion.text)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(conversation_id = %conversation_id, error = %message, "Model request failed");
                *self.error.write().await = Some(message.clone());
                Err(ClientError::Provider(message))
            }
        }
    }

    async fn message_history(&self) -> Vec<Message> {
        self.conversation.read().await.messages.clone()
    }
}
