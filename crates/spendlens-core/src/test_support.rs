//! Scripted provider for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::agent::{ChatProvider, CompletionResult, Message, ProviderEvent};

/// One scripted answer
pub enum Reply {
    Text(String),
    Fail(String),
    /// Wait for the notify before answering
    Gated(String, Arc<Notify>),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }

    pub fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }

    pub fn gated(text: &str, gate: Arc<Notify>) -> Self {
        Reply::Gated(text.to_string(), gate)
    }
}

/// Answers with queued replies in order and records every transcript it receives
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Transcripts passed to each completion call, in call order
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    /// The user message of each call
    pub fn sent_bodies(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|messages| messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn stream_completion(
        &self,
        messages: &[Message],
        event_tx: mpsc::Sender<ProviderEvent>,
        cancel_token: CancellationToken,
    ) -> Result<CompletionResult> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::fail("no scripted reply left"));

        let text = match reply {
            Reply::Text(text) => text,
            Reply::Fail(message) => {
                let _ = event_tx.send(ProviderEvent::Error(message.clone())).await;
                return Err(anyhow::anyhow!(message));
            }
            Reply::Gated(text, gate) => {
                tokio::select! {
                    _ = gate.notified() => text,
                    _ = cancel_token.cancelled() => String::new(),
                }
            }
        };

        if !text.is_empty() {
            let _ = event_tx.send(ProviderEvent::TextDelta(text.clone())).await;
        }
        let _ = event_tx.send(ProviderEvent::Done).await;
        Ok(CompletionResult { text })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }
}
