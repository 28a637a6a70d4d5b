//! Conversational model access.
//!
//! [`Conversation`] holds the transcript, [`provider`] talks to a concrete
//! backend and [`client`] wraps both behind the [`ConversationalClient`]
//! interface the analysis pipeline drives.

pub mod client;
pub mod provider;

use serde::{Deserialize, Serialize};

pub use client::{ChatClient, ClientError, ClientStatus, ConversationalClient};
pub use provider::{build_provider, ChatProvider, CompletionResult, ProviderConfig, ProviderEvent};

/// System prompt used for free-form chat when no other context is configured
pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions about the user's email and spending. Be concise.";

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Context a conversation is (re)started with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationConfig {
    pub system_prompt: String,
    /// Messages replayed after the system prompt. Usually empty.
    #[serde(default)]
    pub initial_history: Vec<Message>,
}

impl ConversationConfig {
    /// Config with the given system prompt and an empty history
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            initial_history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.initial_history = history;
        self
    }
}

/// A conversation with message history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn new(config: ConversationConfig) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let mut messages = Vec::with_capacity(config.initial_history.len() + 1);
        if !config.system_prompt.is_empty() {
            messages.push(Message::system(config.system_prompt));
        }
        messages.extend(config.initial_history);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn add_user_message(&mut self, text: String) {
        self.messages.push(Message::user(text));
        self.touch();
    }

    pub fn add_assistant_message(&mut self, text: String) {
        self.messages.push(Message::assistant(text));
        self.touch();
    }

    /// Text of the most recent assistant message, if any
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    /// The system prompt this conversation was started with
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(ConversationConfig::new(CHAT_SYSTEM_PROMPT))
    }
}
