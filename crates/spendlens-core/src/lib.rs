//! SpendLens Core - business logic for the email analyzer
//!
//! This crate contains all the core functionality for SpendLens, including:
//! - Input emails (bundled sample mailbox or JSON file)
//! - Conversational model access (Anthropic, OpenAI, local GGUF via mistralrs)
//! - The sequential batch analysis pipeline
//! - Settings and saved reports

pub mod agent;
pub mod config;
pub mod documents;
pub mod pipeline;
pub mod report;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use serde::Serialize;

pub use agent::{ChatClient, ClientError, ConversationalClient, ProviderConfig};
pub use config::{Config, Settings};
pub use documents::{Document, DocumentSource};
pub use pipeline::{AnalysisResult, Pipeline, PipelineState, PipelineStatus, RunOutcome};
pub use report::AnalysisReport;

/// Boot phase events for frontend synchronization
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase")]
pub enum BootPhase {
    /// No chat provider in settings; the analyzer stays disabled
    ProviderNotConfigured,
    /// Chat provider is being constructed (local models load weights here)
    ProviderLoading { provider: String, model_id: String },
    /// Chat provider attached, the client is ready
    ProviderReady { provider: String, model_id: String },
    /// Chat provider failed to load
    ProviderFailed { provider: String, error: String },
    /// Startup finished
    AppReady,
}

/// Trait for emitting boot phase events.
///
/// Implement this trait to receive boot phase notifications during app startup.
pub trait BootPhaseEmitter: Send + Sync {
    fn emit_boot_phase(&self, phase: BootPhase);
}

/// No-op implementation for testing
pub struct NoOpEmitter;

impl BootPhaseEmitter for NoOpEmitter {
    fn emit_boot_phase(&self, _phase: BootPhase) {}
}

/// Application state for one analyzer session
pub struct AppState {
    pub config: Config,
    pub settings: Settings,
    /// Shared conversational client
    pub client: Arc<ChatClient>,
    /// Analyzer over the session's mailbox
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Build state from config and a mailbox. The client starts without a provider.
    pub fn new(config: Config, source: DocumentSource) -> Self {
        let settings = Settings::load(&config.settings_file);
        Self::from_settings(config, settings, source)
    }

    /// Like [`AppState::new`] with settings supplied by the caller
    pub fn from_settings(config: Config, settings: Settings, source: DocumentSource) -> Self {
        let client = Arc::new(ChatClient::new());

        let mut pipeline = Pipeline::new(client.clone(), Arc::new(source));
        if let Some(ref prompt) = settings.extraction_prompt {
            tracing::info!("Using extraction prompt from settings");
            pipeline = pipeline.with_prompt(prompt.clone());
        }

        Self {
            config,
            settings,
            client,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Attach the configured chat provider, reporting progress through `emitter`.
    pub async fn load_provider_if_configured<E: BootPhaseEmitter>(&self, emitter: &E) {
        let Some(ref provider) = self.settings.provider else {
            tracing::info!("No chat provider configured");
            emitter.emit_boot_phase(BootPhase::ProviderNotConfigured);
            emitter.emit_boot_phase(BootPhase::AppReady);
            return;
        };

        emitter.emit_boot_phase(BootPhase::ProviderLoading {
            provider: provider.provider_type().to_string(),
            model_id: provider.model_id().to_string(),
        });

        match self.client.load(provider).await {
            Ok(()) => {
                tracing::info!(
                    "Chat provider '{}' ready ({})",
                    provider.provider_type(),
                    provider.model_id()
                );
                emitter.emit_boot_phase(BootPhase::ProviderReady {
                    provider: provider.provider_type().to_string(),
                    model_id: provider.model_id().to_string(),
                });
            }
            Err(e) => {
                tracing::error!("Failed to load chat provider: {}", e);
                emitter.emit_boot_phase(BootPhase::ProviderFailed {
                    provider: provider.provider_type().to_string(),
                    error: e.to_string(),
                });
            }
        }

        emitter.emit_boot_phase(BootPhase::AppReady);
        tracing::info!("Backend ready");
    }
}
