//! Sequential batch analysis of emails.
//!
//! # Flow
//!
//! ```text
//! start()
//!   │  guard: client ready, client idle, not already running
//!   ▼
//! for each document, in source order
//!   │  activate(document.id)
//!   │  client.configure(extraction prompt, empty history)   (awaited)
//!   │  client.send_message(document.body)                   (awaited, full reply)
//!   │  record(trimmed reply)                                 processed += 1
//!   ▼
//! Done  ── or ──  Idle + error (first failure stops the run)
//! ```
//!
//! Exactly one document is in flight at a time. The client's conversation is
//! replaced before every document so nothing leaks between emails, which also
//! means a run leaves the client configured for extraction rather than chat.
//!
//! State is published through a `watch` channel; consumers only read it.

mod progress;
mod types;

pub use progress::PipelineState;
pub use types::{AnalysisResult, PipelineStatus, RunOutcome, SkipReason};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{ChatClient, ClientError, ConversationConfig, ConversationalClient};
use crate::documents::{Document, DocumentSource};

/// Instruction every email is evaluated under
pub const EXTRACTION_PROMPT: &str = r#"You read a single email and report the total amount of money the recipient was charged or paid.

Reply with the amount only: digits with a decimal point and two decimals, no currency symbol, no words (for example: 42.10).
If several amounts appear, reply with the final total.
If the email does not mention a charge or payment, reply with nothing at all."#;

/// Drives one conversational client through a fixed set of documents.
pub struct Pipeline<C: ConversationalClient + ?Sized = ChatClient> {
    client: Arc<C>,
    source: Arc<DocumentSource>,
    extraction_prompt: String,
    state: watch::Sender<PipelineState>,
    /// Token for the current run, replaced when a run is armed
    cancel: Mutex<CancellationToken>,
}

impl<C: ConversationalClient + ?Sized> Pipeline<C> {
    pub fn new(client: Arc<C>, source: Arc<DocumentSource>) -> Self {
        let (state, _) = watch::channel(PipelineState {
            total_count: source.len(),
            ..Default::default()
        });
        Self {
            client,
            source,
            extraction_prompt: EXTRACTION_PROMPT.to_string(),
            state,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Use a different extraction instruction
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.extraction_prompt = prompt.into();
        self
    }

    pub fn extraction_prompt(&self) -> &str {
        &self.extraction_prompt
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Current state
    pub fn snapshot(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Follow state changes. Intermediate states may be coalesced.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Stop the current run before its next document.
    ///
    /// A reply that is still generating is abandoned. Results recorded so far
    /// are kept and the pipeline returns to `Idle`. No-op when not running.
    pub fn cancel(&self) {
        // Hold the state borrow so a run cannot finish and another arm in between
        let state = self.state.borrow();
        if state.is_running() {
            info!(run_id = ?state.run_id, "Cancelling analysis run");
            self.cancel_slot().cancel();
        }
    }

    fn cancel_slot(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Analyze every document in order.
    ///
    /// Does nothing if a run is in progress or the client is not ready or is
    /// busy. Failures are recorded on the state, never returned.
    pub async fn start(&self) -> RunOutcome {
        let running = self.state.borrow().is_running();
        if running {
            debug!("Analysis already running, ignoring start");
            return RunOutcome::Skipped(SkipReason::AlreadyRunning);
        }
        if !self.client.is_ready().await {
            debug!("Model not ready, ignoring start");
            return RunOutcome::Skipped(SkipReason::ClientNotReady);
        }
        if self.client.is_generating().await {
            debug!("Model busy, ignoring start");
            return RunOutcome::Skipped(SkipReason::ClientBusy);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let total = self.source.len();
        let cancel = CancellationToken::new();

        // Check-and-arm under the state lock so concurrent starts cannot both run
        let armed = self.state.send_if_modified(|state| {
            if state.is_running() {
                return false;
            }
            state.begin(run_id.clone(), total);
            *self.cancel_slot() = cancel.clone();
            true
        });
        if !armed {
            return RunOutcome::Skipped(SkipReason::AlreadyRunning);
        }

        if total == 0 {
            info!(run_id = %run_id, "No documents to analyze");
            return RunOutcome::Completed { processed: 0 };
        }

        info!(run_id = %run_id, total, "Starting analysis run");

        for document in self.source.iter() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(&run_id);
            }

            self.state.send_modify(|state| state.activate(&document.id));
            debug!(run_id = %run_id, document_id = %document.id, "Analyzing document");

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.analyze(document) => Some(result),
            };

            match step {
                None => return self.finish_cancelled(&run_id),
                Some(Err(e)) => {
                    let error = format!("Failed to analyze email {}: {}", document.id, e);
                    warn!(run_id = %run_id, document_id = %document.id, error = %e, "Analysis run failed");
                    let mut processed = 0;
                    self.state.send_modify(|state| {
                        state.fail(error.clone());
                        processed = state.processed_count;
                    });
                    return RunOutcome::Failed { processed, error };
                }
                Some(Ok(extracted_value)) => {
                    debug!(
                        run_id = %run_id,
                        document_id = %document.id,
                        detected = !extracted_value.is_empty(),
                        "Document analyzed"
                    );
                    let result = AnalysisResult {
                        document: document.clone(),
                        extracted_value,
                        prompt_used: self.extraction_prompt.clone(),
                    };
                    self.state.send_modify(|state| state.record(result));
                }
            }
        }

        self.state.send_modify(|state| state.complete());
        info!(run_id = %run_id, processed = total, "Analysis run complete");
        RunOutcome::Completed { processed: total }
    }

    /// One configure-then-send round trip. Returns the trimmed reply.
    async fn analyze(&self, document: &Document) -> Result<String, ClientError> {
        self.client
            .configure(ConversationConfig::new(self.extraction_prompt.as_str()))
            .await?;
        let reply = self.client.send_message(&document.body).await?;
        Ok(reply.trim().to_string())
    }

    fn finish_cancelled(&self, run_id: &str) -> RunOutcome {
        let mut processed = 0;
        self.state.send_modify(|state| {
            state.cancel();
            processed = state.processed_count;
        });
        info!(run_id = %run_id, processed, "Analysis run cancelled");
        RunOutcome::Cancelled { processed }
    }
}
