//! Pipeline types.

use serde::{Deserialize, Serialize};

use crate::documents::Document;

/// Where the pipeline is in its lifecycle.
///
/// A failed run goes back to `Idle` with the error recorded on the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Running,
    Done,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Idle => f.pad("idle"),
            PipelineStatus::Running => f.pad("running"),
            PipelineStatus::Done => f.pad("done"),
        }
    }
}

/// Outcome of analyzing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document: Document,
    /// Trimmed model reply. Empty means nothing was detected.
    pub extracted_value: String,
    /// System prompt the document was evaluated under
    pub prompt_used: String,
}

impl AnalysisResult {
    pub fn is_detected(&self) -> bool {
        !self.extracted_value.is_empty()
    }
}

/// Why `start()` did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    ClientNotReady,
    ClientBusy,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyRunning => write!(f, "analysis already running"),
            SkipReason::ClientNotReady => write!(f, "model not ready"),
            SkipReason::ClientBusy => write!(f, "model busy"),
        }
    }
}

/// What a call to `start()` did.
///
/// Informational only: the same facts are on the published state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Completed { processed: usize },
    Failed { processed: usize, error: String },
    Cancelled { processed: usize },
}
