//! Published state of the analysis pipeline.
//!
//! Every transition is a method here so the counters, the active document
//! and the result list always move together.

use serde::{Deserialize, Serialize};

use super::types::{AnalysisResult, PipelineStatus};

/// Snapshot the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub status: PipelineStatus,
    /// Id of the current or most recent run
    pub run_id: Option<String>,
    pub processed_count: usize,
    pub total_count: usize,
    pub active_document_id: Option<String>,
    pub results: Vec<AnalysisResult>,
    /// Set when the last run stopped on a failure
    pub error: Option<String>,
}

impl PipelineState {
    /// Fraction of documents processed, `1.0` for an empty source
    pub fn progress(&self) -> f32 {
        if self.total_count == 0 {
            return if self.status == PipelineStatus::Done {
                1.0
            } else {
                0.0
            };
        }
        self.processed_count as f32 / self.total_count as f32
    }

    pub fn is_running(&self) -> bool {
        self.status == PipelineStatus::Running
    }

    /// Whether the last run ended on an error
    pub fn is_failed(&self) -> bool {
        self.status == PipelineStatus::Idle && self.error.is_some()
    }

    /// Re-arm for a new run over `total` documents
    pub(crate) fn begin(&mut self, run_id: String, total: usize) {
        *self = Self {
            status: if total == 0 {
                PipelineStatus::Done
            } else {
                PipelineStatus::Running
            },
            run_id: Some(run_id),
            total_count: total,
            ..Default::default()
        };
    }

    pub(crate) fn activate(&mut self, document_id: &str) {
        self.active_document_id = Some(document_id.to_string());
    }

    pub(crate) fn record(&mut self, result: AnalysisResult) {
        debug_assert!(self.processed_count < self.total_count);
        self.results.push(result);
        self.processed_count = self.results.len();
    }

    pub(crate) fn complete(&mut self) {
        self.active_document_id = None;
        self.status = PipelineStatus::Done;
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.active_document_id = None;
        self.status = PipelineStatus::Idle;
        self.error = Some(error);
    }

    pub(crate) fn cancel(&mut self) {
        self.active_document_id = None;
        self.status = PipelineStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::doc;

    fn result(id: &str, value: &str) -> AnalysisResult {
        AnalysisResult {
            document: doc(id, "body"),
            extracted_value: value.to_string(),
            prompt_used: "prompt".to_string(),
        }
    }

    #[test]
    fn test_begin_clears_previous_run() {
        let mut state = PipelineState::default();
        state.begin("r1".to_string(), 2);
        state.activate("a");
        state.record(result("a", "1.00"));
        state.fail("boom".to_string());
        assert!(state.is_failed());

        state.begin("r2".to_string(), 2);
        assert_eq!(state.status, PipelineStatus::Running);
        assert_eq!(state.run_id.as_deref(), Some("r2"));
        assert!(state.results.is_empty());
        assert_eq!(state.processed_count, 0);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_empty_run_is_done_immediately() {
        let mut state = PipelineState::default();
        state.begin("r".to_string(), 0);
        assert_eq!(state.status, PipelineStatus::Done);
        assert_eq!(state.progress(), 1.0);
    }

    #[test]
    fn test_record_tracks_count_and_progress() {
        let mut state = PipelineState::default();
        state.begin("r".to_string(), 4);
        state.activate("a");
        state.record(result("a", "1.00"));
        assert_eq!(state.processed_count, 1);
        assert_eq!(state.progress(), 0.25);

        state.complete();
        assert!(state.active_document_id.is_none());
        assert_eq!(state.status, PipelineStatus::Done);
    }

    #[test]
    fn test_cancel_keeps_results_without_error() {
        let mut state = PipelineState::default();
        state.begin("r".to_string(), 3);
        state.activate("a");
        state.record(result("a", ""));
        state.activate("b");
        state.cancel();
        assert_eq!(state.status, PipelineStatus::Idle);
        assert_eq!(state.results.len(), 1);
        assert!(!state.results[0].is_detected());
        assert!(!state.is_failed());
        assert!(state.active_document_id.is_none());
    }
}
