//! Saved analysis runs.
//!
//! A report is a JSON snapshot of the pipeline state taken when a run ends.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{AnalysisResult, PipelineState, PipelineStatus};

/// A finished (or stopped) analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub finished_at: DateTime<Utc>,
    pub status: PipelineStatus,
    pub processed_count: usize,
    pub total_count: usize,
    pub error: Option<String>,
    pub results: Vec<AnalysisResult>,
}

impl AnalysisReport {
    /// Capture a pipeline state. Returns `None` if no run has started.
    pub fn from_state(state: &PipelineState) -> Option<Self> {
        let run_id = state.run_id.clone()?;
        Some(Self {
            run_id,
            finished_at: Utc::now(),
            status: state.status,
            processed_count: state.processed_count,
            total_count: state.total_count,
            error: state.error.clone(),
            results: state.results.clone(),
        })
    }

    /// Number of results with a detected value
    pub fn detected_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_detected()).count()
    }
}

/// Summary of a report for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub run_id: String,
    pub finished_at: DateTime<Utc>,
    pub status: PipelineStatus,
    pub processed_count: usize,
    pub total_count: usize,
}

/// Save a report as `<run_id>.json` in `reports_dir`
pub fn save_report(reports_dir: &Path, report: &AnalysisReport) -> Result<PathBuf> {
    let path = report_path(reports_dir, &report.run_id);
    write_report(&path, report)?;
    Ok(path)
}

/// Write a report to an explicit path
pub fn write_report(path: &Path, report: &AnalysisReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, content).context("Failed to write report file")?;
    Ok(())
}

/// Load a full report from disk
pub fn load_report(path: &Path) -> Result<AnalysisReport> {
    let content = std::fs::read_to_string(path).context("Failed to read report file")?;
    let report: AnalysisReport =
        serde_json::from_str(&content).context("Failed to parse report JSON")?;
    Ok(report)
}

/// List all reports in `reports_dir`, most recent first
pub fn list_reports(reports_dir: &Path) -> Result<Vec<ReportSummary>> {
    let mut summaries = Vec::new();

    if !reports_dir.exists() {
        return Ok(summaries);
    }

    for entry in std::fs::read_dir(reports_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            match load_report(&path) {
                Ok(report) => summaries.push(ReportSummary {
                    run_id: report.run_id,
                    finished_at: report.finished_at,
                    status: report.status,
                    processed_count: report.processed_count,
                    total_count: report.total_count,
                }),
                Err(e) => {
                    tracing::warn!("Failed to load report {:?}: {}", path, e);
                }
            }
        }
    }

    summaries.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));

    Ok(summaries)
}

/// Get the path for a specific report
pub fn report_path(reports_dir: &Path, run_id: &str) -> PathBuf {
    reports_dir.join(format!("{}.json", run_id))
}
