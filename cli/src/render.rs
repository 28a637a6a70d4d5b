//! Terminal output.

use spendlens_core::{DocumentSource, PipelineState};
use tokio::sync::watch;

const SUBJECT_WIDTH: usize = 40;

/// Log progress lines until the pipeline stops publishing
pub async fn follow_progress(mut rx: watch::Receiver<PipelineState>) {
    let mut last_processed = None;
    let mut last_active = None;

    loop {
        {
            let state = rx.borrow_and_update();
            if state.is_running()
                && (last_processed != Some(state.processed_count)
                    || last_active != state.active_document_id)
            {
                last_processed = Some(state.processed_count);
                last_active = state.active_document_id.clone();
                eprintln!("{}", progress_line(&state));
            }
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn progress_line(state: &PipelineState) -> String {
    let active = state.active_document_id.as_deref().unwrap_or("-");
    format!(
        "[{:>3.0}%] {}/{} analyzing {}",
        state.progress() * 100.0,
        state.processed_count,
        state.total_count,
        active
    )
}

/// Print the results table and a one-line summary
pub fn print_results(state: &PipelineState) {
    if state.results.is_empty() {
        println!("No emails analyzed");
    } else {
        println!(
            "{:<10} {:<width$} {}",
            "ID",
            "SUBJECT",
            "AMOUNT",
            width = SUBJECT_WIDTH
        );
        for result in &state.results {
            let value = if result.is_detected() {
                result.extracted_value.as_str()
            } else {
                "-"
            };
            println!(
                "{:<10} {:<width$} {}",
                result.document.id,
                truncate(&result.document.subject, SUBJECT_WIDTH),
                single_line(value),
                width = SUBJECT_WIDTH
            );
        }
    }

    let detected = state.results.iter().filter(|r| r.is_detected()).count();
    println!(
        "\n{} of {} emails processed, {} with amounts ({})",
        state.processed_count, state.total_count, detected, state.status
    );
    if let Some(ref error) = state.error {
        println!("Error: {}", error);
    }
}

/// Print one line per email
pub fn print_emails(source: &DocumentSource) {
    for doc in source {
        println!(
            "{:<10} {:<24} {}",
            doc.id,
            truncate(&doc.sender, 24),
            truncate(&doc.subject, SUBJECT_WIDTH)
        );
    }
    println!("\n{} emails", source.len());
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendlens_core::PipelineStatus;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_single_line_collapses_whitespace() {
        assert_eq!(single_line("12.50\n USD"), "12.50 USD");
    }

    #[test]
    fn test_progress_line() {
        let state = PipelineState {
            status: PipelineStatus::Running,
            run_id: Some("r".to_string()),
            processed_count: 1,
            total_count: 4,
            active_document_id: Some("e2".to_string()),
            results: Vec::new(),
            error: None,
        };
        assert_eq!(progress_line(&state), "[ 25%] 1/4 analyzing e2");
    }
}
