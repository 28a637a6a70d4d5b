//! Command handlers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use spendlens_core::report::{self, AnalysisReport};
use spendlens_core::{
    AppState, BootPhase, BootPhaseEmitter, Config, DocumentSource, ProviderConfig, RunOutcome,
    Settings,
};

use crate::render;

/// Options for `spendlens analyze`
#[derive(Debug, Default)]
pub struct AnalyzeOptions {
    pub emails: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub save: bool,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Anthropic,
    Openai,
    Local,
}

/// Arguments for `spendlens provider set`
#[derive(Debug, Args)]
pub struct ProviderArgs {
    pub kind: ProviderKind,
    /// Model name (remote) or GGUF file name (local)
    #[arg(long)]
    pub model: String,
    /// API key for remote providers
    #[arg(long, env = "SPENDLENS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Directory containing the GGUF file (local only)
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
    /// Hugging Face repo to load the tokenizer from (local only)
    #[arg(long)]
    pub tokenizer: Option<String>,
}

/// Logs boot phases for the terminal
struct LogEmitter;

impl BootPhaseEmitter for LogEmitter {
    fn emit_boot_phase(&self, phase: BootPhase) {
        match phase {
            BootPhase::ProviderLoading { provider, model_id } => {
                tracing::info!("Loading {} model {}", provider, model_id)
            }
            BootPhase::ProviderFailed { provider, error } => {
                tracing::warn!("{} provider unavailable: {}", provider, error)
            }
            other => tracing::debug!(?other, "Boot phase"),
        }
    }
}

fn load_source(emails: Option<&Path>) -> Result<DocumentSource> {
    let source = match emails {
        Some(path) => DocumentSource::from_json_file(path)?,
        None => DocumentSource::bundled()?,
    };
    Ok(source)
}

/// Run the analyzer once and print the results
pub async fn analyze(config: Config, options: AnalyzeOptions) -> Result<()> {
    let source = load_source(options.emails.as_deref())?;

    let mut settings = Settings::load(&config.settings_file);
    if let Some(prompt) = options.prompt {
        settings.extraction_prompt = Some(prompt);
    }

    let state = AppState::from_settings(config, settings, source);
    state.load_provider_if_configured(&LogEmitter).await;
    let status = state.client.status().await;
    if !status.ready {
        match status.error {
            Some(error) => bail!("Chat provider failed to load: {}", error),
            None => bail!("No chat provider available. Configure one with `spendlens provider set`."),
        }
    }

    let pipeline = state.pipeline.clone();
    tracing::info!(
        "Analyzing {} emails with {}",
        pipeline.source().len(),
        status.model_id.as_deref().unwrap_or("unknown model")
    );
    let progress = tokio::spawn(render::follow_progress(pipeline.subscribe()));
    let interrupt = {
        let pipeline = pipeline.clone();
        let client = state.client.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                pipeline.cancel();
                client.cancel_generation().await;
            }
        })
    };

    let outcome = pipeline.start().await;
    interrupt.abort();
    progress.abort();

    if let RunOutcome::Skipped(reason) = outcome {
        bail!("Analysis did not start: {}", reason);
    }

    let final_state = pipeline.snapshot();
    render::print_results(&final_state);

    if let Some(report) = AnalysisReport::from_state(&final_state) {
        match options.output {
            Some(ref path) if path.as_os_str() == "-" => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Some(ref path) => {
                report::write_report(path, &report)?;
                tracing::info!("Report written to {:?}", path);
            }
            None => {}
        }
        if options.save {
            let path = report::save_report(&state.config.reports_dir, &report)?;
            tracing::info!("Report saved to {:?}", path);
        }
    }

    match outcome {
        RunOutcome::Failed { error, .. } => bail!(error),
        RunOutcome::Cancelled { processed } => {
            tracing::warn!("Analysis cancelled after {} emails", processed);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Print the mailbox
pub fn list_emails(emails: Option<&Path>) -> Result<()> {
    let source = load_source(emails)?;
    render::print_emails(&source);
    Ok(())
}

/// Print saved reports, most recent first
pub fn list_saved_reports(config: &Config) -> Result<()> {
    let summaries = report::list_reports(&config.reports_dir)?;
    if summaries.is_empty() {
        println!("No saved reports in {}", config.reports_dir.display());
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{}  {}  {:<7}  {}/{}",
            summary.finished_at.format("%Y-%m-%d %H:%M"),
            summary.run_id,
            summary.status,
            summary.processed_count,
            summary.total_count
        );
    }
    Ok(())
}

pub fn show_provider(config: &Config) -> Result<()> {
    let settings = Settings::load(&config.settings_file);
    match settings.provider {
        Some(provider) => println!("{}", describe_provider(&provider)),
        None => println!("No provider configured"),
    }
    if let Some(prompt) = settings.extraction_prompt {
        println!("Custom extraction prompt:\n{}", prompt);
    }
    Ok(())
}

pub fn set_provider(config: &Config, args: ProviderArgs) -> Result<()> {
    let provider = provider_config(args)?;
    if provider.is_local() && !cfg!(feature = "local") {
        tracing::warn!("This build cannot run local models; rebuild with `--features local`");
    }
    let mut settings = Settings::load(&config.settings_file);
    println!("{}", describe_provider(&provider));
    settings.provider = Some(provider);
    settings
        .save(&config.settings_file)
        .context("Failed to save provider")?;
    Ok(())
}

pub fn clear_provider(config: &Config) -> Result<()> {
    let mut settings = Settings::load(&config.settings_file);
    settings.provider = None;
    settings.save(&config.settings_file)?;
    println!("Provider cleared");
    Ok(())
}

fn provider_config(args: ProviderArgs) -> Result<ProviderConfig> {
    let ProviderArgs {
        kind,
        model,
        api_key,
        model_dir,
        tokenizer,
    } = args;

    let config = match kind {
        ProviderKind::Anthropic | ProviderKind::Openai => {
            let Some(api_key) = api_key.filter(|k| !k.trim().is_empty()) else {
                bail!("--api-key (or SPENDLENS_API_KEY) is required for remote providers");
            };
            if kind == ProviderKind::Anthropic {
                ProviderConfig::Anthropic { api_key, model }
            } else {
                ProviderConfig::OpenAI { api_key, model }
            }
        }
        ProviderKind::Local => {
            let model_dir = model_dir.context("--model-dir is required for local models")?;
            let tokenizer_repo_id =
                tokenizer.context("--tokenizer is required for local models")?;
            ProviderConfig::Local {
                model_dir,
                gguf_file: model,
                tokenizer_repo_id,
            }
        }
    };
    Ok(config)
}

fn describe_provider(provider: &ProviderConfig) -> String {
    match provider {
        ProviderConfig::Local { model_dir, .. } => format!(
            "local: {} in {}",
            provider.model_id(),
            model_dir.display()
        ),
        ProviderConfig::OpenAI { api_key, .. } | ProviderConfig::Anthropic { api_key, .. } => {
            format!(
                "{}: {} (key {})",
                provider.provider_type(),
                provider.model_id(),
                mask_key(api_key)
            )
        }
    }
}

/// Keep only the last four characters of a secret
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
