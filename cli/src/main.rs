use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod render;

use commands::{AnalyzeOptions, ProviderArgs};
use spendlens_core::Config;

#[derive(Parser, Debug)]
#[command(name = "spendlens")]
#[command(about = "Extract spending amounts from emails with a language model")]
struct Args {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the analyzer over every email
    Analyze {
        /// JSON file of emails (defaults to the bundled sample mailbox)
        #[arg(long)]
        emails: Option<PathBuf>,
        /// Write the report to this path (`-` for stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Save the report in the data directory
        #[arg(long)]
        save: bool,
        /// Override the extraction instruction for this run
        #[arg(long)]
        prompt: Option<String>,
    },
    /// List the emails that would be analyzed
    Emails {
        #[arg(long)]
        emails: Option<PathBuf>,
    },
    /// List saved reports
    Reports,
    /// Show or change the chat provider
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },
}

#[derive(Subcommand, Debug)]
enum ProviderAction {
    /// Print the configured provider
    Show,
    /// Configure the provider used for analysis
    Set(ProviderArgs),
    /// Remove the configured provider
    Clear,
}

/// Initialize tracing/logging with the given directives
fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring log directive {:?}: {}", directive, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&["spendlens=info", "spendlens_core=info"]);

    let config = match args.data_dir {
        Some(dir) => Config::with_data_dir(dir),
        None => Config::load_or_default(),
    };
    if let Err(e) = config.ensure_dirs() {
        tracing::error!("Failed to create data directories: {}", e);
        return ExitCode::FAILURE;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = rt.block_on(async move {
        match args.command {
            Command::Analyze {
                emails,
                output,
                save,
                prompt,
            } => {
                commands::analyze(
                    config,
                    AnalyzeOptions {
                        emails,
                        output,
                        save,
                        prompt,
                    },
                )
                .await
            }
            Command::Emails { emails } => commands::list_emails(emails.as_deref()),
            Command::Reports => commands::list_saved_reports(&config),
            Command::Provider { action } => match action {
                ProviderAction::Show => commands::show_provider(&config),
                ProviderAction::Set(provider_args) => commands::set_provider(&config, provider_args),
                ProviderAction::Clear => commands::clear_provider(&config),
            },
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
