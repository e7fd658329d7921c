use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod lock;
mod notes;
mod present;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;

use config::Config;
use semantic::{
    AssumeYes, Cl100kCounter, Confirmer, EmbeddingClient, InquireConfirmer, OpenAiProvider,
    SemanticSearchError, SemanticSearchService,
};

/// Data directory inside the vault when `--data-dir` is not given
const DEFAULT_DATA_DIR: &str = "_scripts";

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    #[cfg(feature = "markdown-docs")]
    if let cli::Command::MarkdownDocs {} = args.command {
        clap_markdown::print_help_markdown::<cli::Args>();
        return Ok(());
    }

    let vault = match args.vault {
        Some(vault) => vault,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| vault.join(DEFAULT_DATA_DIR));

    let config = Config::load_with(&data_dir)
        .with_context(|| format!("failed to load config from {}", data_dir.display()))?;

    let yes = match args.command {
        cli::Command::Build { yes } | cli::Command::Update { yes } => yes,
        _ => false,
    };
    let service = build_service(config, vault, yes)?;

    match args.command {
        #[cfg(feature = "markdown-docs")]
        cli::Command::MarkdownDocs {} => unreachable!(),

        cli::Command::Build { .. } => {
            let report = cancellable(service.build())?;
            if let Some(report) = report {
                println!("{}", present::render_report(&report));
            }
        }

        cli::Command::Update { .. } => {
            let report = cancellable(service.update())?;
            if let Some(report) = report {
                if report.candidates == 0 {
                    println!("nothing new to embed ({} sections stored)", report.total);
                } else {
                    println!("{}", present::render_report(&report));
                }
            }
        }

        cli::Command::Query {
            text,
            n,
            json,
            open,
        } => {
            let ranked = service.query(&text, n)?;
            let rows = present::rows(&ranked, &service.config().vault_name);

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", present::render_table(&rows));
            }

            if open && !rows.is_empty() {
                let labels: Vec<String> = rows.iter().map(|r| r.label()).collect();
                match inquire::Select::new("Open which note?", labels).raw_prompt() {
                    InquireResult::Ok(choice) => println!("{}", rows[choice.index].uri),
                    InquireResult::Err(err) => log::warn!("selection cancelled: {err}"),
                }
            }
        }

        cli::Command::Status { json } => {
            let status = service.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", present::render_status(&status));
            }
        }
    }

    Ok(())
}

fn build_service(config: Config, vault: PathBuf, yes: bool) -> anyhow::Result<SemanticSearchService> {
    let provider = OpenAiProvider::new(
        config.api_key(),
        config.api_key_env.clone(),
        &config.api_base_url,
        config.model.clone(),
        config.request_timeout(),
    )
    .context("failed to create embedding client")?;
    let client = EmbeddingClient::new(Box::new(provider), config.retry.policy(), config.throttle());

    let counter = Cl100kCounter::new()?;
    let confirmer: Box<dyn Confirmer> = if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(InquireConfirmer)
    };

    let show_progress = std::io::stderr().is_terminal();
    Ok(
        SemanticSearchService::new(config, vault, client, Box::new(counter), confirmer)
            .with_progress(show_progress),
    )
}

/// A refused cost gate is a normal exit, not an error.
fn cancellable<T>(result: Result<T, SemanticSearchError>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SemanticSearchError::Cancelled) => {
            eprintln!("Cancelled");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
