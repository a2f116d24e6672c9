//! Fortune booth CLI entry point.
//!
//! Provides `booth`, `ask`, and `check` subcommands for running the
//! interactive booth, telling one fortune, or verifying the data source.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use fortune_booth::config::{runtime_paths, BoothConfig};
use fortune_booth::credentials::{load_default_credentials, Credentials};
use fortune_booth::logging;
use fortune_booth::oracle::invoker::{InvokeSettings, Invoker};
use fortune_booth::oracle::FortuneService;
use fortune_booth::presentation::{Booth, RenderableResult};
use fortune_booth::providers::router::build_provider;
use fortune_booth::source::build_source;
use fortune_booth::source::cache::WorkbookCache;

/// Year-end party fortune booth.
#[derive(Parser)]
#[command(name = "fortune-booth", version, about)]
struct Cli {
    /// Config file (default: `$FORTUNE_CONFIG_PATH` or `./config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the interactive booth.
    Booth,
    /// Tell one fortune and exit.
    Ask {
        /// Employee id or full name.
        identifier: String,
        /// Optional lucky number folded into the fortune.
        #[arg(long)]
        number: Option<String>,
    },
    /// Fetch the workbook once and print a summary.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = BoothConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Booth => handle_booth(config).await,
        Command::Ask { identifier, number } => {
            logging::init_cli(&config.logging.level);
            handle_ask(config, &identifier, number.as_deref()).await
        }
        Command::Check => {
            logging::init_cli(&config.logging.level);
            handle_check(config).await
        }
    }
}

fn build_cache(config: &BoothConfig, credentials: &Credentials) -> anyhow::Result<Arc<WorkbookCache>> {
    let source = build_source(&config.source, credentials).context("failed to build data source")?;
    Ok(Arc::new(WorkbookCache::from_config(source, &config.cache)))
}

fn build_booth(config: BoothConfig) -> anyhow::Result<Booth> {
    let credentials = load_default_credentials().context("failed to load credentials")?;
    let cache = build_cache(&config, &credentials)?;
    let provider = build_provider(&config.llm.model, &credentials, config.llm.base_url.as_deref())
        .context("failed to create model provider")?;
    info!(model = %provider.model_id(), source = %cache.describe_source(), "booth assembled");

    let invoker = Invoker::new(provider, InvokeSettings::from(&config.llm));
    let service = Arc::new(FortuneService::new(cache, invoker, config.prompt));
    Ok(Booth::new(service, config.presentation))
}

/// Tell a single fortune.
async fn handle_ask(
    config: BoothConfig,
    identifier: &str,
    number: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let booth = build_booth(config)?;
    let result = booth.submit(identifier, number).await;
    print!("{}", booth.render(&result));
    Ok(exit_code(&result))
}

/// Fetch the workbook and report what was found.
async fn handle_check(config: BoothConfig) -> anyhow::Result<ExitCode> {
    let credentials = load_default_credentials().context("failed to load credentials")?;
    let cache = build_cache(&config, &credentials)?;

    println!("source: {}", cache.describe_source());
    let snapshot = match cache.get().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            println!("fetch failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let workbook = &snapshot.workbook;
    println!("participants: {}", workbook.participants.len());
    println!("columns: {}", workbook.participants.columns().join(", "));
    println!(
        "company context: {} chars",
        workbook.company_context.chars().count()
    );
    println!(
        "role definitions: {} chars",
        workbook.role_definitions.chars().count()
    );
    println!("fetched at: {}", snapshot.fetched_at.to_rfc3339());
    println!("model: {}", config.llm.model);
    Ok(ExitCode::SUCCESS)
}

/// Run the interactive booth until EOF or `/quit`.
async fn handle_booth(config: BoothConfig) -> anyhow::Result<ExitCode> {
    let logs_dir = match &config.logging.dir {
        Some(dir) => dir.clone(),
        None => runtime_paths()?.logs_dir,
    };
    let _logging_guard = logging::init_production(&logs_dir, &config.logging.level)?;

    let booth = build_booth(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("{}", booth.header());
    println!("/refresh reloads the workbook, /quit exits.");

    loop {
        let Some(identifier) = prompt(&mut lines, &booth.theme().identifier_prompt).await? else {
            break;
        };
        match identifier.trim() {
            "/quit" | "/exit" => break,
            "/refresh" => {
                let result = booth.refresh().await;
                print!("{}", booth.render(&result));
                continue;
            }
            _ => {}
        }
        let number = prompt(&mut lines, &booth.theme().number_prompt).await?;
        println!("🔮 ...");
        let result = booth.submit(&identifier, number.as_deref()).await;
        print!("{}", booth.render(&result));
    }

    info!("booth closed");
    Ok(ExitCode::SUCCESS)
}

/// Print `label` and read one line; `None` on EOF.
async fn prompt(
    lines: &mut Lines<BufReader<Stdin>>,
    label: &str,
) -> anyhow::Result<Option<String>> {
    print!("{label}: ");
    std::io::stdout().flush().context("failed to flush stdout")?;
    lines.next_line().await.context("failed to read stdin")
}

fn exit_code(result: &RenderableResult) -> ExitCode {
    match result {
        RenderableResult::Notice { kind, .. } if kind.is_error() => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
