//! CRPT connector CLI.
//!
//! - `crpt submit` - Submit one document, waiting for a free slot
//! - `crpt batch` - Submit many documents concurrently under one quota
//! - `crpt render` - Print the request body without sending it
//!
//! Results go to stdout as JSON; logs go to stderr.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crpt_connector::{CrptClient, CrptConfig, Document, SubmissionRequest, SubmissionResult};
use tokio::sync::watch;

/// Submit goods introduction documents to the CRPT registry.
#[derive(Parser)]
#[command(name = "crpt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one document.
    ///
    /// Waits for a free slot in the request quota; Ctrl-C while waiting
    /// cancels without sending anything, with or without `--max-wait-ms`.
    Submit(SubmitArgs),

    /// Submit every entry of a JSON array of `{document, signature}`.
    ///
    /// Entries run concurrently and share the configured quota. One JSON line
    /// is printed per entry, in input order.
    Batch(BatchArgs),

    /// Print the form-encoded request body for a document.
    Render(RenderArgs),
}

/// Configuration file shared by all commands.
#[derive(Args, Debug)]
struct ConfigArg {
    /// Path to the TOML configuration.
    #[arg(long, short = 'c', env = "CRPT_CONFIG", default_value = "crpt.toml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[command(flatten)]
    config: ConfigArg,

    /// Document JSON file.
    #[arg(long, short = 'd')]
    document: PathBuf,

    /// File holding the detached signature (base64).
    #[arg(long, short = 's')]
    signature: PathBuf,

    /// Give up if no slot frees up within this many milliseconds.
    #[arg(long)]
    max_wait_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[command(flatten)]
    config: ConfigArg,

    /// JSON array of `{"document": ..., "signature": "..."}` entries.
    #[arg(long, short = 'i')]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    config: ConfigArg,

    /// Document JSON file.
    #[arg(long, short = 'd')]
    document: PathBuf,

    /// File holding the detached signature (base64).
    #[arg(long, short = 's')]
    signature: PathBuf,
}

fn main() -> Result<ExitCode> {
    // Write logs to stderr so stdout is clean for JSON output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Submit(args) => submit(args).await,
            Commands::Batch(args) => batch(args).await,
            Commands::Render(args) => render(&args),
        }
    })
}

async fn submit(args: SubmitArgs) -> Result<ExitCode> {
    let client = build_client(&args.config.config)?;
    let document = read_document(&args.document)?;
    let signature = read_signature(&args.signature)?;

    let result = match args.max_wait_ms {
        Some(ms) => {
            client
                .introduce_goods_within_until(
                    &document,
                    &signature,
                    Duration::from_millis(ms),
                    ctrl_c(),
                )
                .await
        }
        None => {
            client
                .introduce_goods_until(&document, &signature, ctrl_c())
                .await
        }
    };

    let result = SubmissionResult::from(result);
    println!("{}", serde_json::to_string(&result)?);
    Ok(exit_code(result.is_success()))
}

async fn batch(args: BatchArgs) -> Result<ExitCode> {
    let client = Arc::new(build_client(&args.config.config)?);

    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let requests: Vec<SubmissionRequest> = serde_json::from_str(&input)
        .with_context(|| format!("parsing {}", args.input.display()))?;

    tracing::info!(count = requests.len(), "Submitting batch");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        ctrl_c().await;
        let _ = cancel_tx.send(true);
    });

    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let client = Arc::clone(&client);
            let mut cancel_rx = cancel_rx.clone();
            tokio::spawn(async move {
                let cancel = async move {
                    let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
                };
                let result = client
                    .introduce_goods_until(&request.document, &request.signature, cancel)
                    .await;
                (request.document.doc_id, SubmissionResult::from(result))
            })
        })
        .collect();

    let mut all_ok = true;
    for (index, handle) in handles.into_iter().enumerate() {
        let (doc_id, result) = handle.await.context("submission task panicked")?;
        all_ok &= result.is_success();
        let line = serde_json::json!({
            "index": index,
            "doc_id": doc_id,
            "result": result,
        });
        println!("{line}");
    }

    Ok(exit_code(all_ok))
}

fn render(args: &RenderArgs) -> Result<ExitCode> {
    let client = build_client(&args.config.config)?;
    let document = read_document(&args.document)?;
    let signature = read_signature(&args.signature)?;

    println!("{}", client.render_form(&document, &signature)?);
    Ok(ExitCode::SUCCESS)
}

fn build_client(config_path: &Path) -> Result<CrptClient> {
    let config = CrptConfig::load(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    tracing::debug!(?config, "Loaded configuration");
    Ok(CrptClient::new(&config)?)
}

fn read_document(path: &Path) -> Result<Document> {
    let input =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&input).with_context(|| format!("parsing {}", path.display()))
}

fn read_signature(path: &Path) -> Result<String> {
    let signature =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(signature.trim().to_string())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
