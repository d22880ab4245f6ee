//! CLI binary for invoice-vision.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig`, then either serves HTTP or runs a single extraction.

use anyhow::{Context, Result};
use clap::Parser;
use invoice_vision::{extract_invoice, serve, AppState, LlmInvoiceModel, ServiceConfig};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on 0.0.0.0:5000 with Gemini (GEMINI_API_KEY set)
  invoice-server

  # Another port, another upload directory
  invoice-server --port 8080 --upload-dir /var/tmp/invoices

  # Use a specific provider and model
  invoice-server --provider openai --model gpt-4.1-mini

  # One-shot extraction of a local file, JSON on stdout
  invoice-server --extract receipt.jpg

ENDPOINTS:
  GET  /         upload page
  GET  /health   liveness probe
  POST /upload   multipart field "file" (png, jpg, jpeg, pdf; ≤ 16 MiB)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, e.g. invoice_vision=debug
"#;

/// Extract structured data from invoice images using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-server",
    version,
    about = "Extract structured invoice data from images using Vision LLMs",
    long_about = "HTTP service that accepts an invoice image or PDF, asks a Vision Language \
Model to transcribe it as JSON, repairs the invoice total and adds 15% VAT. Supports Google \
Gemini, OpenAI, Anthropic and any OpenAI-compatible endpoint.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "INVOICE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port to bind.
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Working directory for uploads awaiting extraction.
    #[arg(long, env = "INVOICE_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Request body ceiling in MiB.
    #[arg(long, env = "INVOICE_MAX_UPLOAD_MB", default_value_t = 16,
          value_parser = clap::value_parser!(u64).range(1..=1024))]
    max_upload_mb: u64,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (default: gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per invoice.
    #[arg(long, env = "INVOICE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Per-invoice model call timeout in seconds.
    #[arg(long, env = "INVOICE_MODEL_TIMEOUT", default_value_t = 60)]
    model_timeout: u64,

    /// Attempts made to delete each upload.
    #[arg(long, env = "INVOICE_DELETE_ATTEMPTS", default_value_t = 5)]
    delete_attempts: u32,

    /// Pause between failed delete attempts in milliseconds.
    #[arg(long, env = "INVOICE_DELETE_DELAY_MS", default_value_t = 1000)]
    delete_delay_ms: u64,

    /// Keep files left in the upload directory by earlier runs.
    #[arg(long, env = "INVOICE_NO_SWEEP")]
    no_sweep: bool,

    /// Extract this local file, print the JSON result and exit.
    #[arg(long, value_name = "FILE")]
    extract: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    // ── Build config and model ───────────────────────────────────────────
    let config = build_config(&cli)?;
    info!("Starting with config: {:?}", config);

    let model = LlmInvoiceModel::from_config(&config).context("No usable LLM provider")?;

    // ── One-shot mode ────────────────────────────────────────────────────
    if let Some(ref path) = cli.extract {
        let result = extract_invoice(&model, path, config.model_timeout()).await;
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
        if !result.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    // ── Serve ────────────────────────────────────────────────────────────
    let state = AppState::new(config, Arc::new(model))
        .await
        .context("Failed to prepare upload directory")?;
    serve(state).await.context("Server error")?;

    Ok(())
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .host(cli.host.clone())
        .port(cli.port)
        .upload_dir(cli.upload_dir.clone())
        .max_upload_bytes((cli.max_upload_mb * 1024 * 1024) as usize)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .model_timeout_secs(cli.model_timeout)
        .delete_attempts(cli.delete_attempts)
        .delete_retry_delay_ms(cli.delete_delay_ms)
        .sweep_on_start(!cli.no_sweep);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }

    builder.build().context("Invalid configuration")
}
