//! CLI binary for docpipe.
//!
//! A thin shim over the library crate that maps environment variables and
//! flags to `PipelineConfig`, runs a command and prints the outcome.

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use docpipe::config::{DEFAULT_ANON_API, DEFAULT_AUTH_API, DEFAULT_DATA_API, DEFAULT_SCOPE};
use docpipe::pipeline::input::resolve_sample;
use docpipe::{
    extract_only, Pipeline, PipelineConfig, PipelineProgress, ProgressCallback, Stage,
    TextCompletion,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Document the `test` command runs against when no file is given.
const SAMPLE_DOCUMENT: &str = "test_fr_7.pdf";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner showing the current stage and poll, with one
/// log line per finished stage.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgress for CliProgress {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message("…");
    }

    fn on_job_submitted(&self, job_ref: &str) {
        self.bar
            .println(format!("  {} job {}", dim("→"), bold(job_ref)));
    }

    fn on_poll(&self, attempt: u32, max_attempts: u32, status: &str) {
        self.bar
            .set_message(format!("poll {attempt}/{max_attempts}: {status}"));
    }

    fn on_stage_complete(&self, stage: Stage) {
        self.bar.println(format!("{} {}", green("✔"), stage));
    }

    fn on_failure(&self, stage: Stage, error: &str) {
        self.bar
            .println(format!("{} {}  {}", red("✘"), stage, dim(error)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full acceptance run against the sample document
  docpipe test

  # Use another document, print the report as JSON
  docpipe test --file ./misc/other.pdf --json

  # Extract and anonymize only, upload nothing
  docpipe --dry-run test

  # Only run the extraction job and print the text
  docpipe extract --file ./misc/test_fr_7.pdf

ENVIRONMENT VARIABLES:
  API_USER                 Account for the password grant
  API_PASSWORD             Password for the password grant
  EXTRACT_API              Extraction service URL (default: ANON_API)
  ANON_API                 Anonymization service URL (default: http://127.0.0.1:5011)
  AUTH_API                 Auth service URL (default: http://127.0.0.1:5015)
  DATA_API                 Data service URL (default: http://127.0.0.1:5010)
  SCOPE                    Token scope host (default: localhost)
  ANONYMISE                Run the anonymization stage (default: true)
  INPUT_DIR                Directory holding the sample document
  DOCPIPE_MAX_POLLS        Extraction poll budget (default: 10)
  DOCPIPE_POLL_INTERVAL_MS Wait between polls (default: 2000)
  RUST_LOG                 Overrides the log filter

A `.env` file in the working directory is loaded before parsing.
"#;

/// Drive a document through extraction, anonymization and storage.
#[derive(Parser, Debug)]
#[command(
    name = "docpipe",
    version,
    about = "End-to-end acceptance run for the extraction, anonymization and storage services",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCPIPE_DEBUG")]
    debug: bool,

    /// Do a dry run: extract and anonymize, but authenticate and upload nothing.
    #[arg(short = 'r', long, global = true, env = "DOCPIPE_DRY_RUN")]
    dry_run: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    services: ServiceArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Account for the password grant.
    #[arg(long, env = "API_USER", default_value = "", global = true)]
    api_user: String,

    /// Password for the password grant.
    #[arg(long, env = "API_PASSWORD", default_value = "", hide_env_values = true, global = true)]
    api_password: String,

    /// Extraction service base URL. Defaults to the anonymization service.
    #[arg(long, env = "EXTRACT_API", global = true)]
    extract_api: Option<String>,

    /// Anonymization service base URL.
    #[arg(long, env = "ANON_API", default_value = DEFAULT_ANON_API, global = true)]
    anon_api: String,

    /// Auth service base URL.
    #[arg(long, env = "AUTH_API", default_value = DEFAULT_AUTH_API, global = true)]
    auth_api: String,

    /// Data service base URL.
    #[arg(long, env = "DATA_API", default_value = DEFAULT_DATA_API, global = true)]
    data_api: String,

    /// Host part of the token scope.
    #[arg(long, env = "SCOPE", default_value = DEFAULT_SCOPE, global = true)]
    scope: String,

    /// Run the anonymization stage.
    #[arg(long, env = "ANONYMISE", default_value_t = true, action = ArgAction::Set,
          value_parser = BoolishValueParser::new(), global = true)]
    anonymise: bool,

    /// Directory holding the sample document.
    #[arg(long, env = "INPUT_DIR", global = true)]
    input_dir: Option<PathBuf>,

    /// Extraction poll budget.
    #[arg(long, env = "DOCPIPE_MAX_POLLS", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..), global = true)]
    max_polls: u32,

    /// Wait between polls, in milliseconds.
    #[arg(long, env = "DOCPIPE_POLL_INTERVAL_MS", default_value_t = 2000, global = true)]
    poll_interval_ms: u64,

    /// Finish as soon as consolidated text arrives instead of waiting for the next empty status.
    #[arg(long, env = "DOCPIPE_TEXT_IMMEDIATE", global = true)]
    text_immediate: bool,

    /// Per-request timeout in seconds.
    #[arg(long, env = "DOCPIPE_REQUEST_TIMEOUT", global = true)]
    request_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a quick extract / anonymize / upload test.
    Test(TestArgs),
    /// Run the extraction job only and print the assembled text.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Document to submit instead of the sample.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Document to submit instead of the sample.
    #[arg(short, long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs unless the user asked for debug output.
    let json = matches!(&cli.command, Command::Test(args) if args.json);
    let show_progress = !cli.quiet && !cli.debug && !json;
    let filter = if cli.debug {
        "debug"
    } else if cli.quiet || show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.debug {
        info!("Debugging enabled");
    }
    if cli.dry_run {
        warn!("/!\\ This is a DRY-RUN /!\\");
    }

    let progress = show_progress.then(CliProgress::new);
    let callback = progress
        .clone()
        .map(|p| p as Arc<dyn PipelineProgress>);

    let outcome = match &cli.command {
        Command::Test(args) => run_test(&cli, args, callback).await,
        Command::Extract(args) => run_extract(&cli, args, callback).await,
    };

    if let Some(p) = progress {
        p.finish();
    }
    outcome
}

async fn run_test(cli: &Cli, args: &TestArgs, progress: Option<ProgressCallback>) -> Result<()> {
    let path = resolve_sample(
        args.file.as_deref(),
        cli.services.input_dir.as_deref(),
        SAMPLE_DOCUMENT,
    );
    info!("Doing test run with {}", path.display());

    let config = build_config(cli, cli.dry_run, progress)?;
    let pipeline = Pipeline::new(config).context("Failed to set up pipeline")?;
    let report = pipeline
        .run_file(&path)
        .await
        .with_context(|| format!("Test run on {} failed", path.display()))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    match report.upload {
        Some(ref upload) => {
            println!("Hash: {}", upload.hash);
            println!("URL : {}", upload.url);
        }
        None => {
            println!(
                "Dry run: {} bytes ready for upload (not sent)",
                report.final_len
            );
        }
    }

    if !cli.quiet {
        eprintln!(
            "{}  {} pages  {} polls  {}ms{}",
            green("✔"),
            report.total_pages,
            report.poll_attempts,
            report.total_duration_ms,
            if report.ocr { dim("  (ocr)") } else { String::new() },
        );
    }
    Ok(())
}

async fn run_extract(
    cli: &Cli,
    args: &ExtractArgs,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    let path = resolve_sample(
        args.file.as_deref(),
        cli.services.input_dir.as_deref(),
        SAMPLE_DOCUMENT,
    );
    // Extraction alone never needs credentials.
    let config = build_config(cli, true, progress)?;
    let assembled = extract_only(&path, &config)
        .await
        .with_context(|| format!("Extraction of {} failed", path.display()))?;

    write_text(&mut io::stdout().lock(), &assembled.text)
        .context("Failed to write to stdout")?;

    if !cli.quiet {
        eprintln!(
            "{}  {} pages  {} polls  job {}",
            green("✔"),
            assembled.total_pages,
            assembled.attempts,
            assembled.job_ref
        );
    }
    Ok(())
}

/// Write `text` followed by a newline unless it already ends with one.
fn write_text(out: &mut impl Write, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// Map CLI args to `PipelineConfig`.
fn build_config(
    cli: &Cli,
    dry_run: bool,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let s = &cli.services;
    let mut builder = PipelineConfig::builder()
        .anon_api(&s.anon_api)
        .auth_api(&s.auth_api)
        .data_api(&s.data_api)
        .credentials(&s.api_user, &s.api_password)
        .scope(&s.scope)
        .anonymise(s.anonymise)
        .dry_run(dry_run)
        .max_attempts(s.max_polls)
        .poll_interval_ms(s.poll_interval_ms)
        .initial_delay_ms(s.poll_interval_ms);

    if let Some(ref url) = s.extract_api {
        builder = builder.extract_api(url);
    }
    if s.text_immediate {
        builder = builder.text_completion(TextCompletion::Immediate);
    }
    if let Some(secs) = s.request_timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
