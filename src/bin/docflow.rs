//! CLI binary for edgequake-docflow.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `WorkflowConfig`, drives the workflow and prints records.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_docflow::{
    AuditEntry, DocumentId, JsonFileRecordStore, RecordStore, Stage, WorkflowConfig,
    WorkflowDriver, WorkflowObserver, WorkflowRecord, WorkflowStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner plus one log line per finished stage.
struct CliObserver {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(String, Stage), Instant>>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, id: &str, stage: Stage) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&(id.to_string(), stage)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl WorkflowObserver for CliObserver {
    fn on_workflow_start(&self, id: &str, status: WorkflowStatus) {
        self.bar.println(format!(
            "{} {} {}",
            cyan("◆"),
            bold(id),
            dim(&format!("from '{status}'"))
        ));
    }

    fn on_stage_start(&self, id: &str, stage: Stage) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert((id.to_string(), stage), Instant::now());
        }
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(id.to_string());
    }

    fn on_stage_complete(&self, id: &str, stage: Stage) {
        let secs = self.elapsed(id, stage);
        self.bar.println(format!(
            "  {} {:<11} {}",
            green("✓"),
            stage.as_str(),
            dim(&format!("{secs:.1}s"))
        ));
    }

    fn on_stage_failed(&self, id: &str, stage: Stage, reason: &str) {
        let secs = self.elapsed(id, stage);
        // Keep long provider messages on one line.
        let msg = match reason.char_indices().nth(80) {
            Some((idx, _)) => format!("{}\u{2026}", &reason[..idx]),
            None => reason.to_string(),
        };
        self.bar.println(format!(
            "  {} {:<11} {}  {}",
            red("✗"),
            stage.as_str(),
            red(&msg),
            dim(&format!("{secs:.1}s"))
        ));
    }

    fn on_workflow_finish(&self, id: &str, status: WorkflowStatus) {
        let mark = match status {
            WorkflowStatus::Completed => green("✔"),
            WorkflowStatus::Failed => red("✘"),
            _ => cyan("⚠"),
        };
        self.bar.println(format!("{mark} {} → {}", bold(id), bold(status.as_str())));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Register and run a document in one go
  docflow process report.pdf

  # Register now, run later
  docflow register notes.txt
  docflow run 3f2c9e0a-...

  # Resume a failed document at the stage that failed
  docflow retry 3f2c9e0a-...

  # Inspect records
  docflow status 3f2c9e0a-... --json
  docflow list
  docflow audit 3f2c9e0a-...

SUPPORTED SOURCES:
  .pdf                 text layer via pdfium
  .txt .md .markdown   read as UTF-8
  .png .jpg .jpeg      OCR through the vision model
  http(s):// URLs      downloaded, then handled by extension

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key for summaries, speech and images
  EDGEQUAKE_LLM_PROVIDER  Override summarization provider
  EDGEQUAKE_MODEL         Override summarization model
  PDFIUM_LIB_PATH         Directory holding libpdfium
  DOCFLOW_DATA_DIR        Record store directory (default: data)
  DOCFLOW_OUTPUT_DIR      Generated media directory (default: output)
"#;

/// Extract, summarize, narrate and illustrate documents as resumable workflows.
#[derive(Parser, Debug)]
#[command(
    name = "docflow",
    version,
    about = "Resumable document workflows: extract → summarize → speech → image",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory of the JSON record store.
    #[arg(long, global = true, env = "DOCFLOW_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Directory for generated audio and images.
    #[arg(long, global = true, env = "DOCFLOW_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Summarization model ID (e.g. gpt-4o-mini).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// API key for the speech and image endpoints.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible speech and image API.
    #[arg(long, global = true, env = "DOCFLOW_OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    /// Text-to-speech voice.
    #[arg(long, global = true, env = "DOCFLOW_TTS_VOICE")]
    voice: Option<String>,

    /// Path to a text file containing a custom summarization prompt.
    #[arg(long, global = true, env = "DOCFLOW_SUMMARY_PROMPT")]
    summary_prompt: Option<PathBuf>,

    /// Retries per provider call before the stage fails.
    #[arg(long, global = true, env = "DOCFLOW_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per provider-call timeout in seconds.
    #[arg(long, global = true, env = "DOCFLOW_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout for URL sources in seconds.
    #[arg(long, global = true, env = "DOCFLOW_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print records as JSON.
    #[arg(long, global = true, env = "DOCFLOW_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCFLOW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "DOCFLOW_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a source and run its workflow.
    Process {
        /// Local file path or HTTP/HTTPS URL.
        source: String,
    },
    /// Register a source without running it.
    Register { source: String },
    /// Run (or resume) a registered document.
    Run { id: String },
    /// Resume a failed document at the stage that failed.
    Retry { id: String },
    /// Show one record.
    Status { id: String },
    /// List all records.
    List,
    /// Show a document's audit trail.
    Audit { id: String },
}

/// A command that drives the workflow and so needs providers.
enum Job {
    Process(String),
    Run(DocumentId),
    Retry(DocumentId),
}

impl Command {
    fn runs_workflow(&self) -> bool {
        matches!(
            self,
            Command::Process { .. } | Command::Run { .. } | Command::Retry { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs while a workflow runs.
    let show_progress = !cli.quiet && !cli.json && cli.command.runs_workflow();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let job = match cli.command {
        Command::Process { ref source } => Job::Process(source.clone()),
        Command::Run { ref id } => Job::Run(DocumentId::from(id.as_str())),
        Command::Retry { ref id } => Job::Retry(DocumentId::from(id.as_str())),
        _ => return inspect_records(&cli).await,
    };

    let observer = if show_progress {
        Some(CliObserver::new())
    } else {
        None
    };
    let config = build_config(&cli, observer.clone()).await?;
    let driver = WorkflowDriver::from_config(&config)
        .await
        .context("Failed to set up workflow")?;

    // Ctrl-C stops runs before their next stage; the stage in flight commits.
    let cancel = driver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = match job {
        Job::Process(ref source) => driver.process(source).await,
        Job::Run(ref id) => driver.run_workflow(id).await,
        Job::Retry(ref id) => driver.retry(id).await,
    };

    if let Some(ref obs) = observer {
        obs.finish();
    }

    let record = result.context("Workflow run failed")?;
    print_record(&record, cli.json)?;

    if record.status == WorkflowStatus::Failed {
        std::process::exit(2);
    }
    Ok(())
}

/// Commands that only touch the record store; no provider is needed.
async fn inspect_records(cli: &Cli) -> Result<()> {
    let store = JsonFileRecordStore::open(&cli.data_dir)
        .await
        .with_context(|| format!("Failed to open record store at {}", cli.data_dir.display()))?;

    match cli.command {
        Command::Register { ref source } => {
            if source.trim().is_empty() {
                anyhow::bail!("Source path must not be empty");
            }
            let record = store.create(source).await.context("Failed to register")?;
            print_record(&record, cli.json)?;
        }
        Command::Status { ref id } => {
            let record = store
                .get(&DocumentId::from(id.as_str()))
                .await
                .with_context(|| format!("No record for '{id}'"))?;
            print_record(&record, cli.json)?;
        }
        Command::List => {
            let records = store.list().await.context("Failed to list records")?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&records).context("Failed to serialise records")?
                );
            } else {
                for r in &records {
                    println!(
                        "{:<38} {:<16} {}",
                        r.id.as_str(),
                        status_label(r.status),
                        dim(&r.source_path)
                    );
                }
                if records.is_empty() && !cli.quiet {
                    eprintln!("{}", dim("no documents registered"));
                }
            }
        }
        Command::Audit { ref id } => {
            let entries = store
                .audit(&DocumentId::from(id.as_str()))
                .await
                .with_context(|| format!("No audit trail for '{id}'"))?;
            print_audit(&entries, cli.json)?;
        }
        Command::Process { .. } | Command::Run { .. } | Command::Retry { .. } => {}
    }
    Ok(())
}

fn status_label(status: WorkflowStatus) -> String {
    match status {
        WorkflowStatus::Completed => green(status.as_str()),
        WorkflowStatus::Failed => red(status.as_str()),
        other => cyan(other.as_str()),
    }
}

fn print_record(record: &WorkflowRecord, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(record).context("Failed to serialise record")?
        );
        return Ok(());
    }

    println!("ID:           {}", record.id);
    println!("Source:       {}", record.source_path);
    println!("Status:       {}", status_label(record.status));
    if let Some(ref text) = record.extracted_text {
        println!("Text:         {} chars", text.chars().count());
    }
    if let Some(ref summary) = record.summary {
        println!("Summary:      {}", summary.replace('\n', "\n              "));
    }
    if let Some(ref audio) = record.audio_path {
        println!("Audio:        {audio}");
    }
    if let Some(ref image) = record.image_path {
        println!("Image:        {image}");
    }
    if let Some(ref reason) = record.failure_reason {
        let stage = record
            .failed_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("Failed at:    {stage}");
        println!("Reason:       {}", red(reason));
    }
    println!(
        "Updated:      {}  {}",
        record.updated_at.to_rfc3339(),
        dim(&format!("v{}", record.version))
    );
    Ok(())
}

fn print_audit(entries: &[AuditEntry], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(entries).context("Failed to serialise audit trail")?
        );
        return Ok(());
    }
    for e in entries {
        println!(
            "{}  {:<8} {:<8} {}",
            dim(&e.created_at.to_rfc3339()),
            e.actor,
            bold(&e.action),
            e.note
        );
    }
    Ok(())
}

/// Map CLI args to `WorkflowConfig`.
async fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<WorkflowConfig> {
    let mut builder = WorkflowConfig::builder()
        .data_dir(&cli.data_dir)
        .output_dir(&cli.output_dir)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref key) = cli.openai_api_key {
        builder = builder.openai_api_key(key);
    }
    if let Some(ref url) = cli.openai_base_url {
        builder = builder.openai_base_url(url);
    }
    if let Some(ref voice) = cli.voice {
        builder = builder.tts_voice(voice);
    }
    if let Some(ref path) = cli.summary_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read summary prompt from {:?}", path))?;
        builder = builder.summary_prompt(prompt);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs as Arc<dyn WorkflowObserver>);
    }

    builder.build().context("Invalid configuration")
}
