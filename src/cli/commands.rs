//! CLI command definitions for dataset-cleaner.
//!
//! `clean` fetches a dataset (CSV file or remote table), normalizes it and
//! runs it through the cleaning engine; `view` inspects stored checkpoints.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;

use crate::cleaning::{
    new_run_id, normalize_all, CleaningOrchestrator, NormalizePolicy, RecordClassifier,
    RecordCleaner, ShardProcessor, Table,
};
use crate::config::{
    CleanerConfig, ConfigError, LlmSettings, TableSettings, DEFAULT_API_BASE, DEFAULT_MODEL,
};
use crate::llm::ChatCompletionClient;
use crate::source::{read_csv_records, TableSource};
use crate::storage::{AuditLog, CheckpointStore, Stage};

/// Default checkpoint root.
const DEFAULT_STEPS_DIR: &str = "./steps";

/// Default audit log file.
const DEFAULT_AUDIT_LOG: &str = "./log.txt";

/// Clean LLM fine-tuning datasets through a chat-completion classifier.
#[derive(Parser)]
#[command(name = "dataset-cleaner")]
#[command(about = "Clean LLM fine-tuning datasets with a chat-completion classifier")]
#[command(version)]
#[command(
    long_about = "dataset-cleaner fetches raw records from a CSV file or a remote table, normalizes them into {input, output} pairs and asks a chat model to scrub personal information or reject the record.\n\nEvery stage is checkpointed under <steps-dir>/<run-id>/<stage>/data.json.\n\nExample usage:\n  dataset-cleaner clean --source csv --file ./data/dataset.csv --table results --workers 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Fetch, normalize and clean a dataset.
    Clean(Box<CleanArgs>),

    /// Show stored runs and their checkpoint row counts.
    View(ViewArgs),
}

/// Where raw rows come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// A local CSV file with a header row.
    Csv,
    /// The remote table store (needs SUPABASE_URL and SUPABASE_KEY).
    Table,
}

/// Arguments for `dataset-cleaner clean`.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Where to read raw rows from.
    #[arg(long, value_enum, default_value = "csv")]
    pub source: SourceKind,

    /// CSV file to read (required with --source csv).
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Source table layout: interactions_new, dataset or results.
    #[arg(short = 't', long, default_value = "results")]
    pub table: String,

    /// Value of the table's model column to select (table source only).
    #[arg(short = 'm', long, default_value = "gpt-4")]
    pub model: String,

    /// Number of shards cleaned concurrently.
    #[arg(short = 'w', long, default_value = "4")]
    pub workers: usize,

    /// Run identifier; a fresh 8-character id is generated when omitted.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Root directory for checkpoints.
    #[arg(long, default_value = DEFAULT_STEPS_DIR)]
    pub steps_dir: PathBuf,

    /// Append-only log of raw classifier responses.
    #[arg(long, default_value = DEFAULT_AUDIT_LOG)]
    pub audit_log: PathBuf,

    /// Pause before each classifier call, in milliseconds.
    #[arg(long, default_value = "500")]
    pub request_delay_ms: u64,

    /// Retries after a failed classifier call.
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Seconds between progress log lines.
    #[arg(long, default_value = "10")]
    pub progress_interval_secs: u64,

    /// Stop at the first row that fails normalization instead of skipping it.
    #[arg(long)]
    pub strict: bool,

    /// Chat-completion API key.
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Chat-completion API base URL.
    #[arg(long, env = "LLM_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Chat model used for cleaning.
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    pub llm_model: String,

    /// HTTP proxy host for chat-completion requests.
    #[arg(long, env = "PROXY_HOST")]
    pub proxy_host: Option<String>,

    /// HTTP proxy port.
    #[arg(long, env = "PROXY_PORT", default_value = "80")]
    pub proxy_port: u16,

    /// HTTP proxy basic-auth user.
    #[arg(long, env = "PROXY_USER")]
    pub proxy_user: Option<String>,

    /// HTTP proxy basic-auth password.
    #[arg(long, env = "PROXY_PASS", hide_env_values = true)]
    pub proxy_pass: Option<String>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl CleanArgs {
    fn cleaner_config(&self) -> CleanerConfig {
        CleanerConfig::new()
            .with_steps_dir(self.steps_dir.clone())
            .with_audit_log_path(self.audit_log.clone())
            .with_request_delay(Duration::from_millis(self.request_delay_ms))
            .with_max_retries(self.max_retries)
            .with_workers(self.workers)
            .with_progress_interval(Duration::from_secs(self.progress_interval_secs))
    }

    /// Resolves endpoint settings from the flags; clap has already folded in
    /// the matching environment variables.
    fn llm_settings(&self) -> Result<LlmSettings, ConfigError> {
        let proxy_port = self.proxy_port.to_string();
        LlmSettings::from_vars(|key| match key {
            "LLM_API_KEY" => self.api_key.clone(),
            "LLM_API_BASE" => Some(self.api_base.clone()),
            "LLM_MODEL" => Some(self.llm_model.clone()),
            "PROXY_HOST" => self.proxy_host.clone(),
            "PROXY_PORT" => Some(proxy_port.clone()),
            "PROXY_USER" => self.proxy_user.clone(),
            "PROXY_PASS" => self.proxy_pass.clone(),
            _ => None,
        })
    }
}

/// Arguments for `dataset-cleaner view`.
#[derive(Parser, Debug)]
pub struct ViewArgs {
    /// Run to inspect; lists all runs when omitted.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Stage to show (raw, formatted, cleaning, cleaned) or "all".
    #[arg(long, default_value = "all")]
    pub stage: String,

    /// Root directory for checkpoints.
    #[arg(long, default_value = DEFAULT_STEPS_DIR)]
    pub steps_dir: PathBuf,
}

/// Parse CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Clean(args) => run_clean_command(*args).await,
        Commands::View(args) => run_view_command(args).await,
    }
}

#[derive(Debug, Serialize)]
struct CleanSummary {
    run_id: String,
    raw_rows: usize,
    formatted_records: usize,
    accepted: usize,
    rejected: usize,
    dropped: usize,
    retries: usize,
    elapsed_secs: u64,
    checkpoint: String,
}

async fn run_clean_command(args: CleanArgs) -> anyhow::Result<()> {
    let config = args.cleaner_config();
    config.validate()?;
    let llm_settings = args.llm_settings()?;

    let run_id = args.run_id.clone().unwrap_or_else(new_run_id);
    let table = Table::parse(&args.table);
    let store = CheckpointStore::new(config.steps_dir.clone());

    info!(run_id = %run_id, source = ?args.source, table = %table, "Fetching raw rows");
    let raws = match args.source {
        SourceKind::Csv => {
            let path = args
                .file
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--file is required with --source csv"))?;
            tokio::task::spawn_blocking(move || read_csv_records(&path))
                .await
                .context("CSV reader task failed")??
        }
        SourceKind::Table => {
            let settings = TableSettings::from_env()?;
            TableSource::from_settings(&settings)?
                .fetch(&table, &args.model)
                .await?
        }
    };
    store.persist(&run_id, Stage::Raw, &raws).await?;

    let policy = if args.strict {
        NormalizePolicy::Abort
    } else {
        NormalizePolicy::Skip
    };
    let records = normalize_all(&table, &raws, policy)?;
    store.persist(&run_id, Stage::Formatted, &records).await?;
    info!(
        run_id = %run_id,
        raw_rows = raws.len(),
        records = records.len(),
        path = %store.stage_path(&run_id, Stage::Formatted).display(),
        "Records formatted"
    );

    let client = ChatCompletionClient::from_settings(&llm_settings)?;
    let audit = Arc::new(AuditLog::new(config.audit_log_path.clone()));
    let classifier = RecordClassifier::new(Arc::new(client), audit, llm_settings.model.clone());
    let cleaner = RecordCleaner::new(Arc::new(classifier)).with_max_retries(config.max_retries);
    let processor = ShardProcessor::new(Arc::new(cleaner), config.request_delay);
    let orchestrator = CleaningOrchestrator::new(Arc::new(processor), store)
        .with_progress_interval(config.progress_interval);

    let formatted = records.len();
    let report = orchestrator.run(records, &run_id, config.workers).await?;

    let summary = CleanSummary {
        run_id: report.run_id.clone(),
        raw_rows: raws.len(),
        formatted_records: formatted,
        accepted: report.records.len(),
        rejected: report.progress.rejected,
        dropped: report.progress.dropped,
        retries: report.progress.retries,
        elapsed_secs: report.progress.elapsed.as_secs(),
        checkpoint: report.checkpoint.display().to_string(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("✓ Cleaning completed");
        println!("  Run id:    {}", summary.run_id);
        println!("  Records:   {}", summary.formatted_records);
        println!("  Accepted:  {}", summary.accepted);
        println!("  Rejected:  {}", summary.rejected);
        println!("  Dropped:   {}", summary.dropped);
        println!("  Saved to:  {}", summary.checkpoint);
    }
    Ok(())
}

async fn run_view_command(args: ViewArgs) -> anyhow::Result<()> {
    let store = CheckpointStore::new(args.steps_dir.clone());

    let Some(run_id) = args.run_id else {
        let runs = store.list_runs().await?;
        if runs.is_empty() {
            println!("No runs found in {}", args.steps_dir.display());
        }
        for run in runs {
            let mut present = Vec::new();
            for stage in Stage::ALL {
                if store.exists(&run, stage).await {
                    present.push(stage.as_str());
                }
            }
            println!("{}  [{}]", run, present.join(", "));
        }
        return Ok(());
    };

    let stages: Vec<Stage> = if args.stage.eq_ignore_ascii_case("all") {
        Stage::ALL.to_vec()
    } else {
        vec![args.stage.parse::<Stage>()?]
    };

    for stage in stages {
        if !store.exists(&run_id, stage).await {
            continue;
        }
        let summary = store.stage_summary(&run_id, stage).await?;
        println!("Step: {}", stage);
        println!("  Rows: {}", summary.rows);
        if let Some(modified) = summary.modified {
            println!("  Updated: {}", modified.to_rfc3339());
        }
    }
    Ok(())
}
