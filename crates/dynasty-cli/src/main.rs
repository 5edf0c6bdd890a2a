//! Dynasty CLI - Command-line interface
//!
//! Usage:
//!   dynasty run --subjects mps.json --biographies pages/ [--store relations.json] [--resume]
//!   dynasty report [--store relations.json] [--format json]
//!   dynasty schema

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dynasty_core::{
    load_subjects, AppConfig, ExtractionResult, FailurePolicy, JsonFileStore, LoggingConfig,
    RecordStore, StoredRecord, Subject,
};
use dynasty_extractor::{
    relations_schema, DirectorySource, ExtractorConfig, Pipeline, RelationExtractor, RunStats,
    SubjectOutcome,
};
use dynasty_llm::create_llm_client;
use dynasty_report::{render, Aggregator, ReportFormat};
use tracing_subscriber::EnvFilter;

const DEFAULT_STORE: &str = "relations.json";

#[derive(Parser)]
#[command(name = "dynasty")]
#[command(about = "Measure how many legislators come from political families")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract relations for every subject, store them and print the summary
    Run(RunArgs),
    /// Print the summary of an existing record store
    Report(ReportArgs),
    /// Print the JSON schema sent to the extraction service
    Schema,
}

#[derive(Args)]
struct RunArgs {
    /// JSON array of subjects
    #[arg(long)]
    subjects: PathBuf,

    /// Directory of biography text files
    #[arg(long)]
    biographies: PathBuf,

    /// Record store to write
    #[arg(long, default_value = DEFAULT_STORE)]
    store: PathBuf,

    /// Reuse successful records already in the store
    #[arg(long)]
    resume: bool,

    /// Concurrent extractions
    #[arg(long)]
    workers: Option<usize>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// count | exclude
    #[arg(long)]
    failed_subjects: Option<FailurePolicy>,

    /// markdown | json
    #[arg(long, default_value = "markdown")]
    format: ReportFormat,
}

#[derive(Args)]
struct ReportArgs {
    /// Record store to read
    #[arg(long, default_value = DEFAULT_STORE)]
    store: PathBuf,

    /// count | exclude
    #[arg(long)]
    failed_subjects: Option<FailurePolicy>,

    /// markdown | json
    #[arg(long, default_value = "markdown")]
    format: ReportFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), |key| std::env::var(key).ok())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Report(args) => report(config, args).await,
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&relations_schema())?);
            Ok(())
        }
    }
}

/// Defaults, then the config file, then environment overrides
fn load_config<F>(path: Option<&Path>, lookup: F) -> anyhow::Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    Ok(config.with_overrides(lookup)?)
}

/// Logs go to stderr so stdout carries only the report
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Flags win over file and environment
fn apply_run_args(mut config: AppConfig, args: &RunArgs) -> AppConfig {
    if let Some(workers) = args.workers {
        config.extraction.workers = workers;
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if let Some(policy) = args.failed_subjects {
        config.report.failed_subjects = policy;
    }
    config
}

async fn run(config: AppConfig, args: RunArgs) -> anyhow::Result<()> {
    let config = apply_run_args(config, &args);
    config.validate()?;

    let subjects = load_subjects(&args.subjects)?;
    tracing::info!(
        "Loaded {} subjects from {}",
        subjects.len(),
        args.subjects.display()
    );

    let llm = create_llm_client(&config.llm)?;
    let extractor = Arc::new(RelationExtractor::new(
        llm,
        ExtractorConfig::from_app_config(&config),
    ));
    let source = Arc::new(DirectorySource::new(&args.biographies));
    let pipeline = Pipeline::new(source, extractor, config.extraction.workers);

    let store = JsonFileStore::new(&args.store);
    let previous = if args.resume {
        store.load().await?
    } else {
        Vec::new()
    };

    let outcomes = pipeline.run_resuming(subjects, previous).await;

    let records: Vec<StoredRecord> = outcomes.iter().map(SubjectOutcome::to_record).collect();
    store.save(&records).await?;

    let stats = RunStats::from_outcomes(&outcomes);
    if stats.failed > 0 {
        tracing::warn!(
            "{} of {} extractions failed; see extraction_failed in {}",
            stats.failed,
            stats.total,
            args.store.display()
        );
    }

    let rows = Aggregator::new(config.report.failed_subjects)
        .aggregate(outcomes.iter().map(|o| (&o.subject, &o.result)));
    println!("{}", render(&rows, args.format)?);
    Ok(())
}

async fn report(config: AppConfig, args: ReportArgs) -> anyhow::Result<()> {
    let policy = args
        .failed_subjects
        .unwrap_or(config.report.failed_subjects);

    let store = JsonFileStore::new(&args.store);
    println!("{}", summarize_store(&store, policy, args.format).await?);
    Ok(())
}

/// Re-aggregate the records of an earlier run
async fn summarize_store(
    store: &JsonFileStore,
    policy: FailurePolicy,
    format: ReportFormat,
) -> anyhow::Result<String> {
    let records = store.load().await?;
    if records.is_empty() {
        tracing::warn!("No records in {}", store.path().display());
    }

    let pairs: Vec<(Subject, ExtractionResult)> =
        records.into_iter().map(StoredRecord::into_parts).collect();
    let rows = Aggregator::new(policy).aggregate(pairs.iter().map(|(s, r)| (s, r)));

    Ok(render(&rows, format)?)
}
