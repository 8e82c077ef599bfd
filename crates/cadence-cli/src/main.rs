use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cadence_core::{CallSite, UsageWindow, WorkItem};
use cadence_runtime::{
    DirectoryTemplates, GenerationClient, InMemoryTemplates, RuntimeConfig, TemplateStore,
    UsageLedger, ValidationOrchestrator,
};

const DEFAULT_RUNTIME_CONFIG: &str = ".cadence/runtime.yaml";

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Run and inspect LLM-backed ceremonies", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runtime configuration (retry policy, file locations, selection)
    #[arg(long, global = true, default_value = DEFAULT_RUNTIME_CONFIG)]
    runtime_config: PathBuf,

    /// Ceremony configuration file, overriding the runtime configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Usage history file, overriding the runtime configuration
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Debug logging for cadence crates
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which provider and model a call site resolves to
    Resolve {
        ceremony: String,
        stage: String,

        #[arg(long)]
        validation_type: Option<String>,
    },

    /// Check credentials for every provider/model pair a ceremony uses
    Preflight { ceremony: String },

    /// Show recorded token usage
    Usage {
        /// Limit to one ceremony
        #[arg(long)]
        ceremony: Option<String>,
    },

    /// Run the validator panel over a work item (JSON file)
    Validate {
        item: PathBuf,

        #[arg(long, default_value = "validation")]
        ceremony: String,

        #[arg(long, default_value = cadence_runtime::orchestrator::DEFAULT_VALIDATION_STAGE)]
        stage: String,

        /// Directory of `<reference>.md` validator templates
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Let the model pick validators
        #[arg(long)]
        classify: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageReport {
    scope: String,
    all_time: UsageWindow,
    today: UsageWindow,
    this_week: UsageWindow,
    this_month: UsageWindow,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut runtime = RuntimeConfig::load(&cli.runtime_config)
        .with_context(|| format!("loading {}", cli.runtime_config.display()))?;
    if let Some(path) = cli.config {
        runtime.config_path = path;
    }
    if let Some(path) = cli.ledger {
        runtime.ledger_path = path;
    }
    tracing::debug!(
        config = %runtime.config_path.display(),
        ledger = %runtime.ledger_path.display(),
        "runtime configuration loaded"
    );

    match cli.command {
        Commands::Resolve {
            ceremony,
            stage,
            validation_type,
        } => resolve(&runtime, ceremony, stage, validation_type),
        Commands::Preflight { ceremony } => preflight(&runtime, &ceremony).await,
        Commands::Usage { ceremony } => usage(&runtime, ceremony.as_deref()),
        Commands::Validate {
            item,
            ceremony,
            stage,
            templates,
            classify,
        } => validate(&runtime, item, ceremony, stage, templates, classify).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "cadence=debug,warn" } else { "cadence=info,warn" })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn client(runtime: &RuntimeConfig) -> Result<GenerationClient> {
    GenerationClient::from_runtime_config(runtime)
        .with_context(|| format!("loading ceremony config {}", runtime.config_path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve(
    runtime: &RuntimeConfig,
    ceremony: String,
    stage: String,
    validation_type: Option<String>,
) -> Result<()> {
    let mut site = CallSite::new(ceremony, stage);
    if let Some(vt) = validation_type {
        site = site.with_validation_type(vt);
    }
    print_json(&client(runtime)?.resolve(&site))
}

async fn preflight(runtime: &RuntimeConfig, ceremony: &str) -> Result<()> {
    let report = client(runtime)?.preflight(ceremony).await?;
    print_json(&report)?;

    if !report.all_valid() {
        bail!("one or more credentials for '{}' were rejected", ceremony);
    }
    Ok(())
}

fn usage(runtime: &RuntimeConfig, ceremony: Option<&str>) -> Result<()> {
    let ledger = UsageLedger::new(&runtime.ledger_path);
    let now = Utc::now();

    let report = match ceremony {
        Some(name) => UsageReport {
            scope: name.to_string(),
            all_time: ledger.ceremony_all_time(name)?,
            today: ledger.ceremony_day(name, now)?,
            this_week: ledger.ceremony_week(name, now)?,
            this_month: ledger.ceremony_month(name, now)?,
        },
        None => UsageReport {
            scope: "all".to_string(),
            all_time: ledger.global_all_time()?,
            today: ledger.global_day(now)?,
            this_week: ledger.global_week(now)?,
            this_month: ledger.global_month(now)?,
        },
    };
    print_json(&report)
}

async fn validate(
    runtime: &RuntimeConfig,
    item_path: PathBuf,
    ceremony: String,
    stage: String,
    templates: Option<PathBuf>,
    classify: bool,
) -> Result<()> {
    let contents = std::fs::read_to_string(&item_path)
        .with_context(|| format!("reading {}", item_path.display()))?;
    let item: WorkItem = serde_json::from_str(&contents)
        .with_context(|| format!("parsing work item {}", item_path.display()))?;

    let templates: Arc<dyn TemplateStore> = match templates {
        Some(dir) => Arc::new(DirectoryTemplates::new(dir)),
        None => Arc::new(InMemoryTemplates::generic()),
    };

    let client = Arc::new(client(runtime)?);
    let checks = client.preflight(&ceremony).await?;
    if !checks.all_valid() {
        print_json(&checks)?;
        bail!("credential check failed for '{}', not running validators", ceremony);
    }

    let orchestrator = ValidationOrchestrator::builder()
        .client(Arc::clone(&client))
        .templates(templates)
        .ceremony(ceremony)
        .stage(stage)
        .runtime_config(runtime)
        .classify(classify || runtime.classify_validators)
        .build()?;

    tracing::info!(item = %item.id, "running validators");
    let report = orchestrator.run(&item).await?;
    for line in report.summary_lines() {
        eprintln!("{}", line);
    }

    let session = client.session_usage();
    eprintln!(
        "{} calls, {} tokens, ~${:.4}",
        session.calls,
        session.total_tokens(),
        session.estimated_cost
    );

    print_json(&report)
}
