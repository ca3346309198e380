//! mdm-engine — command-line front end for the entity-resolution pipeline.
//!
//! Wires the default, in-process runtime (in-memory lineage sink, no-op
//! embedding provider, bounded dead-letter queue) around the `mdm-pipeline`
//! orchestrator. A production deployment would swap the lineage sink for a
//! database-backed one and the embedding provider for a real ANN service;
//! everything else in this binary stays the same.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use uuid::Uuid;

use mdm_core::config::AppConfig;
use mdm_core::context::PipelineContext;
use mdm_core::error::MdmError;
use mdm_lineage::{InMemoryLineageSink, LineageSink};
use mdm_pipeline::{InMemoryDeadLetterSink, NoopEmbeddingProvider, Orchestrator, VecIngestionSource};

#[derive(Parser, Debug)]
#[command(name = "mdm-engine")]
#[command(about = "Master data management entity-resolution pipeline")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (overridden by MDM__-prefixed env vars)
    #[arg(long, env = "MDM__CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validates configuration and reports the runtime it would start with.
    Init,
    /// Ingests one batch of records, seeded from existing cross-references.
    ProcessBatch {
        /// Path to a JSON file containing an array of `Record`s.
        #[arg(long)]
        input: PathBuf,
    },
    /// Closes out every existing golden record and reprocesses the full
    /// ingestion source from a clean union-find.
    Rebuild {
        #[arg(long)]
        input: PathBuf,
    },
    /// Reverts lineage state to just before `to_event`, inclusive.
    Rollback {
        #[arg(long = "to-event")]
        to_event: Uuid,
    },
    /// Prints the current golden record, its field history, and related ids.
    Inspect {
        #[arg(long = "golden-id")]
        golden_id: Uuid,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mdm_engine=info,mdm_pipeline=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            let code = err.exit_code();
            error!(error = %err, exit_code = code, "mdm-engine exiting with an error");
            code
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), MdmError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Init => {
            info!(
                sources = config.sources.len(),
                fields = config.fields.len(),
                blocking_strategy = %config.blocking.strategy,
                match_threshold = config.thresholds.match_threshold,
                "configuration validated"
            );
            println!("mdm-engine initialized with {} source(s), {} field(s)", config.sources.len(), config.fields.len());
            Ok(())
        }
        Command::ProcessBatch { input } => {
            let records = read_records(&input)?;
            let (orchestrator, _lineage) = build_orchestrator(config, records)?;
            let cancel = install_cancellation();
            let stats = orchestrator.process_batch(&cancel).await?;
            print_stats(&stats);
            Ok(())
        }
        Command::Rebuild { input } => {
            let records = read_records(&input)?;
            let (orchestrator, _lineage) = build_orchestrator(config, records)?;
            let cancel = install_cancellation();
            let stats = orchestrator.rebuild(&cancel).await?;
            print_stats(&stats);
            Ok(())
        }
        Command::Rollback { to_event } => {
            let lineage = InMemoryLineageSink::new();
            lineage.rollback(to_event).await?;
            info!(to_event = %to_event, "rollback applied");
            println!("rolled back to event {to_event}");
            Ok(())
        }
        Command::Inspect { golden_id } => {
            let lineage = InMemoryLineageSink::new();
            let golden = lineage.get_golden(golden_id).await?;
            let history = lineage.field_history(golden_id).await?;
            let related = lineage
                .related_entities(golden_id, "xref", chrono::Utc::now())
                .await?;
            let report = serde_json::json!({
                "golden_id": golden_id,
                "golden_record": golden,
                "field_history": history,
                "related_entities": related,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, MdmError> {
    match AppConfig::load(path) {
        Ok(config) => Ok(config),
        Err(err) => {
            if path.is_some() {
                // An explicitly requested config file that fails to load is a
                // hard configuration error, not a silent fallback.
                Err(err)
            } else {
                warn!(error = %err, "failed to load configuration, using defaults");
                Ok(AppConfig::default())
            }
        }
    }
}

fn read_records(path: &Path) -> Result<Vec<mdm_core::types::Record>, MdmError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(MdmError::Serialization)
}

fn build_orchestrator(
    config: AppConfig,
    records: Vec<mdm_core::types::Record>,
) -> Result<(Orchestrator, Arc<InMemoryLineageSink>), MdmError> {
    if config.lineage.backend_is_external() {
        return Err(MdmError::Config(
            "an external lineage backend was configured, but only the in-memory reference sink is wired into this binary".to_string(),
        ));
    }
    let context = PipelineContext::new(config, chrono::Utc::now());
    let lineage = Arc::new(InMemoryLineageSink::new());
    let orchestrator = Orchestrator::new(
        context,
        Arc::new(VecIngestionSource::new(records)),
        Arc::new(NoopEmbeddingProvider),
        lineage.clone(),
        Arc::new(InMemoryDeadLetterSink::default()),
    )?;
    Ok((orchestrator, lineage))
}

fn install_cancellation() -> tokio_util::sync::CancellationToken {
    let token = tokio_util::sync::CancellationToken::new();
    let for_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received SIGINT, cancelling at the next suspension point");
            for_signal.cancel();
        }
    });
    token
}

fn print_stats(stats: &mdm_pipeline::PipelineStats) {
    let report = serde_json::json!({
        "records_ingested": stats.records_ingested,
        "records_dead_lettered": stats.records_dead_lettered,
        "candidate_pairs": stats.candidate_pairs,
        "verdicts_match": stats.verdicts_match,
        "verdicts_review": stats.verdicts_review,
        "verdicts_no_match": stats.verdicts_no_match,
        "clusters_created": stats.clusters_created,
        "clusters_updated": stats.clusters_updated,
        "clusters_merged": stats.clusters_merged,
        "demoted_edges": stats.demoted_edges,
        "golden_records_written": stats.golden_records_written,
        "merge_events_written": stats.merge_events_written,
        "duration_ms": stats.duration.as_millis(),
    });
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
}
