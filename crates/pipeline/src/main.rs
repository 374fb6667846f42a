//! LitForge pipeline
//!
//! Subcommands:
//! - `recommend`: build topic recommendations from seed papers
//! - `ingest`: store one seed paper in a topic
//! - `refresh-h-index`: recompute the derived h-index of stored papers
//!
//! Exit status: 0 on success, 2 when some seeds or papers failed, 1 on a
//! fatal error (configuration, unreachable store).

mod builder;
mod errors;
mod ingest;
mod refresh;
mod summary;

use anyhow::Context;
use builder::RecommendationBuilder;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use ingest::SeedIngestor;
use litforge_common::config::{AppConfig, ObservabilityConfig};
use litforge_common::db::models::Classification;
use litforge_common::metrics::register_metrics;
use litforge_common::source::{PaperSource, RetryingSource, SemanticScholarClient};
use litforge_common::{DbPool, Repository, VERSION};
use metrics_exporter_prometheus::PrometheusBuilder;
use refresh::HIndexRefresher;
use std::process::ExitCode;
use std::sync::Arc;
use summary::RunSummary;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pipeline", version, about = "LitForge ingestion and recommendation pipeline")]
struct Cli {
    /// Configuration file (replaces the config/ directory lookup)
    #[arg(short, long, global = true, env = "LITFORGE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build recommendations for one topic or for all topics
    Recommend(RecommendArgs),

    /// Fetch one paper and store it in a topic
    Ingest(IngestArgs),

    /// Re-fetch authors and recompute the derived h-index of every stored paper
    RefreshHIndex,
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["topic", "all"])))]
struct RecommendArgs {
    /// Topic name
    #[arg(long)]
    topic: Option<String>,

    /// Every stored topic
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct IngestArgs {
    /// Topic name; created when missing
    #[arg(long)]
    topic: String,

    /// External paper id
    #[arg(long)]
    paper: String,

    /// Negative papers steer recommendations away and never seed them
    #[arg(long, value_enum, default_value_t = SeedClassification::Positive)]
    classification: SeedClassification,

    /// Store the paper without using it as a recommendation seed
    #[arg(long)]
    no_recommend: bool,
}

impl IngestArgs {
    fn use_for_recommendation(&self) -> bool {
        matches!(self.classification, SeedClassification::Positive) && !self.no_recommend
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SeedClassification {
    Positive,
    Negative,
}

impl From<SeedClassification> for Classification {
    fn from(value: SeedClassification) -> Self {
        match value {
            SeedClassification::Positive => Classification::Positive,
            SeedClassification::Negative => Classification::Negative,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match AppConfig::load_validated(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.observability);
    info!(
        version = VERSION,
        service = %config.observability.service_name,
        "Starting LitForge pipeline"
    );

    let span = info_span!("run", run_id = %Uuid::now_v7());
    match run(cli.command, config).instrument(span).await {
        Ok(summary) => {
            info!(
                succeeded = summary.succeeded,
                skipped = summary.skipped,
                failed = summary.failures.len(),
                "Run finished"
            );
            println!("{}", summary);
            summary.exit_code()
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(command: Command, config: AppConfig) -> anyhow::Result<RunSummary> {
    if config.observability.metrics_port != 0 {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .install()
            .context("Failed to install metrics exporter")?;
        info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }
    register_metrics();

    let repository = Repository::new(DbPool::new(&config.database).await?);
    repository.ensure_schema().await?;

    let client = SemanticScholarClient::new(&config.source)?;
    let source: Arc<dyn PaperSource> =
        Arc::new(RetryingSource::new(client, config.source.retry_policy()));

    let summary = match command {
        Command::Recommend(args) => {
            let builder = RecommendationBuilder::new(source, repository, config.recommendation);
            let outcomes = match args.topic {
                Some(name) => vec![builder.build_topic_by_name(&name).await?],
                None => builder.build_all().await?,
            };
            RunSummary::from_topics(&outcomes)
        }
        Command::Ingest(args) => {
            let outcome = SeedIngestor::new(source, repository)
                .ingest_seed(
                    &args.topic,
                    &args.paper,
                    args.classification.into(),
                    args.use_for_recommendation(),
                )
                .await?;
            RunSummary::from_ingest(&outcome)
        }
        Command::RefreshHIndex => {
            let report = HIndexRefresher::new(source, repository).refresh_all().await?;
            RunSummary::from_refresh(&report)
        }
    };

    Ok(summary)
}
