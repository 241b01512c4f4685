use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt as _};

use crate::{
    boxed,
    config::PipelineConfig,
    constants::DEFAULT_HASHING_DIMENSION,
    knowledge::read_jsonl,
    model::{ApiModelConfig, EmbeddingModel, GenerationRequest, LangModel},
    storage::{BlobStore, FileSystemBlobStore},
    training::{TrainingExample, write_jsonl},
    value::{PatientRecord, ReportType},
    workflow::{Pipeline, ReportRequest},
};

const API_KEY_VAR: &str = "MEDREPORT_API_KEY";

#[derive(Parser, Debug)]
#[command(name = "medreport", version, about = "Knowledge-grounded medical report generation", long_about = None)]
struct Cli {
    #[arg(long, help = "Pipeline configuration (JSON). Defaults apply to omitted fields.")]
    config: Option<PathBuf>,

    #[arg(long, default_value = ".medreport", help = "Directory holding knowledge checkpoints")]
    data_dir: PathBuf,

    #[arg(long, help = "Base URL of an OpenAI-compatible generation service")]
    api_base_url: Option<String>,

    #[arg(long, default_value = "default")]
    model: String,

    #[arg(
        long,
        help = "Embedding model served by the same API. Uses local hashing embeddings if omitted."
    )]
    embedding_model: Option<String>,

    #[arg(long, default_value_t = DEFAULT_HASHING_DIMENSION)]
    embedding_dim: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingests or updates knowledge documents from a JSONL file.
    Ingest { path: PathBuf },
    /// Generates one report for a patient record (JSON object).
    Generate {
        #[arg(long)]
        report_type: ReportType,

        #[arg(long)]
        patient: PathBuf,

        #[arg(long, help = "Write the report as a training example if it succeeded")]
        training_out: Option<PathBuf>,
    },
    /// Prints knowledge base statistics.
    Stats,
    /// Removes superseded chunks from the index.
    Compact,
}

fn api_config(base_url: &str, model: &str) -> ApiModelConfig {
    let config = ApiModelConfig::new(base_url, model);
    match std::env::var(API_KEY_VAR) {
        Ok(key) if !key.is_empty() => config.with_api_key(key),
        _ => config,
    }
}

fn lang_model(cli: &Cli) -> anyhow::Result<LangModel> {
    match &cli.api_base_url {
        Some(url) => LangModel::new_api(api_config(url, &cli.model)),
        None => Ok(LangModel::new_custom(Arc::new(|_req: GenerationRequest| {
            boxed!(async { Err::<String, _>(anyhow::anyhow!("no generation service configured; pass --api-base-url")) })
        }))),
    }
}

fn embedding_model(cli: &Cli) -> anyhow::Result<EmbeddingModel> {
    match (&cli.api_base_url, &cli.embedding_model) {
        (Some(url), Some(model)) => EmbeddingModel::new_api(api_config(url, model), cli.embedding_dim),
        (None, Some(_)) => anyhow::bail!("--embedding-model requires --api-base-url"),
        _ => Ok(EmbeddingModel::new_hashing(cli.embedding_dim)),
    }
}

pub async fn medreport_cli(args: Vec<String>) -> anyhow::Result<()> {
    let cli = Cli::parse_from(args);

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let blob_store: Arc<dyn BlobStore> = Arc::new(FileSystemBlobStore::new(&cli.data_dir));
    let pipeline = Pipeline::init(config, lang_model(&cli)?, embedding_model(&cli)?, blob_store).await?;

    let result = run_command(&cli.command, &pipeline).await;
    pipeline.shutdown().await?;
    result
}

async fn run_command(command: &Commands, pipeline: &Pipeline) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { path } => {
            let documents = read_jsonl(path).await?;
            let total = documents.len();
            let mut reports = pipeline.knowledge().ingest_stream(stream::iter(documents));
            let mut changed = 0;
            while let Some(report) = reports.next().await {
                let report = report?;
                match report.version {
                    Some(version) => {
                        changed += 1;
                        println!("* {} v{} ({} chunks)", report.source_id, version, report.chunks);
                    }
                    None => println!("* {} unchanged", report.source_id),
                }
            }
            println!("{} of {} documents changed", changed, total);
        }
        Commands::Generate {
            report_type,
            patient,
            training_out,
        } => {
            let content = tokio::fs::read_to_string(patient)
                .await
                .with_context(|| format!("tokio::fs::read_to_string {} failed", patient.display()))?;
            let patient: PatientRecord = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a patient JSON object", patient.display()))?;
            let request = ReportRequest::new(patient, *report_type);
            let response = pipeline.service().submit(request.clone()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);

            if let Some(path) = training_out {
                match TrainingExample::from_response(&request, &response) {
                    Some(example) => write_jsonl(path, &[example]).await?,
                    None => log::warn!("run {} was not ok; no training example written", response.run_id),
                }
            }
        }
        Commands::Stats => {
            let stats = pipeline.knowledge().stats();
            println!("Live chunks: {}", stats.live_chunks);
            println!("Tombstoned chunks: {}", stats.tombstoned_chunks);
            println!("Sources: {}", stats.sources);
            println!("Dimension: {}", pipeline.knowledge().dimension());
        }
        Commands::Compact => {
            let removed = pipeline.knowledge().compact().await?;
            println!("Removed {} tombstoned chunks", removed);
        }
    }
    Ok(())
}
