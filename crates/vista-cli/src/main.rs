//! Vista CLI: submit work to the pipeline and query its results.
//!
//! Reads the same environment as `vista-worker` (DATABASE_URL, storage and
//! bucket settings). Commands that need an embedding wait for a worker
//! hosting the `embedding` queue.

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use vista_cli::{cancel_on_signal, init_tracing, print_json, resolve_content_type};
use vista_core::Config;
use vista_pipeline::{setup_pipeline, BridgeConfig, Pipeline};

#[derive(Parser)]
#[command(name = "vista", about = "Vista media pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue analysis of an object already stored in the media bucket
    Enqueue {
        /// Object key
        key: String,
        /// MIME type; inferred from the key's extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Embed a text query and print the vector
    EmbedText {
        text: String,
    },
    /// List media visually similar to a media
    Similar {
        media_id: String,
        #[arg(long, default_value = "10")]
        limit: i64,
    },
    /// Search media by tags, dates, kind and format
    Search {
        /// Search expression, e.g. `beach -tagme`
        expression: String,
        #[arg(long, default_value = "20")]
        limit: i64,
        /// Rank by visual similarity to the text instead
        #[arg(long)]
        semantic: bool,
    },
    /// Rebuild the search index from the media records
    Reindex,
    /// Show a job
    Job {
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.validate()?;
    init_tracing("vista-cli")?;

    let (pool, state) = setup_pipeline(&config, false).await?;
    let pipeline = Pipeline::new(state, BridgeConfig::from_config(&config));

    let result = run(&pipeline, cli.command).await;
    pool.close().await;
    result
}

async fn run(pipeline: &Pipeline, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Enqueue { key, content_type } => {
            let content_type = resolve_content_type(&key, content_type)?;
            let job = pipeline.enqueue_analyze(&key, &content_type).await?;
            print_json(&job)?;
        }
        Commands::EmbedText { text } => {
            let embedding = pipeline
                .request_text_embedding(&text, &cancel_on_signal())
                .await
                .context("Text embedding failed")?;
            print_json(&embedding)?;
        }
        Commands::Similar { media_id, limit } => {
            let media = pipeline.similar_to(&media_id, limit).await?;
            print_json(&media)?;
        }
        Commands::Search {
            expression,
            limit,
            semantic,
        } => {
            let media = if semantic {
                pipeline
                    .semantic_search(&expression, limit, &cancel_on_signal())
                    .await
                    .context("Semantic search failed")?
            } else {
                pipeline.search_text(&expression, limit).await?
            };
            print_json(&media)?;
        }
        Commands::Reindex => {
            let job = pipeline.reindex_all().await?;
            print_json(&job)?;
        }
        Commands::Job { id } => {
            let job = pipeline
                .job(id)
                .await?
                .with_context(|| format!("Job {} not found", id))?;
            print_json(&job)?;
        }
    }
    Ok(())
}
