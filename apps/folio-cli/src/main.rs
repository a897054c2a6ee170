use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};

use folio_core::config::{Config, Settings};
use folio_core::{Answer, Loader, Splitter};
use folio_embed::{embedder_from_settings, EmbedPool};
use folio_rag::{generator_from_settings, BuildPipeline, Retriever};
use folio_vector::{IndexHandle, VectorIndex};

const SMOKE_QUERY: &str = "What projects are described in these files?";
const SOURCES_SHOWN: usize = 3;

#[derive(Parser)]
#[command(name = "folio", version, about = "Ask questions about a portfolio of documents")]
struct Cli {
    /// Directory holding config.toml (defaults to the working directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the index from a source directory
    Build {
        /// Source directory (defaults to data.source_dir)
        dir: Option<PathBuf>,
        /// Run a sample question against the new index
        #[arg(long)]
        smoke: bool,
    },
    /// Answer one question
    Query {
        text: String,
        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
        /// Number of sources to list
        #[arg(long, default_value_t = SOURCES_SHOWN)]
        sources: usize,
    },
    /// Interactive question loop; `q` quits
    Chat,
    /// Describe the persisted index
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = match &cli.config_dir {
        Some(dir) => Config::load_from(dir),
        None => Config::load(),
    }
    .context("loading configuration")?;
    let settings = config.settings()?;
    tracing::debug!(config_dir = %config.base_dir().display(), "configuration loaded");

    match cli.command {
        Command::Build { dir, smoke } => {
            let root = dir.unwrap_or_else(|| settings.data.source_dir.clone());
            let handle = build(&settings, root).await?;
            if smoke {
                let retriever = retriever(&settings, handle)?;
                println!("\nTesting with query: '{SMOKE_QUERY}'");
                print_answer(&retriever.answer(SMOKE_QUERY).await?, SOURCES_SHOWN);
            }
        }
        Command::Query { text, json, sources } => {
            let retriever = retriever(&settings, open_index(&settings).await?)?;
            let answer = retriever.answer(&text).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer, sources);
            }
        }
        Command::Chat => chat(&settings).await?,
        Command::Status => status(&settings).await?,
    }
    Ok(())
}

fn request_timeout(settings: &Settings) -> Duration {
    settings.retry.policy().timeout
}

async fn build(settings: &Settings, root: PathBuf) -> anyhow::Result<Arc<IndexHandle>> {
    let embedder = embedder_from_settings(&settings.embedding, request_timeout(settings))?;
    let bar = ProgressBar::no_length();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} chunks embedded {msg}")
            .context("progress template")?,
    );
    let pool = EmbedPool::new(
        embedder,
        settings.embedding.batch_size,
        settings.embedding.concurrency,
        settings.retry.policy(),
    )
    .with_progress(bar.clone());
    let pipeline = BuildPipeline::new(Loader::new(settings.loader.clone()), Splitter::new(settings.splitter.clone())?, pool)
        .with_parallel_files(settings.build.parallel_files)
        .with_distance(settings.retrieval.distance);

    println!("Building index from {}", root.display());
    let mut outcome = pipeline.build(&root).await?;
    bar.finish_and_clear();
    outcome.index.persist(&settings.data.index_dir).await?;

    println!("✅ {}", outcome.report);
    for failure in &outcome.report.failures {
        println!("   skipped ({}) {}: {}", failure.stage, failure.item, failure.error);
    }
    println!("📁 Index written to {}", settings.data.index_dir.display());
    Ok(Arc::new(IndexHandle::new(outcome.index)))
}

async fn open_index(settings: &Settings) -> anyhow::Result<Arc<IndexHandle>> {
    let index = VectorIndex::load(&settings.data.index_dir, settings.embedding.dim)
        .await
        .with_context(|| "no usable index; run `folio build` first")?;
    Ok(Arc::new(IndexHandle::new(index)))
}

fn retriever(settings: &Settings, handle: Arc<IndexHandle>) -> anyhow::Result<Retriever> {
    let timeout = request_timeout(settings);
    let embedder = embedder_from_settings(&settings.embedding, timeout)?;
    let generator = generator_from_settings(&settings.generation, timeout)?;
    Ok(Retriever::new(handle, embedder, generator, settings.retry.policy()).with_top_k(settings.retrieval.top_k))
}

async fn chat(settings: &Settings) -> anyhow::Result<()> {
    let retriever = retriever(settings, open_index(settings).await?)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("\nEnter 'q' to quit");
    loop {
        print!("\nEnter your query: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else { break };
        let query = line.trim();
        if query.eq_ignore_ascii_case("q") {
            break;
        }
        if query.is_empty() {
            continue;
        }
        match retriever.answer(query).await {
            Ok(answer) => print_answer(&answer, SOURCES_SHOWN),
            Err(e) => eprintln!("❌ {e}"),
        }
    }
    Ok(())
}

async fn status(settings: &Settings) -> anyhow::Result<()> {
    let handle = open_index(settings).await?;
    let index = handle.snapshot();
    let schema = index.schema();
    println!("Index: {}", settings.data.index_dir.display());
    println!("  entries:  {}", index.len());
    println!("  dim:      {}", schema.dim);
    println!("  distance: {}", schema.distance.as_str());
    println!("  model:    {}", schema.model_id);
    if let Some(at) = index.built_at() {
        println!("  built at: {}", at.to_rfc3339());
    }
    let projects = index.projects();
    println!("  projects: {}", projects.len());
    for name in projects {
        println!("    - {name}");
    }
    Ok(())
}

fn print_answer(answer: &Answer, sources: usize) {
    println!("\nResponse:\n{}", answer.answer);
    println!("\nSummary:\n{}", answer.summary);
    println!("\nSources:");
    for (i, chunk) in answer.sources.iter().take(sources).enumerate() {
        println!("{}. {}", i + 1, chunk.source_path);
    }
}
