use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use policyqa_core::config::{Config, Settings};
use policyqa_core::traits::Retriever;
use policyqa_core::types::{FinalRankedResults, QuerySet, RetrievalMode};
use policyqa_hybrid::CancellationToken;
use policyqa_vector::{write_chunk_table, ChunkIndexFile};

mod app;
mod render;

use app::App;

#[derive(Parser)]
#[command(name = "policyqa")]
#[command(about = "Hybrid dense + sparse retrieval over a chunked policy document", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./config.toml)
    #[arg(long, global = true, env = "POLICYQA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand, retrieve with both engines, fuse with RRF
    Query {
        text: String,

        /// Use this variation instead of asking the language model (give exactly 3)
        #[arg(long = "variation")]
        variations: Vec<String>,

        /// Number of fused chunks to return
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Dense retrieval for a single query string
    Dense {
        text: String,

        #[arg(short, long)]
        k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// BM25 retrieval for a single query string
    Sparse {
        text: String,

        #[arg(short, long)]
        k: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Describe the loaded corpus and models
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Copy the JSON chunk index into a new LanceDB table
    ImportLance {
        /// Chunk index to read (defaults to store.chunk_index)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Table name (defaults to store.table)
        #[arg(long)]
        table: Option<String>,
    },
}

#[derive(Serialize)]
struct QueryReport<'a> {
    queries: &'a QuerySet,
    results: &'a FinalRankedResults,
}

fn spinner(msg: &'static str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")?);
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Applies command-line overrides and checks the result like a config file.
fn with_overrides(mut settings: Settings, per_query_k: Option<usize>, top_k: Option<usize>) -> anyhow::Result<Settings> {
    if let Some(k) = per_query_k {
        settings.retrieval.per_query_k = k;
    }
    if let Some(k) = top_k {
        settings.retrieval.top_k = k;
    }
    settings.validate()?;
    Ok(settings)
}

/// One engine, one query string, no expansion or fusion.
async fn single(settings: Settings, text: &str, k: Option<usize>, json: bool, mode: RetrievalMode) -> anyhow::Result<()> {
    let settings = with_overrides(settings, k, None)?;
    let app = App::open(settings).await?;
    let result = match mode {
        RetrievalMode::Dense => app.dense().retrieve(text).await,
        RetrievalMode::Sparse => app.sparse().retrieve(text).await,
    }
    .with_context(|| format!("{mode} retrieval failed"))?;
    if json {
        print_json(&result)
    } else {
        render::print_list(&result, app.store().as_ref());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading configuration")?;
    let settings = config.settings()?;

    match cli.command {
        Commands::Query { text, variations, top_k, json } => {
            let settings = with_overrides(settings, None, top_k)?;
            let app = App::open(settings).await?;
            let hybrid = app.hybrid(variations)?;

            let token = CancellationToken::new();
            let trigger = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            });

            let pb = spinner("retrieving")?;
            let outcome = token
                .run(async {
                    let queries = hybrid.expand(&text).await?;
                    let results = hybrid.search_queries(&queries).await?;
                    Ok::<_, policyqa_core::Error>((queries, results))
                })
                .await;
            pb.finish_and_clear();
            let (queries, results) = outcome.context("query failed")?;
            tracing::info!(raw = results.total_before_dedup, unique = results.total_after_dedup, returned = results.len(), "query complete");

            if json {
                print_json(&QueryReport { queries: &queries, results: &results })?;
            } else {
                render::print_results(&queries, &results);
            }
        }
        Commands::Dense { text, k, json } => single(settings, &text, k, json, RetrievalMode::Dense).await?,
        Commands::Sparse { text, k, json } => single(settings, &text, k, json, RetrievalMode::Sparse).await?,
        Commands::Stats { json } => {
            let app = App::open(settings).await?;
            let stats = app.stats();
            if json {
                print_json(&stats)?;
            } else {
                render::print_stats(&stats);
            }
        }
        Commands::ImportLance { index, table } => {
            let index_path = index.unwrap_or_else(|| settings.store.chunk_index.clone());
            let table = table.unwrap_or_else(|| settings.store.table.clone());
            let chunk_index = ChunkIndexFile::read(&index_path).with_context(|| format!("reading {}", index_path.display()))?;
            let pb = spinner("writing lance table")?;
            let written = write_chunk_table(&settings.store.lance_dir, &table, &chunk_index).await;
            pb.finish_and_clear();
            let rows = written.context("writing lance table")?;
            println!("Imported {rows} chunks into table '{table}' at {}", settings.store.lance_dir.display());
        }
    }
    Ok(())
}
