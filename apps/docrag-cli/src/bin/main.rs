use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docrag_core::config::Config;
use docrag_core::nodes::{discover_node_files, document_id_for, load_nodes};
use docrag_core::{MetadataFilter, SearchResult};
use docrag_pipeline::{build_from_settings, RagPipeline};

#[derive(Parser, Debug)]
#[command(name = "docrag", about = "Index extracted document nodes and answer questions over them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the vector index if it does not exist
    Provision,
    /// Index a node file (JSON array of nodes) or every *.json file under a directory
    Ingest {
        path: PathBuf,
        /// Document id to use instead of the file stem (single file only)
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Print the chunks most similar to a query
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Answer a question from the indexed chunks
    Ask {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        document_id: Option<String>,
        /// Only print the rendered prompt (skip the completion call)
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    let settings = config.settings()?;
    info!(env = config.env_name(), backend = ?settings.vector_store.backend, "starting docrag");
    let pipeline = build_from_settings(&settings).await?;

    match cli.command {
        Command::Provision => {
            pipeline.provision().await?;
            println!("✅ Index '{}' is ready", pipeline.store().spec().name);
        }
        Command::Ingest { path, document_id } => {
            pipeline.provision().await?;
            ingest(&pipeline, &path, document_id).await?;
        }
        Command::Search { query, top_k, document_id } => {
            let filter = document_id.as_deref().map(MetadataFilter::document);
            let top_k = top_k.unwrap_or_else(|| pipeline.default_top_k());
            let results = pipeline.search(&query, top_k, filter.as_ref()).await?;
            if results.is_empty() {
                println!("No matching chunks.");
            }
            for (i, r) in results.iter().enumerate() {
                print_result(i + 1, r);
            }
        }
        Command::Ask { query, top_k, document_id, dry_run } => {
            let top_k = top_k.unwrap_or_else(|| pipeline.default_top_k());
            if dry_run {
                let filter = document_id.as_deref().map(MetadataFilter::document);
                let (chunks, prompt) = pipeline.preview_prompt(&query, top_k, filter.as_ref()).await?;
                match prompt {
                    Some(prompt) => println!("--- Prompt ({} chunks) ---\n{}\n", chunks.len(), prompt),
                    None => println!("No relevant context found."),
                }
                println!("dry-run enabled; skipping completion call.");
                return Ok(());
            }
            let result = match document_id.as_deref() {
                Some(id) => pipeline.answer_for_document(&query, top_k, id).await,
                None => pipeline.answer(&query, top_k).await,
            };
            match result {
                Ok(answer) => {
                    println!("{}\n", answer.answer);
                    println!("--- Sources ({}) ---", answer.total_chunks);
                    for (i, r) in answer.supporting_chunks.iter().enumerate() {
                        print_result(i + 1, r);
                    }
                    for path in answer.image_paths() {
                        println!("🖼  {}", path);
                    }
                }
                Err(e) if e.is_no_context() => println!("No relevant context found for the question."),
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

async fn ingest(pipeline: &RagPipeline, path: &Path, document_id: Option<String>) -> Result<()> {
    let files = discover_node_files(path);
    if files.is_empty() {
        bail!("no node files found at {}", path.display());
    }
    if document_id.is_some() && files.len() > 1 {
        bail!("--document-id can only be used with a single node file");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            on_signal.cancel();
        }
    });

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    let mut records = 0usize;
    for file in &files {
        let id = match document_id.clone().or_else(|| document_id_for(file)) {
            Some(id) => id,
            None => bail!("cannot derive a document id from {}", file.display()),
        };
        pb.set_message(id.clone());
        let nodes = load_nodes(file)?;
        let report = pipeline
            .index_document_with_cancel(&nodes, &id, &cancel)
            .await
            .with_context(|| format!("failed to index {}", file.display()))?;
        records += report.records;
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!("✅ Ingest complete ({} documents, {} records)", files.len(), records);
    Ok(())
}

fn print_result(rank: usize, r: &SearchResult) {
    let page = r.page_num.map(|p| format!(" page {}", p)).unwrap_or_default();
    println!("{}. [{:.3}] {}{} ({})", rank, r.score, r.document_id, page, r.id);
    let preview: String = r.content.chars().take(200).collect();
    println!("   {}", preview.replace('\n', " "));
}
