use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use curia_core::config::{Config, EmbedderKind, Settings};
use curia_core::manifest::IngestManifest;
use curia_core::traits::Embedder;
use curia_embed::{BgeM3Embedder, HashEmbedder};
use curia_llm::{OllamaClient, OllamaEmbedder};
use curia_rag::{Answer, CancelToken, Curia, SummaryIndex};
use curia_vector::LanceDocumentStore;

#[derive(Parser)]
#[command(name = "curia", about = "Tiered summaries and progressive retrieval over legal judgments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store new or changed source files.
    Ingest {
        /// Defaults to `data.data_path`.
        dir: Option<PathBuf>,
        /// Clear the store, the summary index and the manifest first.
        #[arg(long)]
        restart: bool,
    },
    /// Build summary hierarchies.
    Summarize {
        #[arg(long)]
        document: Option<String>,
        /// Rebuild documents that already have a hierarchy.
        #[arg(long)]
        force: bool,
    },
    /// Answer a question from the summarized corpus.
    Ask {
        query: String,
        #[arg(long)]
        document: Option<String>,
    },
    /// Show stored and summarized documents.
    Status,
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let settings = config.settings().clone();
    let base = env::current_dir()?;
    let curia = open(&settings, &base)?;

    match cli.command {
        Commands::Ingest { dir, restart } => {
            let dir = dir.unwrap_or_else(|| settings.data.data_dir(&base));
            let outcome = ingest(&curia, &dir, &settings.data.manifest_path(&base), restart);
            // ingestion drops stale trees before it can fail
            curia.save_index(&settings.data.index_path(&base))?;
            outcome?;
        }
        Commands::Summarize { document, force } => {
            let outcome = summarize(&curia, document.as_deref(), force);
            curia.save_index(&settings.data.index_path(&base))?;
            outcome?;
        }
        Commands::Ask { query, document } => {
            let answer = match document {
                Some(id) => curia.ask_document(&query, &id)?,
                None => curia.ask(&query)?,
            };
            print_answer(&answer);
        }
        Commands::Status => {
            let status = curia.status()?;
            println!("documents:  {}", status.documents.len());
            println!("summarized: {}", status.summarized.len());
            for id in status.pending() {
                println!("  pending {id}");
            }
        }
    }
    Ok(())
}

fn open(settings: &Settings, base: &Path) -> Result<Curia> {
    let dim = settings.models.embedding_dim;
    let db_dir = settings.data.db_dir(base);
    let store = LanceDocumentStore::open(&db_dir, &settings.data.collection_name, dim)
        .with_context(|| format!("opening store at {}", db_dir.display()))?;
    let embedder: Arc<dyn Embedder> = match settings.models.embedder {
        EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(&settings.models)?),
        EmbedderKind::BgeM3 => Arc::new(BgeM3Embedder::from_settings(&settings.models, base)?),
        EmbedderKind::Hash => Arc::new(HashEmbedder::new(dim)),
    };
    let model = OllamaClient::new(&settings.models)?;
    let index_path = settings.data.index_path(base);
    let index = SummaryIndex::load(&index_path)
        .with_context(|| format!("loading summary index {}", index_path.display()))?;
    info!(trees = index.len(), embedder = ?settings.models.embedder, llm = %model.model(), "opened corpus");
    Ok(Curia::new(settings.clone(), Arc::new(store), embedder, Arc::new(model), Arc::new(index))?)
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} files {msg}")?);
    Ok(pb)
}

fn ingest(curia: &Curia, dir: &Path, manifest_path: &Path, restart: bool) -> Result<()> {
    let mut manifest = IngestManifest::load(manifest_path)?;
    let pb = spinner()?;
    let outcome = curia.ingest_directory(dir, &mut manifest, restart, |file| {
        pb.set_message(file.display().to_string());
        pb.inc(1);
    });
    pb.finish_and_clear();
    // keep what was recorded before a failure
    manifest.save(manifest_path)?;
    let report = outcome?;
    println!(
        "Ingested {} documents ({} chunks), {} unchanged, {} removed",
        report.ingested.len(),
        report.chunks,
        report.skipped,
        report.removed.len()
    );
    Ok(())
}

/// Token cancelled by the first Ctrl-C; trees committed so far are kept.
fn cancel_on_ctrl_c() -> Result<CancelToken> {
    let token = CancelToken::new();
    let runtime = tokio::runtime::Builder::new_current_thread().enable_io().build()?;
    let trigger = token.clone();
    thread::spawn(move || {
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current group");
                trigger.cancel();
            }
        })
    });
    Ok(token)
}

fn summarize(curia: &Curia, document: Option<&str>, force: bool) -> Result<()> {
    let cancel = cancel_on_ctrl_c()?;
    if let Some(id) = document {
        let root = curia.summarize(id, &cancel)?;
        println!("Summarized {id}: root at level {}", root.level);
        return Ok(());
    }

    let status = curia.status()?;
    let total = if force { status.documents.len() } else { status.pending().len() };
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    let report = curia.summarize_pending(force, &cancel, |id, _| {
        pb.set_message(id.to_string());
        pb.inc(1);
    });
    pb.finish_and_clear();
    let report = report?;
    println!("Summarized {} documents, {} failed", report.built.len(), report.failed.len());
    for (id, err) in &report.failed {
        println!("  {id}: [{}] {err}", err.code());
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}\n", answer.text);
    println!("Sources:");
    let passages = answer.evidence.iter().flat_map(|set| set.items().iter().map(move |item| (set.document_id(), item)));
    for (n, (document_id, item)) in passages.enumerate() {
        println!("  [{}] {document_id} level {} ({:.3}) {}", n + 1, item.level, item.score, item.node_id);
    }
}
