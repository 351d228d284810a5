use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use knowledge_indexer::{DedupKey, DirectorySource, IncrementalIndexer, IndexerOptions};
use knowledge_search::Retriever;
use knowledge_vector_store::{
    Embedder, EmbeddingConfig, EmbeddingMode, KnowledgeStore, DEFAULT_STORE_DIR,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod report;

pub use config::{FileConfig, IngestConfig, RetrievalConfig, DEFAULT_TOP_K};
use report::{QueryReport, StatusReport};

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    print_stdout(&serde_json::to_string_pretty(value)?)
}

#[derive(Parser)]
#[command(name = "knowledge")]
#[command(about = "Incremental vector knowledge store for document Q&A", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store directory (knowledge.toml is read from its parent)
    #[arg(long, global = true, default_value = DEFAULT_STORE_DIR)]
    store: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for results)
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Override embedding model id
    #[arg(long, global = true)]
    embed_model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new documents from a folder into the store
    Ingest(IngestArgs),

    /// Drop the stored state and ingest a folder from scratch
    Rebuild(IngestArgs),

    /// Retrieve the passages nearest to a question
    Query(QueryArgs),

    /// Show what the store currently holds
    Status(StatusArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Folder of documents (top level only)
    path: PathBuf,

    /// Maximum passage length in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive passages
    #[arg(long)]
    overlap: Option<usize>,

    /// What identifies an already ingested source
    #[arg(long, value_enum)]
    dedup: Option<DedupFlag>,

    /// Print run statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Natural-language question
    question: String,

    /// Number of passages to return
    #[arg(short, long)]
    k: Option<usize>,

    /// Only print the passage texts, separated by blank lines
    #[arg(long, conflicts_with = "json")]
    context: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Print status as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Stub,
    Openai,
}

impl EmbedMode {
    const fn as_domain(self) -> EmbeddingMode {
        match self {
            EmbedMode::Stub => EmbeddingMode::Stub,
            EmbedMode::Openai => EmbeddingMode::OpenAi,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum DedupFlag {
    Identifier,
    ContentHash,
    Both,
}

impl DedupFlag {
    const fn as_domain(self) -> DedupKey {
        match self {
            DedupFlag::Identifier => DedupKey::Identifier,
            DedupFlag::ContentHash => DedupKey::ContentHash,
            DedupFlag::Both => DedupKey::Both,
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if !cli.verbose {
        builder.filter_module("reqwest", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    let file_config = FileConfig::load_for_store(&cli.store)?;
    let embedding = resolve_embedding(&cli, &file_config)?;

    match cli.command {
        Commands::Ingest(ref args) => {
            run_ingest(&cli.store, args, &file_config, &embedding, false).await
        }
        Commands::Rebuild(ref args) => {
            run_ingest(&cli.store, args, &file_config, &embedding, true).await
        }
        Commands::Query(ref args) => run_query(&cli.store, args, &file_config, &embedding).await,
        Commands::Status(ref args) => run_status(&cli.store, args).await,
    }
}

/// File config, then environment, then command-line flags
fn resolve_embedding(cli: &Cli, file_config: &FileConfig) -> Result<EmbeddingConfig> {
    let mut embedding = file_config
        .embedding_with_env()
        .context("Invalid embedding configuration")?;
    if let Some(mode) = cli.embed_mode {
        embedding.mode = mode.as_domain();
    }
    if let Some(model) = &cli.embed_model {
        embedding.model = Some(model.clone());
    }
    Ok(embedding)
}

fn build_embedder(embedding: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder = embedding
        .build()
        .context("Failed to initialise embedding backend")?;
    log::debug!(
        "Embedding backend: {} ({})",
        embedding.mode.as_str(),
        embedder.model_id()
    );
    Ok(embedder)
}

fn indexer_options(args: &IngestArgs, file_config: &FileConfig) -> IndexerOptions {
    let mut options = file_config.indexer_options();
    if let Some(chunk_size) = args.chunk_size {
        options.chunker.chunk_size = chunk_size;
    }
    if let Some(overlap) = args.overlap {
        options.chunker.overlap = overlap;
    }
    if let Some(dedup) = args.dedup {
        options.dedup = dedup.as_domain();
    }
    options
}

async fn run_ingest(
    store: &Path,
    args: &IngestArgs,
    file_config: &FileConfig,
    embedding: &EmbeddingConfig,
    rebuild: bool,
) -> Result<()> {
    let options = indexer_options(args, file_config);
    let embedder = build_embedder(embedding)?;
    let indexer = IncrementalIndexer::new(store, embedder, options)?;

    let documents = DirectorySource::new(&args.path)
        .scan()
        .with_context(|| format!("Failed to scan {}", args.path.display()))?;

    let stats = if rebuild {
        indexer.rebuild(&documents).await?
    } else {
        indexer.run(&documents).await?
    };

    if args.json {
        print_json(&stats)
    } else {
        print_stdout(&report::render_index_stats(&stats))
    }
}

async fn run_query(
    store: &Path,
    args: &QueryArgs,
    file_config: &FileConfig,
    embedding: &EmbeddingConfig,
) -> Result<()> {
    let k = args.k.unwrap_or(file_config.retrieval.k);
    let embedder = build_embedder(embedding)?;
    let retriever = Retriever::open(store, embedder)
        .await
        .with_context(|| format!("Failed to open knowledge store {}", store.display()))?;

    let results = retriever.retrieve(&args.question, k).await?;
    if args.context {
        return print_stdout(&knowledge_search::format_context(&results));
    }

    let report = QueryReport {
        query: args.question.clone(),
        k,
        results,
    };
    if args.json {
        print_json(&report)
    } else {
        print_stdout(&report::render_query(&report))
    }
}

async fn run_status(store_dir: &Path, args: &StatusArgs) -> Result<()> {
    let store = KnowledgeStore::load(store_dir)
        .await
        .with_context(|| format!("Failed to open knowledge store {}", store_dir.display()))?;

    let report = StatusReport {
        store: store_dir.to_path_buf(),
        records: store.len(),
        dimension: store.dimension(),
        generation: store.generation(),
        embedding_model: store.embedding_model().map(str::to_string),
        sources: store.processed_sources(),
    };
    if args.json {
        print_json(&report)
    } else {
        print_stdout(&report::render_status(&report))
    }
}
