use clap::{Parser, Subcommand};
use mnemo_retriever::{
    config::MemoryConfig,
    provider::{LocalMemory, MemorySearchManager},
    retrieval::{directory_watcher::DirectoryWatcher, sync_worker::SyncWorker},
    status::HealthStatus,
    types::{SearchOptions, SearchResult, SyncRequest},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::Level;

/// A CLI tool to index a notes vault and search it with tiered escalation.
#[derive(Parser, Debug)]
#[command(name = "mnemo", author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vault root; overrides `vault.root` from the config
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Index database; overrides `vault.db_path` from the config
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the index up to date with the vault
    Sync {
        /// Re-chunk and re-embed every file
        #[arg(long)]
        force: bool,
        /// Reason recorded in the logs
        #[arg(long, default_value = "cli")]
        reason: String,
    },
    /// Search the index, escalating to remote tiers when needed
    Search {
        query: String,
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
        /// Only search the local index
        #[arg(long)]
        local_only: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show provider status and index health
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Check whether embeddings and vector search are usable
    Probe,
    /// List indexed chunks
    Chunks {
        /// Only chunks whose path starts with this prefix
        #[arg(long)]
        path: Option<String>,
        /// Limit number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Print lines of a vault file
    Read {
        /// Vault-relative path
        path: String,
        /// First line to print (1-based)
        #[arg(long)]
        from: Option<usize>,
        /// Number of lines to print
        #[arg(long)]
        lines: Option<usize>,
    },
    /// Keep the index in sync with the vault until interrupted
    Watch {
        /// Quiet period before a burst of changes triggers a sync
        #[arg(long, default_value_t = 2000)]
        debounce_ms: u64,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> anyhow::Result<MemoryConfig> {
    let mut config = match &args.config {
        Some(path) => MemoryConfig::load(path)?,
        None => MemoryConfig::default(),
    };
    if let Some(vault) = &args.vault {
        config.vault.root = vault.clone();
    }
    if let Some(db) = &args.db {
        config.vault.db_path = Some(db.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if let Commands::Config = args.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let memory = LocalMemory::open(config).await?;
    let result = dispatch(&memory, args.command).await;
    memory.close().await;
    result
}

async fn dispatch(memory: &LocalMemory, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Sync { force, reason } => {
            let mut request = SyncRequest::new(reason).with_progress(|p| {
                eprintln!("  embedded {}/{} {}", p.completed, p.total, p.label);
            });
            request.force = force;

            let summary = memory.sync(request).await?;
            if summary.skipped {
                println!("Another sync is embedding; nothing done");
            } else {
                println!(
                    "Scanned {} files: {} added, {} modified, {} deleted",
                    summary.files_scanned,
                    summary.files_added,
                    summary.files_modified,
                    summary.files_deleted
                );
                println!(
                    "Chunks indexed: {} | embedded: {} | cache hits: {} | embedding failures: {}",
                    summary.chunks_indexed,
                    summary.chunks_embedded,
                    summary.cache_hits,
                    summary.embedding_failures
                );
            }
            Ok(())
        }
        Commands::Search {
            query,
            max_results,
            min_score,
            local_only,
            format,
        } => {
            let options = SearchOptions {
                max_results,
                min_score,
            };
            let results = if local_only {
                memory.search_local(&query, &options).await?
            } else {
                memory.search(&query, &options).await?
            };
            print_results(&results, &format)
        }
        Commands::Status { format } => {
            let status = memory.status().await?;
            let health = memory.health().await;
            let model = memory.model_info().await;
            let overall = health.overall_status;

            match format {
                OutputFormat::Json => {
                    #[derive(Serialize)]
                    struct StatusOutput {
                        status: mnemo_retriever::status::ProviderStatus,
                        health: mnemo_retriever::status::IndexHealth,
                        model: mnemo_retriever::status::EmbeddingModelInfo,
                    }
                    let output = StatusOutput {
                        status,
                        health,
                        model,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("mnemo status");
                    println!("============");
                    println!("  Vault: {}", status.workspace_dir);
                    println!(
                        "  Database: {}",
                        status.db_path.as_deref().unwrap_or("(in memory)")
                    );
                    println!(
                        "  Files: {} | Chunks: {} | Vectors: {}",
                        status.files, status.chunks, status.vectors
                    );
                    println!(
                        "  Indexing: {} ({}){}",
                        status.indexing_phase,
                        status.indexing_progress,
                        if status.dirty { ", changes pending" } else { "" }
                    );
                    println!(
                        "  Keyword search: {} | Vector search: {}",
                        if status.fts_available { "fts5" } else { "like" },
                        if status.vector_available { "on" } else { "off" }
                    );
                    println!(
                        "  Model: {} ({} dims{})",
                        model.model_id,
                        model.dimension,
                        if model.degraded { ", degraded" } else { "" }
                    );
                    println!("  Health: {:?}", health.overall_status);
                    if let Some(ref error) = health.database_error {
                        println!("  Database error: {error}");
                    }
                    if format == OutputFormat::Full {
                        for tier in &status.tiers {
                            println!(
                                "  Tier {}: priority {}, {} ms, {}{}",
                                tier.id,
                                tier.priority,
                                tier.timeout_ms,
                                if tier.enabled { "enabled" } else { "disabled" },
                                match tier.available {
                                    Some(true) => ", reachable",
                                    Some(false) => ", unreachable",
                                    None => "",
                                }
                            );
                        }
                    }
                }
            }
            if overall == HealthStatus::Critical {
                anyhow::bail!("index is unhealthy");
            }
            Ok(())
        }
        Commands::Probe => {
            let vectors = memory.probe_vector_availability().await;
            println!("Vector search: {}", if vectors { "available" } else { "unavailable" });
            match memory.probe_embedding_availability().await {
                Some(probe) if probe.ok => println!("Embeddings: ok"),
                Some(probe) => println!(
                    "Embeddings: not ok ({})",
                    probe.error.as_deref().unwrap_or("unknown error")
                ),
                None => println!("Embeddings: not used"),
            }
            Ok(())
        }
        Commands::Chunks {
            path,
            limit,
            format,
        } => {
            let chunks = memory.list_chunks(path.as_deref(), limit).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&chunks)?),
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Found {} chunks:", chunks.len());
                    for chunk in chunks {
                        println!(
                            "  ID: {} | File: {} | Lines: {}-{} | Vector: {}",
                            chunk.id,
                            chunk.path,
                            chunk.start_line,
                            chunk.end_line,
                            if chunk.has_vector { "yes" } else { "no" }
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Read { path, from, lines } => {
            let slice = memory.read_file(&path, from, lines).await?;
            println!("{}", slice.text);
            Ok(())
        }
        Commands::Watch { debounce_ms } => {
            let engine = memory.engine();
            let worker = SyncWorker::spawn(engine.clone());
            let handle = worker.handle();

            handle.request_sync(SyncRequest::new("startup"))?;
            let watcher = DirectoryWatcher::start(
                engine.scanner().clone(),
                handle,
                Duration::from_millis(debounce_ms),
            )?;

            println!("Watching {} (Ctrl-C to stop)", engine.scanner().root().display());
            tokio::signal::ctrl_c().await?;
            watcher.stop().await?;
            worker.shutdown().await?;
            Ok(())
        }
        Commands::Config => Ok(()),
    }
}

fn print_results(results: &[SearchResult], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(results)?),
        OutputFormat::Summary => {
            println!("Found {} results:", results.len());
            for result in results {
                println!(
                    "  Score: {:.3} | {} | Lines: {}-{} | Source: {}{}",
                    result.score,
                    result.path,
                    result.start_line,
                    result.end_line,
                    result.source,
                    if result.provisional { " (provisional)" } else { "" }
                );
            }
        }
        OutputFormat::Full => {
            for result in results {
                println!("Score: {:.3}", result.score);
                println!("File: {}", result.path);
                println!("Lines: {}-{}", result.start_line, result.end_line);
                println!("Source: {}", result.source);
                println!("{}", result.snippet);
                println!("---");
            }
        }
    }
    Ok(())
}
