//! Memoria - Two-tier associative memory for conversational agents
//!
//! Command-line front end for running reflection over a graph snapshot and
//! inspecting configuration.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use memoria::{
    config::MemoryConfig,
    graph::MemoryGraphStore,
    lock::{LockStore, MemoryLockStore},
    reflection::{PathEvaluator, ReflectionEngine, TranscriptEntry},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memoria")]
#[command(version)]
#[command(about = "Two-tier associative memory for conversational agents")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMORIA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run reflection cycles over a graph snapshot
    Reflect {
        /// Graph snapshot (JSON); created if missing
        #[arg(short, long)]
        graph: PathBuf,

        /// Conversation transcripts, one JSON entry per line
        #[arg(short, long)]
        transcripts: Option<PathBuf>,

        /// Number of cycles to run
        #[arg(long, default_value = "1")]
        cycles: u32,
    },

    /// List proactive alerts due at a given time
    Alerts {
        /// Graph snapshot (JSON)
        #[arg(short, long)]
        graph: PathBuf,

        /// RFC 3339 timestamp (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Report orphan nodes and dangling edges
    Integrity {
        /// Graph snapshot (JSON)
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Run diagnostics
    Doctor,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("memoria={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => MemoryConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let path = MemoryConfig::default_path();
            if path.exists() {
                MemoryConfig::load(&path)?
            } else {
                MemoryConfig::default()
            }
        }
    };

    match cli.command {
        Commands::Reflect {
            graph,
            transcripts,
            cycles,
        } => run_reflect(&config, &graph, transcripts.as_deref(), cycles, cli.json).await?,
        Commands::Alerts { graph, at } => run_alerts(&config, &graph, at, cli.json).await?,
        Commands::Integrity { graph } => run_integrity(&config, &graph, cli.json).await?,
        Commands::Doctor => run_doctor(&config, cli.config.as_deref()).await?,
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn load_graph(path: &Path) -> Result<Arc<MemoryGraphStore>> {
    if path.exists() {
        let graph = MemoryGraphStore::load(path)
            .await
            .with_context(|| format!("loading graph {}", path.display()))?;
        Ok(Arc::new(graph))
    } else {
        tracing::info!(path = %path.display(), "No graph snapshot, starting empty");
        Ok(Arc::new(MemoryGraphStore::new()))
    }
}

async fn lock_store(config: &MemoryConfig, transcripts: Option<&Path>) -> Result<Arc<dyn LockStore>> {
    #[cfg(feature = "redis-store")]
    if let Some(url) = &config.redis_url {
        if transcripts.is_some() {
            tracing::warn!("Ignoring --transcripts; reading transcripts from Redis");
        }
        let store = memoria::lock::RedisLockStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    #[cfg(not(feature = "redis-store"))]
    if config.redis_url.is_some() {
        tracing::warn!("redis_url set but built without the redis-store feature");
    }

    let store = MemoryLockStore::new();
    if let Some(path) = transcripts {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading transcripts {}", path.display()))?;
        let mut loaded = 0usize;
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: TranscriptEntry = serde_json::from_str(line)
                .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
            store.push_list(&entry.key(), line.to_string()).await;
            loaded += 1;
        }
        tracing::info!(entries = loaded, "Loaded transcripts");
    }
    Ok(Arc::new(store))
}

fn engine(
    config: &MemoryConfig,
    graph: Arc<MemoryGraphStore>,
    store: Arc<dyn LockStore>,
) -> ReflectionEngine {
    ReflectionEngine::new(
        graph,
        store,
        Arc::new(PathEvaluator),
        config.reflection.clone(),
        config.locks.clone(),
    )
}

fn print<T: Serialize + std::fmt::Debug>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{:#?}", value);
    }
    Ok(())
}

async fn run_reflect(
    config: &MemoryConfig,
    graph_path: &Path,
    transcripts: Option<&Path>,
    cycles: u32,
    json: bool,
) -> Result<()> {
    let graph = load_graph(graph_path).await?;
    let store = lock_store(config, transcripts).await?;
    let engine = engine(config, graph.clone(), store);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling reflection");
            on_signal.cancel();
        }
    });

    for cycle in 1..=cycles {
        if let Err(e) = engine.run_cycle(&cancel).await {
            tracing::warn!(cycle, error = %e, "Cycle finished with errors");
            if cancel.is_cancelled() {
                break;
            }
        }
        if let Some(report) = engine.last_report().await {
            print(&report, json)?;
        }
    }

    graph
        .save(graph_path)
        .await
        .with_context(|| format!("saving graph {}", graph_path.display()))?;
    tracing::info!(
        nodes = graph.node_count().await,
        edges = graph.edge_count().await,
        "Graph snapshot saved"
    );
    print(&engine.stats().await, json)
}

async fn run_alerts(
    config: &MemoryConfig,
    graph_path: &Path,
    at: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let graph = load_graph(graph_path).await?;
    let engine = engine(config, graph, Arc::new(MemoryLockStore::new()));
    let alerts = engine
        .check_scheduled_patterns(at.unwrap_or_else(Utc::now))
        .await?;
    if alerts.is_empty() && !json {
        println!("No alerts due");
        return Ok(());
    }
    print(&alerts, json)
}

async fn run_integrity(config: &MemoryConfig, graph_path: &Path, json: bool) -> Result<()> {
    let graph = load_graph(graph_path).await?;
    let engine = engine(config, graph, Arc::new(MemoryLockStore::new()));
    let report = engine.validate_graph_integrity().await?;
    if report.is_clean() && !json {
        println!("Graph is clean");
        return Ok(());
    }
    print(&report, json)
}

async fn run_doctor(config: &MemoryConfig, explicit: Option<&Path>) -> Result<()> {
    println!("Memoria Doctor");
    println!();

    println!("Checking configuration...");
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(MemoryConfig::default_path);
    if path.exists() {
        println!("  ✓ Configuration file found: {}", path.display());
    } else {
        println!("  ℹ No configuration file found (using defaults)");
    }
    match config.validate() {
        Ok(()) => println!("  ✓ Configuration is valid"),
        Err(e) => println!("  ✗ {}", e),
    }

    println!();
    println!("Checking embedding service...");
    match &config.embedding {
        Some(embedding) => println!("  ✓ {} at {}", embedding.model, embedding.base_url),
        None => println!("  ℹ Not configured (hot cache stores turns without embeddings)"),
    }

    println!();
    println!("Checking lock store...");
    match &config.redis_url {
        #[cfg(feature = "redis-store")]
        Some(url) => match memoria::lock::RedisLockStore::connect(url).await {
            Ok(_) => println!("  ✓ Redis reachable"),
            Err(e) => println!("  ✗ {}", e),
        },
        #[cfg(not(feature = "redis-store"))]
        Some(_) => println!("  ✗ redis_url set but built without the redis-store feature"),
        None => println!("  ℹ Using the in-process store"),
    }

    println!();
    println!("Doctor check complete!");
    Ok(())
}

fn show_config(config: Option<&MemoryConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
