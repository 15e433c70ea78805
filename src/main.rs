//! Disk Memo - maintenance CLI
//!
//! Inspects and maintains a disk-backed memoization cache.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use disk_memo::cache::{select_victims, EntryMeta};
use disk_memo::models::{ClearReport, EntryReport, EvictReport, StatsReport, SweepReport};
use disk_memo::{spawn_maintenance_task, Args, CacheConfig, MemoCache, Value};

#[derive(Debug, Parser)]
#[command(
    name = "disk-memo",
    version,
    about = "Inspect and maintain a disk-backed memoization cache"
)]
struct Cli {
    /// Storage root (overrides MEMO_CACHE_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Maximum number of entries (overrides MEMO_CACHE_CAPACITY)
    #[arg(long, global = true)]
    capacity: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show entry count, size and access range
    Stats,
    /// List entries, least recently used first
    List {
        /// Show at most this many entries
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Evict least recently used entries down to capacity
    Evict {
        /// Only report what would be evicted
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove every entry
    Clear,
    /// Remove temp files left behind by crashed writers
    Sweep {
        /// Minimum age in seconds (defaults to MEMO_TEMP_MAX_AGE)
        #[arg(long)]
        max_age: Option<u64>,
    },
    /// Run the slow-request example against the cache
    Demo {
        /// Simulated latency of each uncached call, in seconds
        #[arg(long, default_value_t = 2)]
        delay_secs: u64,
    },
    /// Run periodic maintenance until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "disk_memo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env();
    if let Some(dir) = cli.dir {
        config.storage_root = dir;
    }
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    info!(
        "Configuration loaded: storage_root={}, capacity={}, sweep_interval={}s",
        config.storage_root.display(),
        config.capacity,
        config.sweep_interval
    );

    let cache = MemoCache::open(&config).context("Failed to open cache")?;

    match cli.command {
        Command::Stats => {
            let entries = cache.store().list_entries()?;
            print_json(&StatsReport::new(
                config.storage_root.display().to_string(),
                config.capacity,
                &entries,
                cache.stats(),
            ))?;
        }
        Command::List { limit } => {
            let mut entries = cache.store().list_entries()?;
            entries.sort_by(EntryMeta::recency_cmp);
            let reports: Vec<EntryReport> = entries
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(EntryReport::from)
                .collect();
            print_json(&reports)?;
        }
        Command::Evict { dry_run } => {
            let report = if dry_run {
                let entries = cache.store().list_entries()?;
                let total = entries.len();
                let victims = select_victims(entries, config.capacity);
                EvictReport::planned(config.capacity, total, &victims)
            } else {
                EvictReport::applied(config.capacity, cache.enforce())
            };
            print_json(&report)?;
        }
        Command::Clear => {
            let removed = cache.store().clear()?;
            print_json(&ClearReport { removed })?;
        }
        Command::Sweep { max_age } => {
            let max_age_secs = max_age.unwrap_or(config.temp_max_age);
            let removed = cache
                .store()
                .sweep_temp_files(Duration::from_secs(max_age_secs))?;
            print_json(&SweepReport {
                removed,
                max_age_secs,
            })?;
        }
        Command::Demo { delay_secs } => {
            tokio::task::spawn_blocking(move || run_demo(&cache, delay_secs))
                .await
                .context("Demo task failed")??;
        }
        Command::Watch => {
            let handle = spawn_maintenance_task(
                cache.clone(),
                config.sweep_interval,
                config.temp_max_age(),
            );
            info!("Maintenance task started");
            shutdown_signal(handle).await;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The slow-request walkthrough: cold calls, warm calls, then eviction.
fn run_demo(cache: &MemoCache, delay_secs: u64) -> Result<()> {
    let slow_req = cache.memoize_named("slow_req", move |args: &Args| -> Result<serde_json::Value> {
        let (user_id, endpoint) = match (args.get(0), args.get(1)) {
            (Some(Value::Int(user)), Some(Value::Str(endpoint))) => (*user, endpoint.clone()),
            _ => anyhow::bail!("expected (user_id: int, endpoint: str)"),
        };
        info!("Performing slow operation for user '{}' at '{}'...", user_id, endpoint);
        std::thread::sleep(Duration::from_secs(delay_secs));
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Ok(serde_json::json!({
            "user_id": user_id,
            "data": format!("some data from {}", endpoint),
            "timestamp": timestamp,
        }))
    });
    let req = |user: i64, endpoint: &str| -> Result<serde_json::Value> {
        slow_req.call(&Args::new().arg(user).arg(endpoint))
    };

    println!("--- First Run ---");
    println!("Result 1: {}", req(100, "profile")?);
    println!("Result 2: {}", req(200, "feed")?);
    println!("Result 3: {}", req(100, "settings")?);

    println!("\n--- Second Run (should be fast) ---");
    println!("Result 1 (cached): {}", req(100, "profile")?);
    println!("Result 2 (cached): {}", req(200, "feed")?);

    println!("\n--- Testing Cache Eviction ---");
    println!("Result 4: {}", req(300, "a")?);
    println!("Result 5: {}", req(400, "b")?);
    println!("Result 6: {}", req(500, "c")?);

    let stats = cache.stats();
    println!(
        "\nCache directory '{}' now contains {} entries (hits={}, misses={}, evictions={}).",
        cache.store().root().display(),
        stats.total_entries,
        stats.hits,
        stats.misses,
        stats.evictions
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the maintenance task.
async fn shutdown_signal(maintenance_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    maintenance_handle.abort();
    warn!("Maintenance task aborted");
}
