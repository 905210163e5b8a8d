//! Image Cache CLI - interactive front end for the tiered image cache
//!
//! Requests every URL given on the command line, then reads commands from
//! stdin: a URL loads it, `clear` empties the cache, `stats` prints counters.
//! On exit the cache is shut down, which deletes its files.

mod commands;
mod error;

use crate::commands::{parse_line, render_event, validate_url, Command};
use crate::error::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tiered_image_cache::{CacheConfig, CacheEngine, CacheEvent, HttpFetcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "image-cache")]
#[command(about = "Fetch images through a memory + disk LRU cache", long_about = None)]
struct Args {
    /// Cache directory (overrides CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Memory tier capacity in entries (overrides MEMORY_CAPACITY)
    #[arg(long)]
    memory_capacity: Option<usize>,

    /// Disk tier capacity in entries (overrides DISK_CAPACITY)
    #[arg(long)]
    disk_capacity: Option<usize>,

    /// URLs to request before reading stdin
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("image_cache_cli=info".parse()?)
        .add_directive("tiered_image_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let args = Args::parse();
    let config = load_config(&args);
    info!("Cache dir: {:?}", config.cache_dir);
    info!(
        "Capacity: {} in memory, {} on disk",
        config.memory_capacity, config.disk_capacity
    );

    let timeout_secs = std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    let fetcher = HttpFetcher::with_timeout(Duration::from_secs(timeout_secs))?;

    let (event_tx, mut event_rx) = mpsc::channel::<CacheEvent>(64);
    let cache = CacheEngine::new(config, fetcher, event_tx).await?;

    let mut pending = 0usize;
    for url in &args.urls {
        match validate_url(url) {
            Ok(()) => {
                cache.request(url);
                pending += 1;
            }
            Err(msg) => println!("{}", msg),
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    while stdin_open || pending > 0 {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                match parse_line(&line) {
                    Command::Load(url) => {
                        cache.request(&url);
                        pending += 1;
                    }
                    Command::Clear => {
                        cache.clear().await;
                        println!("Cache cleared");
                    }
                    Command::Stats => {
                        let stats = cache.stats().await;
                        println!("{}", serde_json::to_string_pretty(&stats)?);
                    }
                    Command::Quit => stdin_open = false,
                    Command::Empty => {}
                    Command::Invalid(msg) => println!("{}", msg),
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else {
                    warn!("Event channel closed");
                    break;
                };
                pending = pending.saturating_sub(1);
                println!("{}", render_event(&event));
            }
        }
    }

    // Cached files do not outlive the session
    cache.shutdown().await;

    Ok(())
}

fn load_config(args: &Args) -> CacheConfig {
    let mut config = CacheConfig::from_env();
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(capacity) = args.memory_capacity {
        config.memory_capacity = capacity;
    }
    if let Some(capacity) = args.disk_capacity {
        config.disk_capacity = capacity;
    }
    config
}
