//! CRIMSON Server Binary
//!
//! Redis-wire-compatible cache node with WAL recovery, cluster routing,
//! and a WebSocket/REST front end.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crimson::server::{http, Config, Server};
use crimson::{ClusterManager, CommandHandler, ExpirationSweeper, Hub, Store, WalReader, WalWriter};

/// CRIMSON Server - Redis-Wire-Compatible Clustered Cache
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TCP port for the Redis line protocol
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// HTTP port for WebSocket and REST access
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Bind address for both listeners
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Address advertised to cluster peers
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Maximum number of keys held before LRU eviction
    #[arg(long, default_value_t = 1000)]
    max_keys: usize,

    /// Write-ahead log path
    #[arg(long, default_value = "crimson.wal")]
    wal: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crimson=info".parse()?))
        .init();

    let args = Args::parse();

    let config = Config::default()
        .with_bind(&args.bind)
        .with_host(&args.host)
        .with_port(args.port)
        .with_http_port(args.http_port)
        .with_max_keys(args.max_keys)
        .with_wal_path(&args.wal);

    let store = Store::with_max_size(config.max_keys);
    let cluster = Arc::new(Mutex::new(ClusterManager::new(&config.host, config.port)));
    let hub = Hub::spawn();

    let node_id = cluster.lock().unwrap().self_id().to_string();
    info!(
        node = %node_id,
        port = config.port,
        http_port = config.http_port,
        "starting cluster node"
    );

    let replay_journal = config.wal_path.exists();
    let wal = WalWriter::open(&config.wal_path)?;
    let handler = Arc::new(CommandHandler::new(store.clone(), cluster, wal, hub));

    // Replay the journal before accepting traffic
    if replay_journal {
        let mut reader = WalReader::open(&config.wal_path)?;
        let applied = handler.replay(&mut reader)?;
        info!(applied, "journal replayed");
    }

    ExpirationSweeper::spawn(store);

    let http_addr = format!("{}:{}", config.bind, config.http_port);
    let http_task = tokio::spawn(http::serve(http_addr, handler.clone()));
    let tcp_task = tokio::spawn(Server::new(config, handler).run());

    // Both listeners run until a fatal error; surface whichever fails first
    tokio::select! {
        res = tcp_task => res??,
        res = http_task => res??,
    }

    Ok(())
}
