//! `rondod` — the rondo daemon.
//!
//! Runs one DHT node, or talks to a running one:
//!
//! ```text
//! rondod start                               # new ring of one
//! rondod start -c rondo.toml                 # with a config file
//! rondod start -l 127.0.0.1:4821 -j 127.0.0.1:4820   # join a ring
//! rondod save --node 127.0.0.1:4820 greeting hello
//! rondod get --node 127.0.0.1:4820 greeting
//! rondod status --node 127.0.0.1:4820
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rondo_net::{Dialer, FaultKind};
use rondo_node::{Node, NodeConfig, NoopObserver, SqliteObserver, TopologyObserver};
use rondo_types::{finger_offset, KeyValue};
use tracing::info;

use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "rondod", version, about = "rondo distributed hash table daemon")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node until interrupted, then leave the ring gracefully.
    Start {
        /// Address to listen on.
        #[arg(short, long)]
        listen: Option<String>,
        /// Peer to join; omit to create a new ring.
        #[arg(short, long)]
        join: Option<String>,
        /// Sqlite file recording (node, successor) topology rows.
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Store a key/value pair through a running node.
    Save {
        /// Address of any ring member.
        #[arg(long)]
        node: String,
        key: String,
        value: String,
    },
    /// Fetch a value through a running node.
    Get {
        /// Address of any ring member.
        #[arg(long)]
        node: String,
        key: String,
    },
    /// Show a node's view of the ring.
    Status {
        /// Address of the node to inspect.
        #[arg(long)]
        node: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = config::load(cli.config.as_deref())?;
    telemetry::init(&file.log.level);

    match cli.command {
        Commands::Start { listen, join, db } => start(file, listen, join, db).await,
        Commands::Save { node, key, value } => save(&node, key, value.into_bytes()).await,
        Commands::Get { node, key } => get(&node, key).await,
        Commands::Status { node } => status(&node).await,
    }
}

async fn start(
    file: DaemonConfig,
    listen: Option<String>,
    join: Option<String>,
    db: Option<PathBuf>,
) -> Result<()> {
    let listen_addr = listen.unwrap_or(file.node.listen_addr);
    let join_addr = join.or(file.node.join_addr);
    let db_path = db.or(file.node.db_path);

    let observer: Arc<dyn TopologyObserver> = match &db_path {
        Some(path) => Arc::new(
            SqliteObserver::open(path)
                .with_context(|| format!("opening topology db {}", path.display()))?,
        ),
        None => Arc::new(NoopObserver),
    };

    let node_config = NodeConfig {
        listen_addr,
        advertise_addr: file.node.advertise_addr,
        join_addr,
        ..NodeConfig::default()
    };
    let handle = Node::start(node_config, observer).await?;
    println!("node {} listening on {}", handle.id().short(), handle.addr());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    info!("interrupt received, leaving the ring");
    handle.stop().await;
    Ok(())
}

async fn save(node: &str, key: String, value: Vec<u8>) -> Result<()> {
    let dialer = Dialer::new();
    let peer = dialer.peer(node).await?;
    let stored_on = peer.save(KeyValue { key, value }).await?;
    println!("stored on {stored_on}");
    Ok(())
}

async fn get(node: &str, key: String) -> Result<()> {
    let dialer = Dialer::new();
    let peer = dialer.peer(node).await?;
    let value = peer.retrieve(key).await?;
    println!("{}", String::from_utf8_lossy(&value));
    Ok(())
}

async fn status(node: &str) -> Result<()> {
    let dialer = Dialer::new();
    let peer = dialer.peer(node).await?;

    let id = peer.get_id().await?;
    // The successor of (id + 1) is the node's own successor, so the
    // public surface answers without a dedicated method.
    let successor = peer.successor(finger_offset(id, 0)).await?;
    let predecessor = match peer.get_predecessor().await {
        Ok(addr) => addr,
        Err(e) if e.fault_kind() == Some(FaultKind::NilPredecessor) => "(none)".to_string(),
        Err(e) => return Err(e.into()),
    };

    println!("node         {node}");
    println!("id           {id}");
    println!("successor    {successor}");
    println!("predecessor  {predecessor}");
    Ok(())
}
