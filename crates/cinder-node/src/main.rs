//! cinder-node — the Cinder kernel node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the sled store
//!   2. Load the genesis declaration and materialize it if the store is fresh
//!   3. Spawn the mint loop and the work-aggregation loop
//!   4. Wait for ctrl-c, signal shutdown, and drain both loops

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use cinder_core::{Key, Snapshot};
use cinder_kernel::{read_genesis, KernelError, MintConfig, Node, NodeConfig, SnapshotSink};
use cinder_store::SledStore;

#[derive(Parser, Debug)]
#[command(
    name = "cinder-node",
    version,
    about = "Cinder kernel node — deterministic genesis and mint issuance"
)]
struct Args {
    /// Directory holding genesis.json and the node key.
    #[arg(long, default_value = "~/.cinder")]
    config_dir: PathBuf,

    /// Directory for the persistent store.
    #[arg(long, default_value = "~/.cinder/data")]
    data_dir: PathBuf,

    /// Network name; "mainnet" enables the historical fork behaviors.
    #[arg(long, default_value = "mainnet")]
    network: String,

    /// Mint loop period in seconds.
    #[arg(long, default_value_t = 60)]
    operation_period: u64,

    /// First hour of day in which a mint may be proposed.
    #[arg(long, default_value_t = 6)]
    mint_time_begin: u64,

    /// Last such hour, inclusive.
    #[arg(long, default_value_t = 18)]
    mint_time_end: u64,
}

/// Hands proposed snapshots to the consensus layer's intake queue.
struct ChannelSink {
    queue: mpsc::UnboundedSender<Snapshot>,
}

impl SnapshotSink for ChannelSink {
    fn append_self_empty(&self, snapshot: Snapshot) -> Result<(), KernelError> {
        self.queue
            .send(snapshot)
            .map_err(|e| KernelError::NotReady(format!("snapshot queue closed: {e}")))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cinder=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("cinder node starting");

    let config_dir = expand_tilde(&args.config_dir);
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let store = Arc::new(SledStore::open(&data_dir).context("opening store")?);

    let gns = read_genesis(&config_dir).context("reading genesis")?;
    let signer_key = load_signer_key(&config_dir).context("loading node key")?;

    let config = NodeConfig {
        network: args.network.clone(),
        kernel_operation_period: args.operation_period,
        kernel_mint_time_begin: args.mint_time_begin,
        kernel_mint_time_end: args.mint_time_end,
    };

    let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink { queue: snapshot_tx });

    let node = Arc::new(
        Node::setup(
            store,
            sink,
            config,
            MintConfig::default(),
            signer_key,
            &gns,
        )
        .context("node setup")?,
    );
    info!(
        network = %node.network_id,
        node = %node.id_for_network,
        "node initialised"
    );

    // Standalone mode: the graph timestamp normally comes from consensus;
    // here the wall clock stands in for it.
    let clock_node = Arc::clone(&node);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut clock_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        loop {
            let now = chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default() as u64;
            clock_node.set_graph_timestamp(now);
            tokio::select! {
                _ = clock_shutdown.changed() => break,
                _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
            }
        }
    });

    // Consensus handoff point: snapshots queued by the kernel would be
    // proposed into the DAG here.
    tokio::spawn(async move {
        while let Some(snapshot) = snapshot_rx.recv().await {
            info!(
                node = %snapshot.node_id,
                tx = %snapshot.transaction,
                "snapshot queued for consensus"
            );
        }
    });

    let mint_handle = tokio::spawn(Arc::clone(&node).mint_loop(shutdown_rx.clone()));
    let aggregate_handle = tokio::spawn(Arc::clone(&node).aggregate_mint_work(shutdown_rx));

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);

    mint_handle.await.context("joining mint loop")?;
    match aggregate_handle.await.context("joining aggregation loop")? {
        Ok(()) => {}
        Err(err) => warn!(%err, "aggregation loop ended with error"),
    }
    Ok(())
}

/// The node key file holds the hex of a 64-byte seed; the private spend
/// key is its wide reduction.
fn load_signer_key(config_dir: &Path) -> anyhow::Result<Key> {
    let path = config_dir.join("node.key");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let bytes = hex::decode(text.trim()).context("decoding node key hex")?;
    let seed: [u8; 64] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("node key must be 64 bytes of hex"))?;
    Ok(Key::from_seed(&seed))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
