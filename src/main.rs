use async_trait::async_trait;
use bond_core::{Chain, GenesisConfig, GenesisMetadata, InitialAllocation, NetworkParams};
use clap::{Args, Parser, Subcommand};
use mesh::sync::{SyncConfig, SyncMachine};
use mesh::{classify_frame, Classified, DutyCycleManager, FloodCache, MeshPayload, MeshProtocol, Reassembler, ReassemblyConfig};
use persistence::{BatchOp, KeyValue, MemoryStore, SledStore, Store, Sublevel};
use rand::RngCore;
use shared::crypto::{KeyPair, SignatureAlgorithm};
use shared::types::{NetworkType, Region};
use std::time::Duration;
use tracing::{info, warn, Level};

mod network;
use network::{start_network, MeshNetworkConfig};

#[derive(Parser)]
#[command(name = "lora-utxo-node")]
#[command(about = "UTXO blockchain node for hybrid LoRa-mesh / internet topologies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node: internet gossip transport, mesh protocol, and periodic status output.
    Start(StartArgs),
    /// Print node identity and configuration without starting the network.
    Status(StartArgs),
    /// Print version information.
    Version,
}

#[derive(Args, Clone)]
struct StartArgs {
    /// Port to listen on (0 for random).
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Bootstrap peer multiaddrs to dial at startup.
    #[arg(short, long)]
    bootstrap: Vec<String>,

    /// Radio regulatory region governing duty-cycle admission control.
    #[arg(long, value_enum, default_value = "eu")]
    region: RegionArg,

    /// Directory for persistent storage. Omit to run with an in-memory store.
    #[arg(long)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RegionArg {
    Eu,
    Us,
    Ca,
    Mx,
    Au,
    Nz,
    Jp,
    In,
    Cn,
    Kr,
    Br,
    Ar,
    Ru,
    Za,
    Custom,
}

impl From<RegionArg> for Region {
    fn from(arg: RegionArg) -> Self {
        match arg {
            RegionArg::Eu => Self::Eu,
            RegionArg::Us => Self::Us,
            RegionArg::Ca => Self::Ca,
            RegionArg::Mx => Self::Mx,
            RegionArg::Au => Self::Au,
            RegionArg::Nz => Self::Nz,
            RegionArg::Jp => Self::Jp,
            RegionArg::In => Self::In,
            RegionArg::Cn => Self::Cn,
            RegionArg::Kr => Self::Kr,
            RegionArg::Br => Self::Br,
            RegionArg::Ar => Self::Ar,
            RegionArg::Ru => Self::Ru,
            RegionArg::Za => Self::Za,
            RegionArg::Custom => Self::Custom,
        }
    }
}

#[tokio::main]
async fn main() -> shared::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Start(args)) => run_node(args).await,
        Some(Commands::Status(args)) => show_status(args).await,
        Some(Commands::Version) | None => {
            show_version();
            Ok(())
        }
    }
}

fn init_logging(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Either storage backend, behind the one `Store` impl the rest of the
/// node programs against. A trait object would hide `get_typed`/
/// `put_typed` (they require `Self: Sized`), which `bond-core`'s and
/// `mesh`'s persistence paths depend on, so callers need a concrete,
/// `Sized` type rather than `dyn Store`.
enum AnyStore {
    Sled(SledStore),
    Memory(MemoryStore),
}

#[async_trait]
impl Store for AnyStore {
    async fn get(&self, sublevel: Sublevel, key: &str) -> shared::Result<Option<Vec<u8>>> {
        match self {
            Self::Sled(s) => s.get(sublevel, key).await,
            Self::Memory(s) => s.get(sublevel, key).await,
        }
    }

    async fn put(&self, sublevel: Sublevel, key: &str, value: Vec<u8>) -> shared::Result<()> {
        match self {
            Self::Sled(s) => s.put(sublevel, key, value).await,
            Self::Memory(s) => s.put(sublevel, key, value).await,
        }
    }

    async fn del(&self, sublevel: Sublevel, key: &str) -> shared::Result<()> {
        match self {
            Self::Sled(s) => s.del(sublevel, key).await,
            Self::Memory(s) => s.del(sublevel, key).await,
        }
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> shared::Result<()> {
        match self {
            Self::Sled(s) => s.batch(ops).await,
            Self::Memory(s) => s.batch(ops).await,
        }
    }

    async fn iterate(&self, sublevel: Sublevel, start: Option<&str>, end: Option<&str>, limit: usize, reverse: bool) -> shared::Result<Vec<KeyValue>> {
        match self {
            Self::Sled(s) => s.iterate(sublevel, start, end, limit, reverse).await,
            Self::Memory(s) => s.iterate(sublevel, start, end, limit, reverse).await,
        }
    }
}

/// Opens the configured store, or falls back to an in-memory one.
fn open_store(data_dir: &Option<String>) -> shared::Result<AnyStore> {
    match data_dir {
        Some(dir) => Ok(AnyStore::Sled(SledStore::open(dir)?)),
        None => Ok(AnyStore::Memory(MemoryStore::new())),
    }
}

/// The node's identity is a 16-byte random hex string, generated once
/// and persisted under `Sublevel::Metadata` so it survives restarts.
async fn load_or_generate_node_id<S: Store>(store: &S) -> shared::Result<String> {
    if let Some(bytes) = store.get(Sublevel::Metadata, "node_id").await? {
        return Ok(String::from_utf8_lossy(&bytes).to_string());
    }
    let mut raw = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    let node_id = hex::encode(raw);
    store.put(Sublevel::Metadata, "node_id", node_id.as_bytes().to_vec()).await?;
    Ok(node_id)
}

fn devnet_genesis() -> GenesisConfig {
    GenesisConfig {
        chain_id: "lora-utxo-devnet-v1".to_string(),
        network_name: "lora-utxo-devnet".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        total_supply: 21_000_000,
        initial_allocations: vec![InitialAllocation { address: "lora1genesisallocation00000000000".to_string(), amount: 1_000_000 }],
        network_params: NetworkParams {
            initial_difficulty: 1,
            target_block_time_secs: 600,
            adjustment_period: 10,
            max_difficulty_ratio: 4.0,
            max_block_size: 4 * 1024 * 1024,
            mining_reward: 5000,
            halving_interval: 210_000,
        },
        metadata: GenesisMetadata {
            timestamp: 1_700_000_000_000,
            description: "devnet genesis for local testing".to_string(),
            creator: "node-dev-team".to_string(),
            network_type: NetworkType::Devnet,
        },
    }
}

async fn run_node(args: &StartArgs) -> shared::Result<()> {
    init_logging(&args.log_level);

    let store = open_store(&args.data_dir)?;
    let node_id = load_or_generate_node_id(&store).await?;
    let region: Region = args.region.into();
    info!(%node_id, ?region, "starting node");

    let chain = Chain::load_or_init(&store, devnet_genesis(), chrono::Utc::now().timestamp_millis()).await?;
    info!(height = chain.height(), "chain loaded");

    let mut sync_machine = SyncMachine::new(SyncConfig::default());
    if sync_machine.load_and_resume(&store).await? {
        info!(state = ?sync_machine.state(), "resumed sync from persisted checkpoint");
    }

    let keypair = KeyPair::generate(SignatureAlgorithm::Ed25519)?;

    let network_config = MeshNetworkConfig { listen_port: args.port, bootstrap_peers: args.bootstrap.clone(), ..MeshNetworkConfig::default() };
    let (transport, peer_id, mut inbound) = start_network(network_config).await?;
    info!(%peer_id, "libp2p transport ready");

    let mut protocol = MeshProtocol::new(node_id.clone(), transport);
    let mut duty_cycle = DutyCycleManager::new(region, Duration::from_secs(3600), false);
    let mut flood_cache = FloodCache::new(Duration::from_secs(120));
    let mut reassembler = Reassembler::new(ReassemblyConfig::default());

    let mut status_interval = tokio::time::interval(Duration::from_secs(30));
    let mut heartbeat_interval = tokio::time::interval(mesh::protocol::HEARTBEAT_INTERVAL);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    info!("node running, press Ctrl+C to stop");
    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(frame) = frame else {
                    warn!("network task ended, shutting down");
                    break;
                };
                handle_inbound_frame(&frame.from_peer, &frame.bytes, &mut protocol, &mut flood_cache, &mut reassembler);
            }
            _ = heartbeat_interval.tick() => {
                let payload = MeshPayload::Heartbeat { node_id: node_id.clone(), height: chain.height(), supports_fragmentation: true };
                if let Err(e) = protocol.send_message("broadcast", payload, &keypair, false).await {
                    warn!(error = %e, "failed to broadcast heartbeat");
                }
            }
            _ = ticker.tick() => {
                duty_cycle.advance(Duration::from_secs(1));
            }
            _ = status_interval.tick() => {
                let stats = chain.stats();
                let dc_stats = duty_cycle.stats();
                info!(
                    height = stats.height,
                    difficulty = stats.current_difficulty,
                    utxos = stats.utxo_count,
                    peers = protocol.neighbors().len(),
                    duty_cycle = dc_stats.current_duty_cycle,
                    "status",
                );
                if let Err(e) = sync_machine.persist_checkpoint(&store).await {
                    warn!(error = %e, "failed to persist sync checkpoint");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn handle_inbound_frame(
    from_peer: &str,
    bytes: &[u8],
    protocol: &mut MeshProtocol<network::GossipTransport>,
    flood_cache: &mut FloodCache,
    reassembler: &mut Reassembler,
) {
    match classify_frame(bytes) {
        Ok(Classified::Complete(envelope)) => {
            dispatch_envelope(from_peer, &envelope, protocol, flood_cache);
        }
        Ok(Classified::Fragment(fragment)) => match reassembler.add_fragment(fragment) {
            mesh::FragmentOutcome::MessageComplete(payload) => match classify_frame(&payload) {
                Ok(Classified::Complete(envelope)) => dispatch_envelope(from_peer, &envelope, protocol, flood_cache),
                Ok(Classified::Fragment(_)) => warn!("reassembled payload is itself a fragment, dropping"),
                Err(e) => warn!(error = %e, "reassembled payload is not a valid envelope"),
            },
            mesh::FragmentOutcome::InvalidFragment(reason) => warn!(reason, "invalid fragment"),
            mesh::FragmentOutcome::FragmentAdded | mesh::FragmentOutcome::DuplicateFragment => {}
        },
        Err(e) => warn!(%from_peer, error = %e, "failed to classify inbound frame"),
    }
}

fn dispatch_envelope(from_peer: &str, envelope: &mesh::Envelope, protocol: &mut MeshProtocol<network::GossipTransport>, flood_cache: &mut FloodCache) {
    if !flood_cache.observe(&envelope.origin, envelope.sequence) {
        return;
    }
    match &envelope.payload {
        MeshPayload::Heartbeat { node_id, height, .. } => {
            protocol.record_heartbeat(node_id.clone(), chrono::Utc::now().timestamp(), 1.0, 1);
            info!(%node_id, height, "heartbeat received");
        }
        MeshPayload::Transaction(tx) => info!(%from_peer, txid = %tx.id, "transaction received"),
        MeshPayload::Block(block) => info!(%from_peer, height = block.index, "block received"),
        MeshPayload::MerkleProof(compressed) => match bond_core::merkle::decompress(compressed) {
            Ok(proof) => info!(%from_peer, txid = %proof.transaction_id, steps = proof.proof.len(), "merkle proof received"),
            Err(e) => warn!(%from_peer, error = %e, "failed to decompress merkle proof"),
        },
        MeshPayload::BlockRequest { from_height, to_height } => info!(%from_peer, from_height, to_height, "block request received"),
        MeshPayload::SyncRequest { height } => info!(%from_peer, height, "sync request received"),
        MeshPayload::PeerListRequest => info!(%from_peer, "peer list request received"),
        MeshPayload::PeerListResponse { peers } => info!(%from_peer, count = peers.len(), "peer list response received"),
    }
}

async fn show_status(args: &StartArgs) -> shared::Result<()> {
    let store = open_store(&args.data_dir)?;
    let node_id = load_or_generate_node_id(&store).await?;
    let region: Region = args.region.into();
    let chain = Chain::load_or_init(&store, devnet_genesis(), chrono::Utc::now().timestamp_millis()).await?;
    let stats = chain.stats();

    println!("node id:    {node_id}");
    println!("region:     {region:?}");
    println!("height:     {}", stats.height);
    println!("difficulty: {}", stats.current_difficulty);
    println!("utxos:      {}", stats.utxo_count);
    Ok(())
}

fn show_version() {
    println!("lora-utxo-node {}", env!("CARGO_PKG_VERSION"));
}
