//! Internet-side mesh transport: a libp2p gossipsub swarm that
//! implements [`mesh::MeshTransport`], generalized from the teacher's
//! internet-only `P2PNode` into one of the two transports the mesh
//! protocol can be driven over (the other being an actual radio link).
//!
//! Gossipsub has no per-peer unicast primitive, so `send_frame`'s
//! `neighbor` argument is informational only here: every frame is
//! broadcast on the single mesh topic, the same way a LoRa radio
//! broadcasts to everyone in range regardless of the intended
//! recipient. Loop prevention and addressing live in the envelope,
//! one layer up, not in the transport.

use async_trait::async_trait;
use futures::StreamExt as _;
use libp2p::{
    gossipsub, identity, mdns, noise,
    swarm::{NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, SwarmBuilder,
};
use mesh::MeshTransport;
use shared::{BlockchainError, Result as BlockchainResult};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MeshNetworkConfig {
    pub listen_port: u16,
    pub bootstrap_peers: Vec<String>,
    pub network_id: String,
    pub enable_mdns: bool,
}

impl Default for MeshNetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            bootstrap_peers: vec![],
            network_id: "lora-utxo-devnet".to_string(),
            enable_mdns: true,
        }
    }
}

#[derive(NetworkBehaviour)]
struct MeshBehaviour {
    gossipsub: gossipsub::Behaviour,
    mdns: mdns::tokio::Behaviour,
}

/// A frame received from the swarm, tagged with the peer it arrived
/// from (best-effort; gossipsub only reports the immediate relay, not
/// necessarily the envelope's logical origin).
pub struct InboundFrame {
    pub from_peer: String,
    pub bytes: Vec<u8>,
}

/// The outbound half of the transport: a channel into the task that
/// owns the swarm. Cheap to clone; every clone publishes onto the same
/// topic through the same swarm.
#[derive(Clone)]
pub struct GossipTransport {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl MeshTransport for GossipTransport {
    async fn send_frame(&self, _neighbor: &str, frame: Vec<u8>) -> BlockchainResult<()> {
        self.outbound
            .send(frame)
            .map_err(|e| BlockchainError::NetworkError(format!("swarm task gone: {e}")))
    }
}

/// Builds the libp2p swarm, subscribes it to the mesh topic, and
/// spawns the task that drives it. Returns a [`GossipTransport`] for
/// sending and a receiver for frames arriving from the network.
///
/// # Errors
///
/// Returns `NetworkError` if the transport fails to build, the mesh
/// topic fails to subscribe, or a configured bootstrap address fails
/// to parse.
pub async fn start_network(config: MeshNetworkConfig) -> BlockchainResult<(GossipTransport, PeerId, mpsc::UnboundedReceiver<InboundFrame>)> {
    let keypair = identity::Keypair::generate_ed25519();
    let local_peer_id = PeerId::from(keypair.public());
    info!(peer_id = %local_peer_id, "generated libp2p identity");

    let topic = gossipsub::IdentTopic::new(format!("{}/mesh-frames", config.network_id));

    let mut swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)
        .map_err(|e| BlockchainError::NetworkError(e.to_string()))?
        .with_behaviour(|key| {
            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(10))
                .validation_mode(gossipsub::ValidationMode::Strict)
                .build()
                .map_err(|e| e.to_string())?;
            let gossipsub = gossipsub::Behaviour::new(
                gossipsub::MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )?;
            let mdns = mdns::tokio::Behaviour::new(mdns::Config::default(), key.public().to_peer_id())?;
            Ok(MeshBehaviour { gossipsub, mdns })
        })
        .map_err(|e| BlockchainError::NetworkError(e.to_string()))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    swarm
        .behaviour_mut()
        .gossipsub
        .subscribe(&topic)
        .map_err(|e| BlockchainError::NetworkError(e.to_string()))?;

    let listen_addr: Multiaddr = format!("/ip4/0.0.0.0/tcp/{}", config.listen_port)
        .parse()
        .map_err(|e| BlockchainError::NetworkError(format!("invalid listen address: {e}")))?;
    swarm.listen_on(listen_addr).map_err(|e| BlockchainError::NetworkError(e.to_string()))?;

    for addr in &config.bootstrap_peers {
        let addr: Multiaddr = addr
            .parse()
            .map_err(|e| BlockchainError::NetworkError(format!("invalid bootstrap address {addr}: {e}")))?;
        if let Err(e) = swarm.dial(addr.clone()) {
            warn!(%addr, error = %e, "failed to dial bootstrap peer");
        }
    }

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundFrame>();

    tokio::spawn(run_swarm(swarm, topic, outbound_rx, inbound_tx));

    Ok((GossipTransport { outbound: outbound_tx }, local_peer_id, inbound_rx))
}

async fn run_swarm(
    mut swarm: libp2p::Swarm<MeshBehaviour>,
    topic: gossipsub::IdentTopic,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
) {
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                match frame {
                    Some(bytes) => {
                        if let Err(e) = swarm.behaviour_mut().gossipsub.publish(topic.clone(), bytes) {
                            warn!(error = %e, "failed to publish mesh frame");
                        }
                    }
                    None => {
                        debug!("outbound channel closed, stopping swarm task");
                        return;
                    }
                }
            }
            event = swarm.select_next_some() => {
                handle_swarm_event(&mut swarm, event, &inbound_tx);
            }
        }
    }
}

fn handle_swarm_event(
    swarm: &mut libp2p::Swarm<MeshBehaviour>,
    event: SwarmEvent<MeshBehaviourEvent>,
    inbound_tx: &mpsc::UnboundedSender<InboundFrame>,
) {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => info!(%address, "listening"),
        SwarmEvent::Behaviour(MeshBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
            for (peer_id, _addr) in peers {
                debug!(%peer_id, "mdns discovered peer");
                swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
            }
        }
        SwarmEvent::Behaviour(MeshBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
            for (peer_id, _addr) in peers {
                debug!(%peer_id, "mdns peer expired");
                swarm.behaviour_mut().gossipsub.remove_explicit_peer(&peer_id);
            }
        }
        SwarmEvent::Behaviour(MeshBehaviourEvent::Gossipsub(gossipsub::Event::Message {
            propagation_source,
            message,
            ..
        })) => {
            let frame = InboundFrame { from_peer: propagation_source.to_string(), bytes: message.data };
            if inbound_tx.send(frame).is_err() {
                debug!("inbound channel closed, dropping frame");
            }
        }
        SwarmEvent::ConnectionEstablished { peer_id, .. } => debug!(%peer_id, "connection established"),
        SwarmEvent::ConnectionClosed { peer_id, .. } => debug!(%peer_id, "connection closed"),
        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
            warn!(peer_id = ?peer_id, error = %error, "outgoing connection failed");
        }
        _ => {}
    }
}
