//! Mesh transport: fragmentation and reassembly, duty-cycle
//! accounting, priority queueing, neighbor/heartbeat protocol, and
//! multi-phase chain synchronization.

pub mod duty_cycle;
pub mod fragment;
pub mod fragment_cache;
pub mod priority;
pub mod protocol;
pub mod reassembly;
pub mod sync;
pub mod wire;

pub use duty_cycle::{DutyCycleEvent, DutyCycleManager, DutyCyclePreset, DutyCycleStats};
pub use fragment::{Fragment, FragmentHeader, Fragmenter};
pub use fragment_cache::{FragmentCache, FragmentCacheConfig};
pub use priority::{calculate_priority, MessageKind, NetworkContext, Priority, PriorityCache, PriorityMessage, PriorityQueue, PriorityQueueConfig};
pub use protocol::{classify_frame, Classified, Envelope, FloodCache, MeshPayload, MeshProtocol, MeshTransport, NeighborInfo};
pub use reassembly::{FragmentOutcome, Reassembler, ReassemblyConfig};
pub use sync::{PeerAnnouncement, SyncCheckpoint, SyncConfig, SyncMachine, SyncState, UtxoDelta, UtxoSnapshot};
pub use wire::{DutyCycleInfo, FragmentInfo, WireEnvelope, WirePayload, WIRE_PROTOCOL_VERSION};
