//! Lockstep Core - deterministic, checkpoint-resumable traffic verification
//!
//! Nodes generate traffic from seeded streams and verify what they receive
//! by re-deriving it from a mirrored stream. Nothing but the frame crosses
//! the wire, so any divergence (a lost draw, a reordered frame, a corrupted
//! word) surfaces as a verification failure.
//!
//! 1. **Deterministic Stream**: ChaCha8 generator with exportable state
//! 2. **Topology Resolver**: static output-to-input port pairing
//! 3. **Traffic Codec**: message layout, generation and verification
//! 4. **Node Lifecycle**: tick/arrival handling against a host
//! 5. **Checkpoint Contract**: snapshot and restore at quiescent points

pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod error;
pub mod node;
pub mod stream;
pub mod topology;

// Re-export key types for convenience
pub use checkpoint::{NodeSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use codec::{HeaderField, Message, TrafficCodec, VerifyError};
pub use config::{parse_clock_period_ps, parse_size, NodeConfig};
pub use error::{CheckpointError, ConfigError, NodeError};
pub use node::{Node, NodeCounters, NodeEvent, NodeSignal, NodeState, Outbound};
pub use stream::{lane_seed, DeterministicStream, StreamState};
pub use topology::{rx_stream_name, tx_stream_name, Direction, Topology, TopologyKind};
