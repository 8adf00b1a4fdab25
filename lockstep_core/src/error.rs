//! Error taxonomy for the lockstep engine.
//!
//! Every variant here is fatal to the run. The engine exists to catch
//! divergence, so nothing is retried or recovered locally; each error carries
//! enough context (node, port, index, expected/actual) to find the root cause.

use crate::codec::VerifyError;
use crate::node::NodeState;
use crate::topology::TopologyKind;
use lockstep_env::{EnvError, NodeId, PortId};
use thiserror::Error;

/// Configuration rejected at initialization. The simulation never starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maxData ({max_data}) < minData ({min_data})")]
    DataRange { min_data: u32, max_data: u32 },

    #[error("{0}-word header is not supported (1 or 2)")]
    HeaderWords(u32),

    #[error("minData ({min_data}) is smaller than the {header_words}-word header")]
    DataBelowHeader { min_data: u32, header_words: u32 },

    #[error("{kind} topology does not support {num_ports} ports: {reason}")]
    PortCount {
        kind: TopologyKind,
        num_ports: u32,
        reason: &'static str,
    },

    #[error("{port} is outside the {num_ports}-port range")]
    PortOutOfRange { port: PortId, num_ports: u32 },

    #[error("invalid clock frequency {0:?}")]
    ClockFrequency(String),

    #[error("invalid size {0:?}")]
    Size(String),

    #[error("config file: {0}")]
    File(String),
}

/// Fatal conditions raised while a node runs.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{node} verification failed on {port}: {source}")]
    Verification {
        node: NodeId,
        port: PortId,
        #[source]
        source: VerifyError,
    },

    #[error("{node} found a mismatch data element: element {index} was {actual} and should have been {expected}")]
    BufferCorruption {
        node: NodeId,
        index: usize,
        actual: u32,
        expected: u32,
    },

    #[error("{0} received an event before initialization")]
    NotInitialized(NodeId),

    #[error("{node} cannot handle {event} while {state:?}")]
    UnexpectedEvent {
        node: NodeId,
        state: NodeState,
        event: &'static str,
    },

    #[error("{node} has no stream named {name}")]
    MissingStream { node: NodeId, name: String },

    #[error("transport error: {0}")]
    Transport(#[from] EnvError),
}

/// Failures while writing, reading, or restoring a snapshot.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("snapshot format version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("invalid snapshot: {0}")]
    Invalid(String),

    #[error("restored node failed validation: {0}")]
    Node(#[from] NodeError),

    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Creates an invalid-snapshot error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
