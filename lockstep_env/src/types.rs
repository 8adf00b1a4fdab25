//! Common types shared between nodes and their host.

use serde::{Deserialize, Serialize};

/// Stable identity of a simulated node.
///
/// Assigned by the host at construction and never changed afterwards.
/// Hosts use it as the index into their node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Returns the id as an arena index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Index of a port on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub u32);

impl PortId {
    /// Returns the port as an index into per-port tables.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Returns the canonical port name (`port0`, `port1`, ...).
    pub fn name(&self) -> String {
        format!("port{}", self.0)
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// A node port as seen from the host: which node, which port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: PortId,
}

impl Endpoint {
    pub fn new(node: NodeId, port: PortId) -> Self {
        Self { node, port }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Wire representation of a payload: an ordered run of 32-bit words.
///
/// The host moves frames between endpoints without looking inside them;
/// only the receiving node's codec interprets the words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFrame {
    pub words: Vec<u32>,
}

impl WireFrame {
    /// Creates a frame from its words.
    pub fn new(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Number of words in the frame.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when the frame carries no words at all.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Frame size in bits, as used by buffer-capacity checks.
    pub fn size_in_bits(&self) -> usize {
        self.words.len() * 32
    }
}
