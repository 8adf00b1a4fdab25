//! Checkpoint Contract - capture and rebuild a node at a quiescent point.
//!
//! A [`NodeSnapshot`] lists every piece of mutable node state in a fixed
//! order. Restoring builds a fresh node from it; the result produces the
//! same frames and verifies the same arrivals as a node that was never
//! paused.

use crate::config::NodeConfig;
use crate::error::CheckpointError;
use crate::node::{Node, NodeCounters, NodeState, Outbound};
use crate::stream::{DeterministicStream, StreamState};
use lockstep_env::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Snapshot layout version written by this crate.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Ordered capture of a node's mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub format_version: u32,
    pub id: NodeId,
    pub state: NodeState,
    pub initialized: bool,
    pub config: NodeConfig,
    pub internal_buffer: Vec<u32>,
    pub tick_counter: u32,
    pub counters: NodeCounters,

    /// Generator state of every stream, keyed by stream name
    pub port_streams: BTreeMap<String, StreamState>,

    /// Queued sends, oldest first
    pub pending_sends: Vec<Outbound>,
}

impl NodeSnapshot {
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the snapshot as JSON.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads a snapshot written by [`NodeSnapshot::write_to_file`].
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl Node {
    /// Captures the node without consuming any stream draws.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            id: self.id,
            state: self.state,
            initialized: self.initialized,
            config: self.config.clone(),
            internal_buffer: self.internal_buffer.clone(),
            tick_counter: self.tick_counter,
            counters: self.counters.clone(),
            port_streams: self
                .port_streams
                .iter()
                .map(|(name, stream)| (name.clone(), stream.capture_state()))
                .collect(),
            pending_sends: self.pending_sends.iter().cloned().collect(),
        }
    }

    /// Rebuilds a node from a snapshot.
    ///
    /// The snapshot is validated (format version, configuration, stream
    /// names against the topology, buffer length) and the buffer self-check
    /// runs before the node is returned. Streams resume from their captured
    /// generator state, never from their seed.
    pub fn restore(snapshot: NodeSnapshot) -> Result<Node, CheckpointError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(CheckpointError::Version {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }

        let mut node = Node::unregistered(snapshot.id, snapshot.config)?;

        if snapshot.initialized {
            let expected: BTreeSet<String> = node.topology.stream_names().into_iter().collect();
            let found: BTreeSet<String> = snapshot.port_streams.keys().cloned().collect();
            if expected != found {
                return Err(CheckpointError::invalid(format!(
                    "{} streams {:?} do not match topology streams {:?}",
                    snapshot.id, found, expected
                )));
            }

            let words = node.config.buffer_words();
            if snapshot.internal_buffer.len() != words {
                return Err(CheckpointError::invalid(format!(
                    "{} buffer has {} words, expected {}",
                    snapshot.id,
                    snapshot.internal_buffer.len(),
                    words
                )));
            }
        } else if !snapshot.port_streams.is_empty() || !snapshot.internal_buffer.is_empty() {
            return Err(CheckpointError::invalid(format!(
                "{} is uninitialized but carries state",
                snapshot.id
            )));
        }

        node.state = snapshot.state;
        node.initialized = snapshot.initialized;
        node.internal_buffer = snapshot.internal_buffer;
        node.tick_counter = snapshot.tick_counter;
        node.counters = snapshot.counters;
        node.port_streams = snapshot
            .port_streams
            .iter()
            .map(|(name, state)| (name.clone(), DeterministicStream::from_state(state)))
            .collect();
        node.pending_sends = snapshot.pending_sends.into();

        node.self_check()?;

        debug!(
            node = %node.id,
            state = ?node.state,
            pending = node.pending_sends.len(),
            "node restored"
        );
        Ok(node)
    }
}
