//! Error types for the reference host.

use lockstep_core::{CheckpointError, ConfigError, NodeError};
use lockstep_env::{EnvError, NodeId};
use thiserror::Error;

/// Fatal conditions raised while building or running a world.
#[derive(Debug, Error)]
pub enum SimError {
    /// The wiring preset or a hand-written layout is inconsistent.
    #[error("invalid layout: {0}")]
    Layout(String),

    /// A node rejected its configuration.
    #[error("node config: {0}")]
    Config(#[from] ConfigError),

    /// A node aborted the run.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Routing failed inside the host.
    #[error("transport: {0}")]
    Transport(#[from] EnvError),

    /// A world snapshot could not be written, read or applied.
    #[error("world checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// An event targets a node that isn't in the arena.
    #[error("event for unknown {0}")]
    UnknownNode(NodeId),

    /// A resumed run ended in a different state than an uninterrupted one.
    #[error("checkpointed run diverged: {0}")]
    Divergence(String),
}

impl SimError {
    /// Creates a layout error.
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }
}
