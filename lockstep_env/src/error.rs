//! Error types for the host abstraction.

use crate::types::{Endpoint, NodeId, PortId};
use thiserror::Error;

/// Errors raised by a host while serving node callbacks.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A node sent on a port that has no link attached.
    #[error("{node} sent on {port}, which is not linked")]
    PortNotLinked { node: NodeId, port: PortId },

    /// The host does not know the node.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A node registered itself twice.
    #[error("{0} registered more than once")]
    DuplicateRegistration(NodeId),

    /// A link endpoint refers to a port the node never registered.
    #[error("endpoint {0} was not registered by its node")]
    UnregisteredPort(Endpoint),
}

impl EnvError {
    /// Creates an unlinked-port error.
    pub fn not_linked(node: NodeId, port: PortId) -> Self {
        Self::PortNotLinked { node, port }
    }
}
