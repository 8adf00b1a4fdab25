//! Link transport abstraction for nodes.

use crate::error::EnvError;
use crate::types::{NodeId, PortId, WireFrame};

/// Abstraction for sending frames over statically wired links.
///
/// # Frame Flow
///
/// ```text
/// Node A                       Link                       Node B
///   |                            |                           |
///   |-- send(A, port, frame) --->|                           |
///   |                            |-- [latency] ------------->|
///   |                            |                           |-- Arrival { port, frame }
/// ```
///
/// Delivery on one link is FIFO. Nothing is promised across links feeding
/// the same receiver.
pub trait LinkTransport {
    /// Hands a frame to the link attached to `port` of node `from`.
    ///
    /// # Returns
    /// * `Ok(())` - Frame accepted for delivery
    /// * `Err(EnvError::PortNotLinked)` - Nothing is attached to the port
    fn send(&mut self, from: NodeId, port: PortId, frame: WireFrame) -> Result<(), EnvError>;

    /// Reports whether the link attached to `port` can accept `bits` more bits.
    ///
    /// This is the flow-control hook used by queued senders. A transport
    /// without buffering limits always returns `true`.
    fn space_to_send(&self, from: NodeId, port: PortId, bits: usize) -> bool;
}
