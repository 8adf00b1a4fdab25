//! Host context: the scheduler-facing half of the node contract.

use crate::error::EnvError;
use crate::types::{NodeId, PortId};
use serde::{Deserialize, Serialize};

/// Everything a node asks of its host at construction time.
///
/// A node registers exactly once:
/// - a recurring tick callback at `clock_period_ps`
/// - one arrival callback per entry in `ports`
/// - itself as a primary participant when `primary` is set, which keeps the
///   simulation alive until the node calls [`HostContext::primary_ok_to_end`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Period of the tick callback in picoseconds.
    pub clock_period_ps: u64,

    /// Ports that receive arrival callbacks.
    pub ports: Vec<PortId>,

    /// Whether the node blocks simulation end until it signals readiness.
    pub primary: bool,
}

/// The central interface between a node and the discrete-event scheduler.
///
/// # Implementations
///
/// - **Reference host**: `lockstep_sim::SimWorld` dispatch, backed by an event queue
/// - **Tests**: [`crate::CaptureHost`], which records every call
///
/// # Determinism
///
/// A host must invoke a node's callbacks one at a time and in an order that
/// depends only on simulated time and scheduling sequence.
pub trait HostContext {
    /// Registers a node's callbacks and participation.
    fn register(&mut self, node: NodeId, registration: Registration) -> Result<(), EnvError>;

    /// Signals that a primary participant is ready for the simulation to end.
    fn primary_ok_to_end(&mut self, node: NodeId);

    /// Returns the current simulated time in picoseconds.
    fn now_ps(&self) -> u64;
}
