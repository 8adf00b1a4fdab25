//! Lockstep Host Abstraction Layer
//!
//! This crate is the "Sans-IO" boundary between a lockstep node and whatever
//! drives it. A node never owns a clock, a socket, or a global RNG; it only
//! talks to its host through two traits:
//! - [`HostContext`]: registration, readiness to end, simulated time
//! - [`LinkTransport`]: sending frames and asking for buffer space
//!
//! # Core Concept: Id-Based Wiring
//!
//! Nodes and ports are plain integers ([`NodeId`], [`PortId`]). Hosts keep
//! nodes and links in arenas keyed by those ids, so callbacks carry ids
//! instead of pointers back into the host.
//!
//! # Example
//!
//! ```ignore
//! use lockstep_env::{CaptureHost, HostContext, LinkTransport, NodeId, PortId, WireFrame};
//!
//! let mut host = CaptureHost::new();
//! host.send(NodeId(0), PortId(0), WireFrame::new(vec![1, 7]))?;
//! assert_eq!(host.sent().len(), 1);
//! ```

mod capture;
mod context;
mod error;
mod network;
mod types;

pub use capture::{CaptureHost, SentFrame};
pub use context::{HostContext, Registration};
pub use error::EnvError;
pub use network::LinkTransport;
pub use types::{Endpoint, NodeId, PortId, WireFrame};
