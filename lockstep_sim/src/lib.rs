//! Lockstep reference host and scenario harness
//!
//! A single-threaded discrete-event scheduler that drives lockstep traffic
//! nodes. Time is an integer picosecond counter and every event carries a
//! sequence number, so two runs with the same layout and seeds dispatch the
//! exact same events in the exact same order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │ EventQueue (time_ps, sequence) + SimClock per node │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │       │ Tick / Arrival              │                    │
//! │  ┌────▼────┐                   ┌────▼────┐               │
//! │  │  Node   │◄────LinkTable────►│  Node   │    ...        │
//! │  │   #0    │  latency/capacity │   #1    │               │
//! │  └─────────┘                   └─────────┘               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lockstep_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(1223)
//!     .with_clocks(1000)
//!     .run(ScenarioId::GridCheckpoint);
//! assert!(result.passed);
//! ```

mod clock;
mod error;
mod events;
mod exporter;
mod layout;
mod network;
mod runner;
mod world;
pub mod scenarios;

pub use clock::SimClock;
pub use error::SimError;
pub use events::{EventQueue, ScheduledEvent, SimEvent};
pub use exporter::{RunReport, ScenarioReport};
pub use layout::{Layout, LinkSpec};
pub use network::{Link, LinkId, LinkTable};
pub use runner::{NodeSummary, ScenarioResult, ScenarioRunner};
pub use world::{SimMetrics, SimWorld, WorldSnapshot, WORLD_FORMAT_VERSION};
