//! Node Lifecycle - the traffic generating and verifying participant.
//!
//! A node owns a self-checking buffer, one deterministic stream per port and
//! direction, and an optional FIFO of sends waiting for link space. It is
//! driven entirely by its host through [`Node::handle`]:
//!
//! ```text
//! Initializing ──first tick──▶ Running ──cycle ≥ clocks──▶ Terminating ──finish()──▶ Terminated
//!                                │  ▲                         │  ▲
//!                                └──┘ ticks, arrivals         └──┘ drain ticks, arrivals
//! ```
//!
//! Every failure is fatal: the node returns an error and the host is expected
//! to abort the run.

use crate::codec::{HeaderField, TrafficCodec, VerifyError};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::stream::DeterministicStream;
use crate::topology::{rx_stream_name, tx_stream_name, Topology};
use lockstep_env::{HostContext, LinkTransport, NodeId, PortId, Registration, WireFrame};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, trace};

/// Verbosity at which lifecycle milestones are logged.
const VERBOSE_LIFECYCLE: u32 = 1;

/// Verbosity at which every message is logged.
const VERBOSE_MESSAGES: u32 = 5;

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Initializing,
    Running,
    Terminating,
    Terminated,
}

/// Events a host delivers to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Periodic clock callback; cycles are numbered from 1
    Tick { cycle: u64 },

    /// A frame arrived on a local port
    Arrival { port: PortId, frame: WireFrame },
}

impl NodeEvent {
    /// Short event name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeEvent::Tick { .. } => "tick",
            NodeEvent::Arrival { .. } => "arrival",
        }
    }
}

/// What the node tells its host after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSignal {
    Continue,

    /// Emitted once, on the tick that reaches `clocks`
    ReadyToEnd,
}

/// Running totals kept by a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounters {
    /// Ticks handled, drain ticks after the last cycle included
    pub ticks: u64,
    pub send_events: u64,
    pub messages_sent: u64,
    pub words_sent: u64,
    pub messages_verified: u64,
    pub words_verified: u64,
    pub ready_signals: u64,
}

/// A frame waiting in the send queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub port: PortId,
    pub frame: WireFrame,
}

/// A traffic node.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) config: NodeConfig,
    pub(crate) topology: Topology,
    pub(crate) codec: TrafficCodec,
    pub(crate) state: NodeState,
    pub(crate) initialized: bool,
    pub(crate) internal_buffer: Vec<u32>,
    pub(crate) port_streams: BTreeMap<String, DeterministicStream>,
    pub(crate) tick_counter: u32,
    pub(crate) counters: NodeCounters,
    pub(crate) pending_sends: VecDeque<Outbound>,
}

impl Node {
    /// Creates a node and registers it with its host.
    ///
    /// The node registers its clock period, the ports it receives on, and
    /// itself as a primary participant. The buffer and streams stay empty
    /// until [`Node::init`] runs phase 0.
    pub fn new<H: HostContext>(
        id: NodeId,
        config: NodeConfig,
        host: &mut H,
    ) -> Result<Self, NodeError> {
        let node = Self::unregistered(id, config)?;

        host.register(
            id,
            Registration {
                clock_period_ps: node.config.clock_period_ps()?,
                ports: node.topology.receive_ports(),
                primary: true,
            },
        )?;

        if node.config.verbose >= VERBOSE_LIFECYCLE {
            info!(
                node = %id,
                topology = %node.topology.kind(),
                ports = node.topology.num_ports(),
                "node registered"
            );
        }
        Ok(node)
    }

    /// Builds a validated node without touching a host.
    pub(crate) fn unregistered(id: NodeId, config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let topology = config.topology()?;
        let codec = config.codec()?;

        Ok(Self {
            id,
            config,
            topology,
            codec,
            state: NodeState::Initializing,
            initialized: false,
            internal_buffer: Vec::new(),
            port_streams: BTreeMap::new(),
            tick_counter: 0,
            counters: NodeCounters::default(),
            pending_sends: VecDeque::new(),
        })
    }

    /// Runs one initialization phase.
    ///
    /// Phase 0 fills the buffer and seeds every stream. It happens once;
    /// repeated calls and later phases do nothing.
    pub fn init(&mut self, phase: u32) {
        if phase != 0 || self.initialized {
            return;
        }

        let base_seed = self.config.base_seed;
        self.internal_buffer = (0..self.config.buffer_words())
            .map(|i| (i as u32).wrapping_add(base_seed))
            .collect();

        self.port_streams = self
            .topology
            .stream_seeds(self.config.rng_seed)
            .into_iter()
            .map(|(name, seed)| (name, DeterministicStream::new(seed)))
            .collect();

        self.initialized = true;

        if self.config.verbose >= VERBOSE_LIFECYCLE {
            debug!(
                node = %self.id,
                words = self.internal_buffer.len(),
                streams = self.port_streams.len(),
                "node initialized"
            );
        }
    }

    /// Handles one host event.
    pub fn handle<H>(&mut self, event: NodeEvent, host: &mut H) -> Result<NodeSignal, NodeError>
    where
        H: HostContext + LinkTransport,
    {
        if !self.initialized {
            return Err(NodeError::NotInitialized(self.id));
        }

        match (event, self.state) {
            (NodeEvent::Tick { cycle }, NodeState::Initializing) => {
                self.state = NodeState::Running;
                self.on_tick(cycle, host)
            }
            (NodeEvent::Tick { cycle }, NodeState::Running) => self.on_tick(cycle, host),
            (NodeEvent::Tick { .. }, NodeState::Terminating) => {
                self.self_check()?;
                self.counters.ticks += 1;
                self.drain_pending(host)?;
                Ok(NodeSignal::Continue)
            }
            (NodeEvent::Arrival { port, frame }, state) if state != NodeState::Terminated => {
                self.on_arrival(port, frame)?;
                Ok(NodeSignal::Continue)
            }
            (event, state) => Err(NodeError::UnexpectedEvent {
                node: self.id,
                state,
                event: event.name(),
            }),
        }
    }

    /// Moves the node to its final state.
    pub fn finish(&mut self) {
        self.state = NodeState::Terminated;

        if self.config.verbose >= VERBOSE_LIFECYCLE {
            info!(
                node = %self.id,
                sent = self.counters.messages_sent,
                verified = self.counters.messages_verified,
                pending = self.pending_sends.len(),
                "node finished"
            );
        }
    }

    /// Checks that every buffer word still holds `index + base_seed`.
    pub fn self_check(&self) -> Result<(), NodeError> {
        let base_seed = self.config.base_seed;
        for (index, actual) in self.internal_buffer.iter().enumerate() {
            let expected = (index as u32).wrapping_add(base_seed);
            if *actual != expected {
                return Err(NodeError::BufferCorruption {
                    node: self.id,
                    index,
                    actual: *actual,
                    expected,
                });
            }
        }
        Ok(())
    }

    fn on_tick<H>(&mut self, cycle: u64, host: &mut H) -> Result<NodeSignal, NodeError>
    where
        H: HostContext + LinkTransport,
    {
        self.self_check()?;

        self.counters.ticks += 1;
        self.tick_counter += 1;
        if self.tick_counter >= self.config.clock_delay {
            self.send_event(host)?;
            self.tick_counter = 0;
        }

        if self.config.queued_sends {
            self.drain_pending(host)?;
        }

        if cycle >= self.config.clocks {
            self.state = NodeState::Terminating;
            self.counters.ready_signals += 1;
            host.primary_ok_to_end(self.id);

            if self.config.verbose >= VERBOSE_LIFECYCLE {
                info!(
                    node = %self.id,
                    cycle,
                    now_ps = host.now_ps(),
                    "node ready to end"
                );
            }
            return Ok(NodeSignal::ReadyToEnd);
        }

        Ok(NodeSignal::Continue)
    }

    /// Encodes one message per send port, in ascending port order.
    fn send_event<H: LinkTransport>(&mut self, host: &mut H) -> Result<(), NodeError> {
        self.counters.send_events += 1;

        for port in self.topology.send_ports() {
            let name = tx_stream_name(port);
            let stream = self
                .port_streams
                .get_mut(&name)
                .ok_or(NodeError::MissingStream { node: self.id, name })?;
            let frame = self.codec.encode(port, stream).to_frame();

            if self.config.verbose >= VERBOSE_MESSAGES {
                debug!(node = %self.id, %port, words = frame.len(), "message generated");
            }

            if self.config.queued_sends {
                self.pending_sends.push_back(Outbound { port, frame });
            } else {
                self.transmit(port, frame, host)?;
            }
        }
        Ok(())
    }

    /// Flushes queued sends in order until the link refuses one.
    fn drain_pending<H: LinkTransport>(&mut self, host: &mut H) -> Result<(), NodeError> {
        while let Some(next) = self.pending_sends.front() {
            if !host.space_to_send(self.id, next.port, next.frame.size_in_bits()) {
                if self.config.verbose >= VERBOSE_MESSAGES {
                    trace!(node = %self.id, queued = self.pending_sends.len(), "send queue blocked");
                }
                break;
            }
            if let Some(Outbound { port, frame }) = self.pending_sends.pop_front() {
                self.transmit(port, frame, host)?;
            }
        }
        Ok(())
    }

    fn transmit<H: LinkTransport>(
        &mut self,
        port: PortId,
        frame: WireFrame,
        host: &mut H,
    ) -> Result<(), NodeError> {
        self.counters.messages_sent += 1;
        self.counters.words_sent += frame.len() as u64;
        host.send(self.id, port, frame)?;
        Ok(())
    }

    fn on_arrival(&mut self, port: PortId, frame: WireFrame) -> Result<(), NodeError> {
        let node = self.id;
        let fail = |source: VerifyError| NodeError::Verification { node, port, source };

        let message = self.codec.parse(&frame).map_err(fail)?;
        if let Some(sender) = message.sender_port {
            let resolves_here = matches!(self.topology.neighbor(sender), Ok(remote) if remote == port);
            if !resolves_here {
                return Err(fail(VerifyError::HeaderMismatch {
                    field: HeaderField::SenderPort,
                    expected: self.expected_sender(port),
                    actual: sender.0,
                }));
            }
        }

        let name = rx_stream_name(port);
        let stream = match self.port_streams.get_mut(&name) {
            Some(stream) => stream,
            None => return Err(NodeError::MissingStream { node, name }),
        };
        self.codec.verify(&frame, stream).map_err(fail)?;

        self.counters.messages_verified += 1;
        self.counters.words_verified += frame.len() as u64;

        if self.config.verbose >= VERBOSE_MESSAGES {
            debug!(node = %self.id, %port, words = frame.len(), "message verified");
        }
        Ok(())
    }

    /// The only sender port whose traffic may land on `arrival`.
    fn expected_sender(&self, arrival: PortId) -> u32 {
        if self.topology.is_permutation() {
            // Permutation pairings are involutions
            self.topology.neighbor(arrival).map(|p| p.0).unwrap_or(arrival.0)
        } else {
            arrival.0
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn counters(&self) -> &NodeCounters {
        &self.counters
    }

    pub fn internal_buffer(&self) -> &[u32] {
        &self.internal_buffer
    }

    pub fn tick_counter(&self) -> u32 {
        self.tick_counter
    }

    /// Sends still waiting for link space, oldest first.
    pub fn pending_sends(&self) -> impl Iterator<Item = &Outbound> {
        self.pending_sends.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_sends.len()
    }

    /// Looks up a stream by name (`port3:tx`, `port5:rx`, ...).
    pub fn stream(&self, name: &str) -> Option<&DeterministicStream> {
        self.port_streams.get(name)
    }
}
