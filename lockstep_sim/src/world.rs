//! SimWorld - the reference host that drives lockstep nodes.
//!
//! The world owns a node arena, the link table and one event queue. Nodes
//! never hold references back into the world: each callback gets a short
//! lived [`Dispatch`] that borrows the host-side state and implements the
//! node's host traits.
//!
//! # Run Loop
//!
//! ```text
//! pop earliest (time, sequence) ─▶ Tick    ─▶ node.handle(Tick)    ─▶ schedule next tick
//!                                └▶ Deliver ─▶ node.handle(Arrival) ─▶ release link space
//! ```
//!
//! The run ends once every primary node has signalled and no node has
//! queued sends left. Frames still on the wire at that point are counted
//! as undelivered.

use crate::clock::SimClock;
use crate::error::SimError;
use crate::events::{EventQueue, ScheduledEvent, SimEvent};
use crate::layout::Layout;
use crate::network::{Link, LinkTable};

use lockstep_core::{CheckpointError, Node, NodeEvent, NodeSnapshot, NodeState};
use lockstep_env::{
    EnvError, Endpoint, HostContext, LinkTransport, NodeId, PortId, Registration, WireFrame,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// World snapshot layout version.
pub const WORLD_FORMAT_VERSION: u32 = 1;

/// Host-side counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimMetrics {
    pub events_processed: u64,
    pub ticks: u64,
    pub frames_sent: u64,
    pub frames_delivered: u64,
    pub words_delivered: u64,
    pub ready_signals: u64,

    /// Frames still in flight when the run ended
    pub undelivered_frames: u64,
}

/// Host view handed to a node for the duration of one callback.
struct Dispatch<'a> {
    registrations: &'a mut BTreeMap<NodeId, Registration>,
    ready: &'a mut BTreeSet<NodeId>,
    links: &'a mut LinkTable,
    queue: &'a mut EventQueue,
    sequence: &'a mut u64,
    metrics: &'a mut SimMetrics,
    now_ps: u64,
}

impl Dispatch<'_> {
    fn schedule(&mut self, time_ps: u64, event: SimEvent) {
        let sequence = *self.sequence;
        *self.sequence += 1;
        self.queue
            .schedule(ScheduledEvent::new(time_ps, sequence, event));
    }
}

impl HostContext for Dispatch<'_> {
    fn register(&mut self, node: NodeId, registration: Registration) -> Result<(), EnvError> {
        if self.registrations.contains_key(&node) {
            return Err(EnvError::DuplicateRegistration(node));
        }
        self.registrations.insert(node, registration);
        Ok(())
    }

    fn primary_ok_to_end(&mut self, node: NodeId) {
        self.metrics.ready_signals += 1;
        self.ready.insert(node);
    }

    fn now_ps(&self) -> u64 {
        self.now_ps
    }
}

impl LinkTransport for Dispatch<'_> {
    fn send(&mut self, from: NodeId, port: PortId, frame: WireFrame) -> Result<(), EnvError> {
        let source = Endpoint::new(from, port);
        let (latency_ps, to) = match self.links.route(source) {
            Some((link, to)) => (link.latency_ps, to),
            None => return Err(EnvError::not_linked(from, port)),
        };

        self.links.reserve(source, frame.len() as u64);
        self.metrics.frames_sent += 1;
        self.schedule(
            self.now_ps + latency_ps,
            SimEvent::Deliver {
                from: source,
                to,
                frame,
            },
        );
        Ok(())
    }

    fn space_to_send(&self, from: NodeId, port: PortId, bits: usize) -> bool {
        let words = (bits as u64).div_ceil(32);
        self.links.has_space(Endpoint::new(from, port), words)
    }
}

/// The simulation container: nodes, links, queue and time.
#[derive(Debug)]
pub struct SimWorld {
    nodes: Vec<Node>,
    clocks: Vec<SimClock>,
    registrations: BTreeMap<NodeId, Registration>,
    ready: BTreeSet<NodeId>,
    links: LinkTable,
    queue: EventQueue,
    now_ps: u64,
    sequence: u64,
    metrics: SimMetrics,
    finished: bool,
}

impl SimWorld {
    /// Builds a world from a validated layout and schedules every node's first tick.
    pub fn new(layout: &Layout) -> Result<Self, SimError> {
        layout.validate()?;

        let mut world = Self::empty();
        for (index, config) in layout.nodes.iter().enumerate() {
            let id = NodeId(index as u64);
            let node = {
                let (_, mut host) = world.split();
                Node::new(id, config.clone(), &mut host)?
            };
            world.nodes.push(node);
        }

        for spec in &layout.links {
            world
                .links
                .add(spec.a, spec.b, spec.latency_ps, spec.capacity_words)?;
        }

        for phase in 0..2 {
            for node in &mut world.nodes {
                node.init(phase);
            }
        }

        world.clocks = world.clocks_from_registrations()?;
        for index in 0..world.nodes.len() {
            let clock = world.clocks[index];
            let (_, mut host) = world.split();
            host.schedule(
                clock.tick_time_ps(1),
                SimEvent::Tick {
                    node: NodeId(index as u64),
                    cycle: 1,
                },
            );
        }

        info!(
            nodes = world.nodes.len(),
            links = world.links.len(),
            "world built"
        );
        Ok(world)
    }

    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            clocks: Vec::new(),
            registrations: BTreeMap::new(),
            ready: BTreeSet::new(),
            links: LinkTable::new(),
            queue: EventQueue::new(),
            now_ps: 0,
            sequence: 0,
            metrics: SimMetrics::default(),
            finished: false,
        }
    }

    /// Splits the world into the node arena and a host view over the rest.
    fn split(&mut self) -> (&mut [Node], Dispatch<'_>) {
        (
            &mut self.nodes,
            Dispatch {
                registrations: &mut self.registrations,
                ready: &mut self.ready,
                links: &mut self.links,
                queue: &mut self.queue,
                sequence: &mut self.sequence,
                metrics: &mut self.metrics,
                now_ps: self.now_ps,
            },
        )
    }

    fn clocks_from_registrations(&self) -> Result<Vec<SimClock>, SimError> {
        (0..self.nodes.len())
            .map(|index| {
                let id = NodeId(index as u64);
                self.registrations
                    .get(&id)
                    .map(|r| SimClock::new(r.clock_period_ps))
                    .ok_or(SimError::UnknownNode(id))
            })
            .collect()
    }

    /// Processes the earliest event. Returns `false` when the queue is empty.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some(scheduled) = self.queue.pop_earliest() else {
            return Ok(false);
        };
        self.now_ps = scheduled.time_ps;
        self.metrics.events_processed += 1;

        match scheduled.event {
            SimEvent::Tick { node, cycle } => {
                let clock = *self
                    .clocks
                    .get(node.index())
                    .ok_or(SimError::UnknownNode(node))?;
                let (nodes, mut host) = self.split();
                let target = nodes
                    .get_mut(node.index())
                    .ok_or(SimError::UnknownNode(node))?;

                target.handle(NodeEvent::Tick { cycle }, &mut host)?;
                host.metrics.ticks += 1;

                // Nodes past their last cycle only tick to drain queued sends
                if target.state() == NodeState::Running || target.pending_len() > 0 {
                    let next = cycle + 1;
                    host.schedule(clock.tick_time_ps(next), SimEvent::Tick { node, cycle: next });
                }
            }
            SimEvent::Deliver { from, to, frame } => {
                let registered = self
                    .registrations
                    .get(&to.node)
                    .is_some_and(|r| r.ports.contains(&to.port));
                if !registered {
                    return Err(EnvError::UnregisteredPort(to).into());
                }

                let words = frame.len() as u64;
                self.links.release(from, words);

                let (nodes, mut host) = self.split();
                let target = nodes
                    .get_mut(to.node.index())
                    .ok_or(SimError::UnknownNode(to.node))?;
                target.handle(NodeEvent::Arrival { port: to.port, frame }, &mut host)?;

                host.metrics.frames_delivered += 1;
                host.metrics.words_delivered += words;
            }
        }
        Ok(true)
    }

    /// True once every primary has signalled and no node has queued sends.
    pub fn is_finished(&self) -> bool {
        let primaries_ready = self
            .registrations
            .iter()
            .filter(|(_, r)| r.primary)
            .all(|(id, _)| self.ready.contains(id));
        let drained = self.nodes.iter().all(|n| n.pending_len() == 0);
        primaries_ready && drained
    }

    /// Runs to completion and moves every node to its final state.
    pub fn run(&mut self) -> Result<SimMetrics, SimError> {
        while !self.is_finished() {
            if !self.step()? {
                break;
            }
        }
        Ok(self.finish())
    }

    /// Processes every event up to and including `time_ps`.
    pub fn run_until_time_ps(&mut self, time_ps: u64) -> Result<(), SimError> {
        while !self.is_finished() {
            match self.queue.peek_earliest() {
                Some(next) if next.time_ps <= time_ps => {
                    self.step()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Runs until every node has handled cycle `cycle`.
    ///
    /// With mixed clock rates the cutoff is the slowest node's cycle.
    pub fn run_until_cycle(&mut self, cycle: u64) -> Result<(), SimError> {
        let cutoff = self
            .clocks
            .iter()
            .map(|c| c.tick_time_ps(cycle))
            .max()
            .unwrap_or(0);
        self.run_until_time_ps(cutoff)
    }

    fn finish(&mut self) -> SimMetrics {
        if !self.finished {
            self.metrics.undelivered_frames = self.queue.deliveries() as u64;
            for node in &mut self.nodes {
                node.finish();
            }
            self.finished = true;

            info!(
                now_ps = self.now_ps,
                events = self.metrics.events_processed,
                delivered = self.metrics.frames_delivered,
                undelivered = self.metrics.undelivered_frames,
                "world finished"
            );
        }
        self.metrics.clone()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn now_ps(&self) -> u64 {
        self.now_ps
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Captures the whole world between two events.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            format_version: WORLD_FORMAT_VERSION,
            now_ps: self.now_ps,
            sequence: self.sequence,
            registrations: self
                .registrations
                .iter()
                .map(|(id, r)| (*id, r.clone()))
                .collect(),
            ready: self.ready.iter().copied().collect(),
            nodes: self.nodes.iter().map(Node::snapshot).collect(),
            links: self.links.links().to_vec(),
            in_flight: self.links.in_flight_entries(),
            events: self.queue.to_sorted_vec(),
            metrics: self.metrics.clone(),
        }
    }

    /// Rebuilds a world that continues exactly where the snapshot was taken.
    pub fn restore(snapshot: WorldSnapshot) -> Result<Self, SimError> {
        if snapshot.format_version != WORLD_FORMAT_VERSION {
            return Err(CheckpointError::Version {
                found: snapshot.format_version,
                expected: WORLD_FORMAT_VERSION,
            }
            .into());
        }

        let mut world = Self::empty();
        for (index, node) in snapshot.nodes.into_iter().enumerate() {
            if node.id != NodeId(index as u64) {
                return Err(CheckpointError::invalid(format!(
                    "node snapshot {} found at arena slot {}",
                    node.id, index
                ))
                .into());
            }
            world.nodes.push(Node::restore(node)?);
        }

        world.registrations = snapshot.registrations.into_iter().collect();
        world.clocks = world.clocks_from_registrations()?;
        world.ready = snapshot.ready.into_iter().collect();
        world.links = LinkTable::rebuild(&snapshot.links, &snapshot.in_flight)?;

        if let Some(event) = snapshot
            .events
            .iter()
            .find(|e| e.event.target().index() >= world.nodes.len())
        {
            return Err(SimError::UnknownNode(event.event.target()));
        }
        world.queue = EventQueue::from_events(snapshot.events);
        world.now_ps = snapshot.now_ps;
        world.sequence = snapshot.sequence;
        world.metrics = snapshot.metrics;

        debug!(
            nodes = world.nodes.len(),
            events = world.queue.len(),
            now_ps = world.now_ps,
            "world restored"
        );
        Ok(world)
    }
}

/// Ordered capture of a whole world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub format_version: u32,
    pub now_ps: u64,
    pub sequence: u64,
    pub registrations: Vec<(NodeId, Registration)>,
    pub ready: Vec<NodeId>,
    pub nodes: Vec<NodeSnapshot>,
    pub links: Vec<Link>,
    pub in_flight: Vec<(Endpoint, u64)>,

    /// Queued events in dispatch order
    pub events: Vec<ScheduledEvent>,

    pub metrics: SimMetrics,
}

impl WorldSnapshot {
    pub fn to_json(&self) -> Result<String, SimError> {
        serde_json::to_string(self).map_err(|e| CheckpointError::from(e).into())
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        serde_json::from_str(json).map_err(|e| CheckpointError::from(e).into())
    }

    /// Writes the snapshot as JSON.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        std::fs::write(path, self.to_json()?).map_err(CheckpointError::from)?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path).map_err(CheckpointError::from)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{NodeConfig, NodeError};

    fn small_config() -> NodeConfig {
        NodeConfig {
            min_data: 2,
            max_data: 10,
            num_bytes: 256,
            clocks: 100,
            ..NodeConfig::default()
        }
    }

    fn p2p_layout() -> Layout {
        let config = NodeConfig {
            num_ports: 2,
            min_data: 1,
            ..small_config()
        };
        Layout::point_to_point(&config, 500)
    }

    #[test]
    fn test_point_to_point_run() {
        let mut world = SimWorld::new(&p2p_layout()).unwrap();
        let metrics = world.run().unwrap();

        assert_eq!(metrics.ready_signals, 2);
        for node in world.nodes() {
            assert_eq!(node.state(), NodeState::Terminated);
            assert_eq!(node.counters().ready_signals, 1);
            assert_eq!(node.counters().ticks, 100);
            assert_eq!(node.counters().messages_sent, 200);
        }
        // Each tick's frames arrive half a cycle later, so only the last tick's are lost
        assert_eq!(metrics.frames_sent, 400);
        assert_eq!(metrics.undelivered_frames, 4);
        assert_eq!(metrics.frames_delivered, 396);
        assert_eq!(world.now_ps(), 100_000);
    }

    #[test]
    fn test_run_until_cycle() {
        let mut world = SimWorld::new(&p2p_layout()).unwrap();
        world.run_until_cycle(40).unwrap();

        assert_eq!(world.now_ps(), 40_000);
        for node in world.nodes() {
            assert_eq!(node.counters().ticks, 40);
            assert_eq!(node.state(), NodeState::Running);
        }
        assert!(!world.is_finished());
    }

    #[test]
    fn test_world_checkpoint_resumes_identically() {
        let layout = Layout::grid(&small_config(), 2, 2, 300);

        let mut continuous = SimWorld::new(&layout).unwrap();
        let expected_metrics = continuous.run().unwrap();

        let mut paused = SimWorld::new(&layout).unwrap();
        paused.run_until_cycle(37).unwrap();
        let json = paused.snapshot().to_json().unwrap();
        drop(paused);

        let mut resumed = SimWorld::restore(WorldSnapshot::from_json(&json).unwrap()).unwrap();
        let metrics = resumed.run().unwrap();

        assert_eq!(metrics, expected_metrics);
        for (a, b) in resumed.nodes().iter().zip(continuous.nodes()) {
            assert_eq!(a.snapshot(), b.snapshot());
        }
    }

    #[test]
    fn test_queued_sends_under_backpressure() {
        let config = NodeConfig {
            queued_sends: true,
            min_data: 6,
            max_data: 6,
            clocks: 60,
            ..small_config()
        };
        // One 6-word frame in flight per endpoint, latency of three cycles
        let layout = Layout::ring(&config, 3, 3000).with_capacity(6);

        let mut world = SimWorld::new(&layout).unwrap();
        world.run_until_cycle(60).unwrap();
        assert!(world.nodes().iter().any(|n| n.pending_len() > 0));

        let metrics = world.run().unwrap();
        for node in world.nodes() {
            assert_eq!(node.pending_len(), 0);
            assert_eq!(node.counters().messages_sent, 120);
            assert!(node.counters().ticks > 60);
        }
        assert_eq!(metrics.frames_sent, 360);
        assert_eq!(
            metrics.frames_delivered + metrics.undelivered_frames,
            metrics.frames_sent
        );
    }

    #[test]
    fn test_checkpoint_with_queued_sends() {
        let config = NodeConfig {
            queued_sends: true,
            min_data: 4,
            max_data: 12,
            clocks: 50,
            ..small_config()
        };
        let layout = Layout::ring(&config, 2, 2500).with_capacity(8);

        let mut continuous = SimWorld::new(&layout).unwrap();
        let expected = continuous.run().unwrap();

        let mut paused = SimWorld::new(&layout).unwrap();
        paused.run_until_cycle(30).unwrap();
        let snapshot = paused.snapshot();
        assert!(snapshot.nodes.iter().any(|n| !n.pending_sends.is_empty()));
        assert!(!snapshot.in_flight.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        snapshot.write_to_file(&path).unwrap();

        let mut resumed = SimWorld::restore(WorldSnapshot::read_from_file(&path).unwrap()).unwrap();
        assert_eq!(resumed.run().unwrap(), expected);
        for (a, b) in resumed.nodes().iter().zip(continuous.nodes()) {
            assert_eq!(a.counters(), b.counters());
        }
    }

    #[test]
    fn test_corrupted_stream_fails_run() {
        let mut world = SimWorld::new(&p2p_layout()).unwrap();
        world.run_until_cycle(10).unwrap();

        let mut snapshot = world.snapshot();
        for state in snapshot.nodes[1].port_streams.values_mut() {
            state.key[7] ^= 0x5a;
        }

        let mut restored = SimWorld::restore(snapshot).unwrap();
        assert!(matches!(
            restored.run(),
            Err(SimError::Node(NodeError::Verification { .. }))
        ));
    }

    #[test]
    fn test_corrupted_buffer_fails_restore() {
        let mut world = SimWorld::new(&p2p_layout()).unwrap();
        world.run_until_cycle(5).unwrap();

        let mut snapshot = world.snapshot();
        snapshot.nodes[0].internal_buffer[3] = 0;
        assert!(matches!(
            SimWorld::restore(snapshot),
            Err(SimError::Checkpoint(CheckpointError::Node(
                NodeError::BufferCorruption { index: 3, .. }
            )))
        ));
    }

    #[test]
    fn test_restore_rejects_misplaced_nodes() {
        let world = SimWorld::new(&p2p_layout()).unwrap();
        let mut snapshot = world.snapshot();
        snapshot.nodes.swap(0, 1);

        assert!(matches!(
            SimWorld::restore(snapshot),
            Err(SimError::Checkpoint(CheckpointError::Invalid(_)))
        ));
    }

    #[test]
    fn test_restore_rejects_unknown_event_target() {
        let world = SimWorld::new(&p2p_layout()).unwrap();
        let mut snapshot = world.snapshot();
        snapshot.events.push(ScheduledEvent::new(
            5,
            999,
            SimEvent::Tick {
                node: NodeId(9),
                cycle: 1,
            },
        ));

        assert!(matches!(
            SimWorld::restore(snapshot),
            Err(SimError::UnknownNode(NodeId(9)))
        ));
    }

    #[test]
    fn test_broadcast_run() {
        let layout = Layout::broadcast(&small_config(), 4, 700);
        let mut world = SimWorld::new(&layout).unwrap();
        world.run().unwrap();

        let hub = world.node(NodeId(0)).unwrap();
        assert_eq!(hub.counters().messages_sent, 400);
        for leaf in &world.nodes()[1..] {
            assert_eq!(leaf.counters().messages_sent, 0);
            assert_eq!(leaf.counters().messages_verified, 99);
        }
    }
}
