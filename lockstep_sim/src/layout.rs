//! Wiring presets: which node ports are joined by links.
//!
//! Every preset follows the node-side pairing, so a frame sent on port `p`
//! always lands on the peer's port `neighbor(p)`.
//!
//! ```text
//! grid (2-D torus, grid8 nodes)        ring (ring4 nodes)
//!
//!        p5 ▲ up                        ──p0──▶ p2 next
//!   p6 ◀─ [n] ─▶ p7                     ◀─p3── p1 prev
//!        p4 ▼ down
//! ```

use crate::error::SimError;
use lockstep_core::{NodeConfig, TopologyKind};
use lockstep_env::{Endpoint, NodeId, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A link to create between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: Endpoint,
    pub b: Endpoint,
    pub latency_ps: u64,

    #[serde(default)]
    pub capacity_words: Option<u64>,
}

impl LinkSpec {
    pub fn new(a: Endpoint, b: Endpoint, latency_ps: u64) -> Self {
        Self {
            a,
            b,
            latency_ps,
            capacity_words: None,
        }
    }
}

/// Node configurations plus the links between them.
///
/// Node `i` in `nodes` becomes `NodeId(i)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub nodes: Vec<NodeConfig>,
    pub links: Vec<LinkSpec>,
}

fn ep(node: usize, port: u32) -> Endpoint {
    Endpoint::new(NodeId(node as u64), PortId(port))
}

fn with_topology(base: &NodeConfig, topology: TopologyKind, num_ports: u32) -> NodeConfig {
    NodeConfig {
        topology,
        num_ports,
        ..base.clone()
    }
}

impl Layout {
    /// Two nodes joined port-for-port.
    pub fn point_to_point(base: &NodeConfig, latency_ps: u64) -> Self {
        let config = with_topology(base, TopologyKind::PointToPoint, base.num_ports);
        let links = (0..config.num_ports)
            .map(|p| LinkSpec::new(ep(0, p), ep(1, p), latency_ps))
            .collect();

        Self {
            nodes: vec![config.clone(), config],
            links,
        }
    }

    /// A `rows × cols` torus of grid8 nodes, numbered row by row.
    pub fn grid(base: &NodeConfig, rows: usize, cols: usize, latency_ps: u64) -> Self {
        let config = with_topology(base, TopologyKind::Grid8, 8);
        let index = |r: usize, c: usize| r * cols + c;
        let mut links = Vec::new();

        for r in 0..rows {
            for c in 0..cols {
                let n = index(r, c);
                let up = index((r + rows - 1) % rows, c);
                let down = index((r + 1) % rows, c);
                let left = index(r, (c + cols - 1) % cols);
                let right = index(r, (c + 1) % cols);

                links.push(LinkSpec::new(ep(n, 0), ep(up, 5), latency_ps));
                links.push(LinkSpec::new(ep(n, 1), ep(down, 4), latency_ps));
                links.push(LinkSpec::new(ep(n, 2), ep(left, 7), latency_ps));
                links.push(LinkSpec::new(ep(n, 3), ep(right, 6), latency_ps));
            }
        }

        Self {
            nodes: vec![config; rows * cols],
            links,
        }
    }

    /// A ring of ring4 nodes: port 0 flows to the next node, port 1 to the previous.
    pub fn ring(base: &NodeConfig, count: usize, latency_ps: u64) -> Self {
        let config = with_topology(base, TopologyKind::Ring4, 4);
        let mut links = Vec::new();

        for n in 0..count {
            let next = (n + 1) % count;
            let prev = (n + count - 1) % count;
            links.push(LinkSpec::new(ep(n, 0), ep(next, 2), latency_ps));
            links.push(LinkSpec::new(ep(n, 1), ep(prev, 3), latency_ps));
        }

        Self {
            nodes: vec![config; count],
            links,
        }
    }

    /// A ring where all `num_ports / 2` lanes flow to the next node.
    pub fn linear_ring(base: &NodeConfig, count: usize, num_ports: u32, latency_ps: u64) -> Self {
        let config = with_topology(base, TopologyKind::LinearRing, num_ports);
        let half = num_ports / 2;
        let mut links = Vec::new();

        for n in 0..count {
            let next = (n + 1) % count;
            for k in 0..half {
                links.push(LinkSpec::new(ep(n, k), ep(next, k + half), latency_ps));
            }
        }

        Self {
            nodes: vec![config; count],
            links,
        }
    }

    /// A hub (node 0) fanning out to `leaves` one-port nodes.
    pub fn broadcast(base: &NodeConfig, leaves: usize, latency_ps: u64) -> Self {
        let hub = with_topology(base, TopologyKind::Broadcast, leaves as u32 + 1);
        let leaf = with_topology(base, TopologyKind::Broadcast, 1);

        let mut nodes = vec![hub];
        nodes.extend(std::iter::repeat(leaf).take(leaves));

        let links = (1..=leaves)
            .map(|k| LinkSpec::new(ep(0, k as u32), ep(k, 0), latency_ps))
            .collect();

        Self { nodes, links }
    }

    /// Limits every link to `words` in flight per endpoint.
    pub fn with_capacity(mut self, words: u64) -> Self {
        for link in &mut self.links {
            link.capacity_words = Some(words);
        }
        self
    }

    /// Checks that the wiring matches every node's topology.
    ///
    /// Each endpoint must exist and appear on at most one link. Every send
    /// port must be linked to the port its topology pairs it with, and that
    /// port must receive.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.nodes.is_empty() {
            return Err(SimError::layout("no nodes"));
        }

        let topologies = self
            .nodes
            .iter()
            .map(|config| {
                config.validate()?;
                config.topology()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut peers: BTreeMap<Endpoint, Endpoint> = BTreeMap::new();
        for link in &self.links {
            for (from, to) in [(link.a, link.b), (link.b, link.a)] {
                let topology = topologies
                    .get(from.node.index())
                    .ok_or_else(|| SimError::layout(format!("{} is not in the layout", from.node)))?;
                if from.port.0 >= topology.num_ports() {
                    return Err(SimError::layout(format!("{} does not exist", from)));
                }
                if peers.insert(from, to).is_some() {
                    return Err(SimError::layout(format!("{} is linked more than once", from)));
                }
            }
        }

        for (index, topology) in topologies.iter().enumerate() {
            for port in topology.send_ports() {
                let from = ep(index, port.0);
                let to = peers
                    .get(&from)
                    .ok_or_else(|| SimError::layout(format!("send port {} is not linked", from)))?;

                let lands_on = topology.neighbor(port)?;
                if to.port != lands_on {
                    return Err(SimError::layout(format!(
                        "{} is linked to {} but its traffic lands on {}",
                        from, to, lands_on
                    )));
                }
                if !topologies[to.node.index()].direction(to.port).receives() {
                    return Err(SimError::layout(format!(
                        "{} sends into {}, which does not receive",
                        from, to
                    )));
                }
            }
        }
        Ok(())
    }
}
