//! Topology Resolver - static pairing of output ports with input ports.
//!
//! The resolver is a pure function of the topology kind and the port count.
//! It answers one question: a frame leaving local port `p` arrives on which
//! port of the neighbouring node? Receivers use the same answer in reverse to
//! pick the stream that mirrors the sender.
//!
//! | kind             | ports   | send ports | `neighbor(p)`          |
//! |------------------|---------|------------|------------------------|
//! | `point-to-point` | ≥ 1     | all (bidirectional) | `p`           |
//! | `ring4`          | 4       | 0, 1       | `(p + 2) mod 4`        |
//! | `grid8`          | 8       | 0..4       | `0↔5, 1↔4, 2↔7, 3↔6`   |
//! | `linear-ring`    | even    | first half | `(p + P/2) mod P`      |
//! | `broadcast`      | ≥ 1     | 1..P       | `0`                    |

use crate::error::ConfigError;
use crate::stream::lane_seed;
use lockstep_env::PortId;
use serde::{Deserialize, Serialize};

/// The wiring families a node can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyKind {
    /// Two nodes joined port-for-port; every port sends and receives.
    PointToPoint,

    /// Ring of nodes, one clockwise and one counter-clockwise lane.
    Ring4,

    /// 2-D grid: send up/down/left/right on 0..4, receive on 4..8.
    Grid8,

    /// Ring of nodes with `P/2` lanes all flowing to the next node.
    LinearRing,

    /// One hub fanning out to many leaves.
    Broadcast,
}

impl TopologyKind {
    /// Returns every topology kind.
    pub fn all() -> Vec<TopologyKind> {
        vec![
            TopologyKind::PointToPoint,
            TopologyKind::Ring4,
            TopologyKind::Grid8,
            TopologyKind::LinearRing,
            TopologyKind::Broadcast,
        ]
    }

    /// Returns the configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            TopologyKind::PointToPoint => "point-to-point",
            TopologyKind::Ring4 => "ring4",
            TopologyKind::Grid8 => "grid8",
            TopologyKind::LinearRing => "linear-ring",
            TopologyKind::Broadcast => "broadcast",
        }
    }
}

impl std::fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TopologyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "point-to-point" | "point_to_point" | "p2p" => Ok(TopologyKind::PointToPoint),
            "ring4" | "ring" => Ok(TopologyKind::Ring4),
            "grid8" | "grid" => Ok(TopologyKind::Grid8),
            "linear-ring" | "linear_ring" => Ok(TopologyKind::LinearRing),
            "broadcast" => Ok(TopologyKind::Broadcast),
            _ => Err(format!("Unknown topology: {}", s)),
        }
    }
}

/// Traffic direction carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Send,
    Receive,
    Both,
}

impl Direction {
    pub fn sends(&self) -> bool {
        matches!(self, Direction::Send | Direction::Both)
    }

    pub fn receives(&self) -> bool {
        matches!(self, Direction::Receive | Direction::Both)
    }
}

/// Name of the stream that generates traffic leaving `port`.
pub fn tx_stream_name(port: PortId) -> String {
    format!("{}:tx", port.name())
}

/// Name of the stream that mirrors traffic arriving on `port`.
pub fn rx_stream_name(port: PortId) -> String {
    format!("{}:rx", port.name())
}

/// A validated topology for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    kind: TopologyKind,
    num_ports: u32,
}

impl Topology {
    /// Validates the port count against the kind.
    ///
    /// A mismatch is a configuration error: the node must not start.
    pub fn new(kind: TopologyKind, num_ports: u32) -> Result<Self, ConfigError> {
        let reject = |reason| ConfigError::PortCount {
            kind,
            num_ports,
            reason,
        };

        if num_ports == 0 {
            return Err(reject("at least one port is required"));
        }

        match kind {
            TopologyKind::Ring4 if num_ports != 4 => Err(reject("exactly 4 ports are required")),
            TopologyKind::Grid8 if num_ports != 8 => Err(reject("exactly 8 ports are required")),
            TopologyKind::LinearRing if num_ports % 2 != 0 => {
                Err(reject("an even number of ports is required"))
            }
            _ => Ok(Self { kind, num_ports }),
        }
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn num_ports(&self) -> u32 {
        self.num_ports
    }

    /// Maps a sending port to the port it lands on at the neighbour.
    ///
    /// Broadcast leaves see the hub's ports, whose count they don't know,
    /// so broadcast accepts any port and always resolves to port 0.
    pub fn neighbor(&self, port: PortId) -> Result<PortId, ConfigError> {
        if self.kind == TopologyKind::Broadcast {
            return Ok(PortId(0));
        }
        if port.0 >= self.num_ports {
            return Err(ConfigError::PortOutOfRange {
                port,
                num_ports: self.num_ports,
            });
        }

        let p = port.0;
        let n = self.num_ports;
        let remote = match self.kind {
            TopologyKind::PointToPoint => p,
            TopologyKind::Ring4 | TopologyKind::LinearRing => (p + n / 2) % n,
            // send: up=0, down=1, left=2, right=3
            // rcv:  up=4, down=5, left=6, right=7
            TopologyKind::Grid8 => match p {
                0 => 5,
                1 => 4,
                2 => 7,
                3 => 6,
                4 => 1,
                5 => 0,
                6 => 3,
                _ => 2,
            },
            TopologyKind::Broadcast => 0,
        };
        Ok(PortId(remote))
    }

    /// Returns the traffic direction of a local port.
    pub fn direction(&self, port: PortId) -> Direction {
        match self.kind {
            TopologyKind::PointToPoint => Direction::Both,
            TopologyKind::Broadcast => {
                if port.0 == 0 {
                    Direction::Receive
                } else {
                    Direction::Send
                }
            }
            TopologyKind::Ring4 | TopologyKind::Grid8 | TopologyKind::LinearRing => {
                if port.0 < self.num_ports / 2 {
                    Direction::Send
                } else {
                    Direction::Receive
                }
            }
        }
    }

    /// All local ports in ascending order.
    pub fn ports(&self) -> impl Iterator<Item = PortId> {
        (0..self.num_ports).map(PortId)
    }

    /// Ports that originate traffic, in ascending order.
    pub fn send_ports(&self) -> Vec<PortId> {
        self.ports().filter(|p| self.direction(*p).sends()).collect()
    }

    /// Ports that receive traffic, in ascending order.
    pub fn receive_ports(&self) -> Vec<PortId> {
        self.ports().filter(|p| self.direction(*p).receives()).collect()
    }

    /// True when `neighbor` is a bijection over the port range.
    pub fn is_permutation(&self) -> bool {
        self.kind != TopologyKind::Broadcast
    }

    /// Number of header words in front of the generated data.
    ///
    /// Point-to-point frames carry only the length; every other topology
    /// also carries the sending port so the receiver can pick its stream.
    pub fn header_words(&self) -> u32 {
        match self.kind {
            TopologyKind::PointToPoint => 1,
            _ => 2,
        }
    }

    /// Names of every stream the node owns, in port order.
    pub fn stream_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for port in self.ports() {
            let direction = self.direction(port);
            if direction.sends() {
                names.push(tx_stream_name(port));
            }
            if direction.receives() {
                names.push(rx_stream_name(port));
            }
        }
        names
    }

    /// Seed of every stream, keyed like [`Topology::stream_names`].
    ///
    /// A lane is identified by the port its traffic lands on: a `tx` stream
    /// uses `neighbor(port)` and an `rx` stream its own port, so a sender and
    /// the receiver on the paired port draw the same sequence.
    pub fn stream_seeds(&self, rng_seed: u64) -> Vec<(String, u64)> {
        let mut seeds = Vec::new();
        for port in self.ports() {
            let direction = self.direction(port);
            if direction.sends() {
                if let Ok(lands_on) = self.neighbor(port) {
                    seeds.push((tx_stream_name(port), lane_seed(rng_seed, lands_on.0.into())));
                }
            }
            if direction.receives() {
                seeds.push((rx_stream_name(port), lane_seed(rng_seed, port.0.into())));
            }
        }
        seeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn assert_bijection_without_fixed_points(topology: &Topology) {
        let mut seen = BTreeSet::new();
        for port in topology.ports() {
            let remote = topology.neighbor(port).unwrap();
            assert_ne!(remote, port, "{} maps to itself", port);
            assert!(remote.0 < topology.num_ports());
            assert!(seen.insert(remote), "{} is shared", remote);
            // Pairing is symmetric
            assert_eq!(topology.neighbor(remote).unwrap(), port);
        }
        assert_eq!(seen.len(), topology.num_ports() as usize);
    }

    #[test]
    fn test_grid8_pairing() {
        let grid = Topology::new(TopologyKind::Grid8, 8).unwrap();
        let pairs = [(0, 5), (1, 4), (2, 7), (3, 6)];

        for (a, b) in pairs {
            assert_eq!(grid.neighbor(PortId(a)).unwrap(), PortId(b));
            assert_eq!(grid.neighbor(PortId(b)).unwrap(), PortId(a));
        }
        assert_bijection_without_fixed_points(&grid);
    }

    #[test]
    fn test_grid8_directions() {
        let grid = Topology::new(TopologyKind::Grid8, 8).unwrap();
        assert_eq!(grid.send_ports(), (0..4).map(PortId).collect::<Vec<_>>());
        assert_eq!(grid.receive_ports(), (4..8).map(PortId).collect::<Vec<_>>());
        assert_eq!(grid.header_words(), 2);
        assert_eq!(grid.stream_names()[0], "port0:tx");
        assert_eq!(grid.stream_names()[7], "port7:rx");
    }

    #[test]
    fn test_stream_seeds_follow_pairing() {
        let grid = Topology::new(TopologyKind::Grid8, 8).unwrap();
        let seeds: std::collections::BTreeMap<_, _> = grid.stream_seeds(1223).into_iter().collect();

        let names: BTreeSet<_> = grid.stream_names().into_iter().collect();
        assert_eq!(seeds.keys().cloned().collect::<BTreeSet<_>>(), names);

        // Sender port 3 lands on port 6 of the peer
        assert_eq!(seeds["port3:tx"], seeds["port6:rx"]);
        assert_eq!(seeds["port0:tx"], seeds["port5:rx"]);
        assert_ne!(seeds["port0:tx"], seeds["port3:tx"]);

        let p2p = Topology::new(TopologyKind::PointToPoint, 2).unwrap();
        let seeds: std::collections::BTreeMap<_, _> = p2p.stream_seeds(7).into_iter().collect();
        assert_eq!(seeds["port1:tx"], seeds["port1:rx"]);
        assert_ne!(seeds["port0:tx"], seeds["port1:tx"]);
    }

    #[test]
    fn test_ring4_pairing() {
        let ring = Topology::new(TopologyKind::Ring4, 4).unwrap();
        assert_eq!(ring.neighbor(PortId(0)).unwrap(), PortId(2));
        assert_eq!(ring.neighbor(PortId(1)).unwrap(), PortId(3));
        assert_bijection_without_fixed_points(&ring);
    }

    #[test]
    fn test_point_to_point_is_bidirectional() {
        let p2p = Topology::new(TopologyKind::PointToPoint, 2).unwrap();
        assert_eq!(p2p.neighbor(PortId(1)).unwrap(), PortId(1));
        assert_eq!(p2p.direction(PortId(0)), Direction::Both);
        assert_eq!(p2p.header_words(), 1);
        assert_eq!(
            p2p.stream_names(),
            vec!["port0:tx", "port0:rx", "port1:tx", "port1:rx"]
        );
    }

    #[test]
    fn test_broadcast_fan_in() {
        let hub = Topology::new(TopologyKind::Broadcast, 5).unwrap();
        assert!(!hub.is_permutation());
        assert_eq!(hub.send_ports().len(), 4);
        assert_eq!(hub.receive_ports(), vec![PortId(0)]);

        // A one-port leaf still resolves the hub's ports
        let leaf = Topology::new(TopologyKind::Broadcast, 1).unwrap();
        assert_eq!(leaf.neighbor(PortId(3)).unwrap(), PortId(0));
        assert!(leaf.send_ports().is_empty());
    }

    #[test]
    fn test_port_count_errors() {
        assert!(matches!(
            Topology::new(TopologyKind::Grid8, 4),
            Err(ConfigError::PortCount { .. })
        ));
        assert!(Topology::new(TopologyKind::Ring4, 8).is_err());
        assert!(Topology::new(TopologyKind::LinearRing, 3).is_err());
        assert!(Topology::new(TopologyKind::PointToPoint, 0).is_err());
    }

    #[test]
    fn test_neighbor_out_of_range() {
        let grid = Topology::new(TopologyKind::Grid8, 8).unwrap();
        assert_eq!(
            grid.neighbor(PortId(8)),
            Err(ConfigError::PortOutOfRange {
                port: PortId(8),
                num_ports: 8
            })
        );
    }

    #[test]
    fn test_kind_parse_and_serde() {
        for kind in TopologyKind::all() {
            assert_eq!(kind.name().parse::<TopologyKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
        assert!("torus".parse::<TopologyKind>().is_err());
    }

    proptest! {
        #[test]
        fn prop_linear_ring_bijection(half in 1u32..64) {
            let ring = Topology::new(TopologyKind::LinearRing, half * 2).unwrap();
            assert_bijection_without_fixed_points(&ring);
            prop_assert_eq!(ring.send_ports().len() as u32, half);
        }
    }
}
