//! Link table: point-to-point links between node ports.

use crate::error::SimError;
use lockstep_env::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a link in the [`LinkTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u32);

/// A bidirectional link joining two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub a: Endpoint,
    pub b: Endpoint,

    /// One-way delivery latency in picoseconds
    pub latency_ps: u64,

    /// Words each endpoint may have in flight (`None` = unbounded)
    pub capacity_words: Option<u64>,
}

impl Link {
    /// Returns the far end of the link as seen from `from`.
    pub fn peer(&self, from: Endpoint) -> Option<Endpoint> {
        if from == self.a {
            Some(self.b)
        } else if from == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Arena of links keyed by [`LinkId`], with per-endpoint flow control.
///
/// A frame occupies its source endpoint's buffer from send until delivery.
/// An idle endpoint always accepts one frame, even one larger than the
/// capacity, so oversized frames can't deadlock a sender.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: Vec<Link>,
    by_endpoint: BTreeMap<Endpoint, LinkId>,
    in_flight_words: BTreeMap<Endpoint, u64>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a link, rejecting endpoints that are already linked.
    pub fn add(
        &mut self,
        a: Endpoint,
        b: Endpoint,
        latency_ps: u64,
        capacity_words: Option<u64>,
    ) -> Result<LinkId, SimError> {
        if a == b {
            return Err(SimError::layout(format!("{} is linked to itself", a)));
        }
        for endpoint in [a, b] {
            if let Some(existing) = self.by_endpoint.get(&endpoint) {
                return Err(SimError::layout(format!(
                    "{} is already on link {}",
                    endpoint, existing.0
                )));
            }
        }

        let id = LinkId(self.links.len() as u32);
        self.links.push(Link {
            id,
            a,
            b,
            latency_ps,
            capacity_words,
        });
        self.by_endpoint.insert(a, id);
        self.by_endpoint.insert(b, id);
        Ok(id)
    }

    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0 as usize)
    }

    /// Finds the link attached to `from` and the endpoint it leads to.
    pub fn route(&self, from: Endpoint) -> Option<(&Link, Endpoint)> {
        let id = self.by_endpoint.get(&from)?;
        let link = self.get(*id)?;
        link.peer(from).map(|to| (link, to))
    }

    /// True when `from` can take `words` more words in flight.
    pub fn has_space(&self, from: Endpoint, words: u64) -> bool {
        let Some((link, _)) = self.route(from) else {
            return false;
        };
        let Some(capacity) = link.capacity_words else {
            return true;
        };

        match self.in_flight(from) {
            0 => true,
            used => used + words <= capacity,
        }
    }

    /// Charges `words` to the source endpoint's buffer.
    pub fn reserve(&mut self, from: Endpoint, words: u64) {
        *self.in_flight_words.entry(from).or_insert(0) += words;
    }

    /// Returns `words` to the source endpoint's buffer.
    pub fn release(&mut self, from: Endpoint, words: u64) {
        if let Some(used) = self.in_flight_words.get_mut(&from) {
            *used = used.saturating_sub(words);
            if *used == 0 {
                self.in_flight_words.remove(&from);
            }
        }
    }

    pub fn in_flight(&self, from: Endpoint) -> u64 {
        self.in_flight_words.get(&from).copied().unwrap_or(0)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// In-flight accounting as a list, for snapshots.
    pub fn in_flight_entries(&self) -> Vec<(Endpoint, u64)> {
        self.in_flight_words.iter().map(|(e, w)| (*e, *w)).collect()
    }

    /// Rebuilds a table from saved links and in-flight accounting.
    pub fn rebuild(links: &[Link], in_flight: &[(Endpoint, u64)]) -> Result<Self, SimError> {
        let mut table = Self::new();
        for link in links {
            table.add(link.a, link.b, link.latency_ps, link.capacity_words)?;
        }
        for (endpoint, words) in in_flight {
            if table.route(*endpoint).is_none() {
                return Err(SimError::layout(format!(
                    "in-flight words recorded for unlinked {}",
                    endpoint
                )));
            }
            table.reserve(*endpoint, *words);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_env::{NodeId, PortId};

    fn ep(node: u64, port: u32) -> Endpoint {
        Endpoint::new(NodeId(node), PortId(port))
    }

    #[test]
    fn test_route_both_directions() {
        let mut table = LinkTable::new();
        table.add(ep(0, 0), ep(1, 5), 100, None).unwrap();

        assert_eq!(table.route(ep(0, 0)).unwrap().1, ep(1, 5));
        assert_eq!(table.route(ep(1, 5)).unwrap().1, ep(0, 0));
        assert!(table.route(ep(0, 1)).is_none());
    }

    #[test]
    fn test_endpoint_linked_twice() {
        let mut table = LinkTable::new();
        table.add(ep(0, 0), ep(1, 5), 100, None).unwrap();

        assert!(matches!(
            table.add(ep(2, 0), ep(1, 5), 100, None),
            Err(SimError::Layout(_))
        ));
        assert!(table.add(ep(3, 1), ep(3, 1), 100, None).is_err());
    }

    #[test]
    fn test_capacity_accounting() {
        let mut table = LinkTable::new();
        table.add(ep(0, 0), ep(1, 4), 100, Some(8)).unwrap();

        // Idle endpoint takes anything
        assert!(table.has_space(ep(0, 0), 20));

        table.reserve(ep(0, 0), 6);
        assert!(table.has_space(ep(0, 0), 2));
        assert!(!table.has_space(ep(0, 0), 3));

        table.release(ep(0, 0), 6);
        assert_eq!(table.in_flight(ep(0, 0)), 0);
        assert!(table.in_flight_entries().is_empty());
    }

    #[test]
    fn test_unbounded_link() {
        let mut table = LinkTable::new();
        table.add(ep(0, 0), ep(1, 0), 1, None).unwrap();
        table.reserve(ep(0, 0), 1_000_000);
        assert!(table.has_space(ep(0, 0), 1_000_000));
        assert!(!table.has_space(ep(5, 0), 1));
    }

    #[test]
    fn test_rebuild() {
        let mut table = LinkTable::new();
        table.add(ep(0, 0), ep(1, 0), 10, Some(4)).unwrap();
        table.reserve(ep(1, 0), 3);

        let rebuilt = LinkTable::rebuild(table.links(), &table.in_flight_entries()).unwrap();
        assert_eq!(rebuilt.links(), table.links());
        assert_eq!(rebuilt.in_flight(ep(1, 0)), 3);

        assert!(LinkTable::rebuild(table.links(), &[(ep(9, 9), 1)]).is_err());
    }
}
