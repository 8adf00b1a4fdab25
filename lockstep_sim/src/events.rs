//! Event queue for the discrete-event scheduler.

use lockstep_env::{Endpoint, NodeId, WireFrame};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Events the world dispatches to nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    /// Clock callback for `node`
    Tick { node: NodeId, cycle: u64 },

    /// A frame reaching the far end of a link
    Deliver {
        from: Endpoint,
        to: Endpoint,
        frame: WireFrame,
    },
}

impl SimEvent {
    /// Node that will handle the event.
    pub fn target(&self) -> NodeId {
        match self {
            SimEvent::Tick { node, .. } => *node,
            SimEvent::Deliver { to, .. } => to.node,
        }
    }

    pub fn is_delivery(&self) -> bool {
        matches!(self, SimEvent::Deliver { .. })
    }
}

/// An event scheduled for a specific simulated time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub time_ps: u64,

    /// Tie-breaker for events at the same time
    pub sequence: u64,

    pub event: SimEvent,
}

impl ScheduledEvent {
    pub fn new(time_ps: u64, sequence: u64, event: SimEvent) -> Self {
        Self {
            time_ps,
            sequence,
            event,
        }
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap: reverse so the earliest (time, sequence) pops first
        other
            .time_ps
            .cmp(&self.time_ps)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of scheduled events in time order.
///
/// Events at the same time pop in the order they were scheduled, so the
/// dispatch order depends only on simulated time and sequence numbers.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a queue from a list of events.
    pub fn from_events(events: Vec<ScheduledEvent>) -> Self {
        Self {
            heap: events.into_iter().collect(),
        }
    }

    pub fn schedule(&mut self, event: ScheduledEvent) {
        self.heap.push(event);
    }

    /// Removes and returns the earliest event.
    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub fn peek_earliest(&self) -> Option<&ScheduledEvent> {
        self.heap.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Number of frames still on the wire.
    pub fn deliveries(&self) -> usize {
        self.heap.iter().filter(|e| e.event.is_delivery()).count()
    }

    /// Every queued event in dispatch order, without draining the queue.
    pub fn to_sorted_vec(&self) -> Vec<ScheduledEvent> {
        let mut events: Vec<_> = self.heap.iter().cloned().collect();
        events.sort_by_key(|e| (e.time_ps, e.sequence));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_env::PortId;
    use proptest::prelude::*;

    fn tick(node: u64, cycle: u64) -> SimEvent {
        SimEvent::Tick {
            node: NodeId(node),
            cycle,
        }
    }

    #[test]
    fn test_time_ordering() {
        let mut queue = EventQueue::new();
        queue.schedule(ScheduledEvent::new(300, 0, tick(0, 3)));
        queue.schedule(ScheduledEvent::new(100, 1, tick(0, 1)));
        queue.schedule(ScheduledEvent::new(200, 2, tick(0, 2)));

        let times: Vec<_> = std::iter::from_fn(|| queue.pop_earliest())
            .map(|e| e.time_ps)
            .collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn test_same_time_uses_sequence() {
        let mut queue = EventQueue::new();
        queue.schedule(ScheduledEvent::new(100, 7, tick(2, 1)));
        queue.schedule(ScheduledEvent::new(100, 3, tick(1, 1)));
        queue.schedule(ScheduledEvent::new(100, 5, tick(0, 1)));

        let targets: Vec<_> = std::iter::from_fn(|| queue.pop_earliest())
            .map(|e| e.event.target())
            .collect();
        assert_eq!(targets, vec![NodeId(1), NodeId(0), NodeId(2)]);
    }

    #[test]
    fn test_sorted_vec_rebuilds_same_queue() {
        let mut queue = EventQueue::new();
        queue.schedule(ScheduledEvent::new(50, 4, tick(1, 1)));
        queue.schedule(ScheduledEvent::new(
            20,
            9,
            SimEvent::Deliver {
                from: Endpoint::new(NodeId(0), PortId(0)),
                to: Endpoint::new(NodeId(1), PortId(0)),
                frame: WireFrame::new(vec![1]),
            },
        ));

        let events = queue.to_sorted_vec();
        assert_eq!(events[0].time_ps, 20);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.deliveries(), 1);

        let mut rebuilt = EventQueue::from_events(events);
        assert_eq!(rebuilt.pop_earliest(), queue.pop_earliest());
        assert_eq!(rebuilt.pop_earliest(), queue.pop_earliest());
    }

    proptest! {
        #[test]
        fn prop_snapshot_order_matches_dispatch_order(
            times in prop::collection::vec(0u64..50, 1..40),
        ) {
            let mut queue = EventQueue::new();
            for (sequence, time_ps) in times.iter().enumerate() {
                let event = tick(sequence as u64 % 3, sequence as u64);
                queue.schedule(ScheduledEvent::new(*time_ps, sequence as u64, event));
            }

            let mut rebuilt = EventQueue::from_events(queue.to_sorted_vec());
            prop_assert_eq!(rebuilt.len(), queue.len());

            let mut last = None;
            while let Some(expected) = queue.pop_earliest() {
                let key = (expected.time_ps, expected.sequence);
                if let Some(prev) = last {
                    prop_assert!(prev < key);
                }
                last = Some(key);
                prop_assert_eq!(rebuilt.pop_earliest(), Some(expected));
            }
            prop_assert!(rebuilt.is_empty());
        }
    }
}
