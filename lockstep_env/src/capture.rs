//! In-memory host that records every call a node makes.

use crate::context::{HostContext, Registration};
use crate::error::EnvError;
use crate::network::LinkTransport;
use crate::types::{NodeId, PortId, WireFrame};
use std::collections::{BTreeMap, BTreeSet};

/// A frame captured by [`CaptureHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub from: NodeId,
    pub port: PortId,
    pub frame: WireFrame,
}

/// Host backed by plain collections instead of a scheduler.
///
/// Frames are recorded rather than delivered, which makes it the natural
/// host for driving a single node by hand: tests feed the captured frames
/// back into a peer as arrivals.
///
/// Flow control is modelled with a credit budget in bits. Without a budget
/// every send is accepted; with one, `space_to_send` fails once the credits
/// run out until [`CaptureHost::refill`] is called.
#[derive(Debug, Default)]
pub struct CaptureHost {
    registrations: BTreeMap<NodeId, Registration>,
    ready: Vec<NodeId>,
    sent: Vec<SentFrame>,
    unlinked: BTreeSet<(NodeId, PortId)>,
    credit_limit_bits: Option<usize>,
    credits_bits: usize,
}

impl CaptureHost {
    /// Creates a host without flow-control limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host that accepts at most `bits` per refill.
    pub fn with_credit_bits(bits: usize) -> Self {
        Self {
            credit_limit_bits: Some(bits),
            credits_bits: bits,
            ..Self::default()
        }
    }

    /// Restores the credit budget to its limit.
    pub fn refill(&mut self) {
        if let Some(limit) = self.credit_limit_bits {
            self.credits_bits = limit;
        }
    }

    /// Marks a port as having no link, so sends on it fail.
    pub fn unlink(&mut self, node: NodeId, port: PortId) {
        self.unlinked.insert((node, port));
    }

    /// Returns the registration recorded for a node.
    pub fn registration(&self, node: NodeId) -> Option<&Registration> {
        self.registrations.get(&node)
    }

    /// Returns how many times a node signalled readiness.
    pub fn ready_count(&self, node: NodeId) -> usize {
        self.ready.iter().filter(|id| **id == node).count()
    }

    /// Returns the frames captured so far.
    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    /// Drains the captured frames.
    pub fn take_sent(&mut self) -> Vec<SentFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl HostContext for CaptureHost {
    fn register(&mut self, node: NodeId, registration: Registration) -> Result<(), EnvError> {
        if self.registrations.contains_key(&node) {
            return Err(EnvError::DuplicateRegistration(node));
        }
        self.registrations.insert(node, registration);
        Ok(())
    }

    fn primary_ok_to_end(&mut self, node: NodeId) {
        self.ready.push(node);
    }

    // No scheduler behind it, so time never advances
    fn now_ps(&self) -> u64 {
        0
    }
}

impl LinkTransport for CaptureHost {
    fn send(&mut self, from: NodeId, port: PortId, frame: WireFrame) -> Result<(), EnvError> {
        if self.unlinked.contains(&(from, port)) {
            return Err(EnvError::not_linked(from, port));
        }
        if self.credit_limit_bits.is_some() {
            self.credits_bits = self.credits_bits.saturating_sub(frame.size_in_bits());
        }
        self.sent.push(SentFrame { from, port, frame });
        Ok(())
    }

    fn space_to_send(&self, _from: NodeId, _port: PortId, bits: usize) -> bool {
        match self.credit_limit_bits {
            Some(_) => bits <= self.credits_bits,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_host_records_sends() {
        let mut host = CaptureHost::new();
        host.send(NodeId(0), PortId(1), WireFrame::new(vec![1, 2])).unwrap();

        assert_eq!(host.sent().len(), 1);
        assert_eq!(host.sent()[0].port, PortId(1));
        assert_eq!(host.take_sent().len(), 1);
        assert!(host.sent().is_empty());
    }

    #[test]
    fn test_capture_host_rejects_duplicate_registration() {
        let mut host = CaptureHost::new();
        let reg = Registration {
            clock_period_ps: 1000,
            ports: vec![PortId(0)],
            primary: true,
        };

        host.register(NodeId(4), reg.clone()).unwrap();
        assert!(matches!(
            host.register(NodeId(4), reg),
            Err(EnvError::DuplicateRegistration(NodeId(4)))
        ));
    }

    #[test]
    fn test_capture_host_credit_budget() {
        let mut host = CaptureHost::with_credit_bits(96);

        assert!(host.space_to_send(NodeId(0), PortId(0), 64));
        host.send(NodeId(0), PortId(0), WireFrame::new(vec![0, 0])).unwrap();

        // 32 bits left
        assert!(host.space_to_send(NodeId(0), PortId(0), 32));
        assert!(!host.space_to_send(NodeId(0), PortId(0), 64));

        host.refill();
        assert!(host.space_to_send(NodeId(0), PortId(0), 96));
    }

    #[test]
    fn test_capture_host_unlinked_port() {
        let mut host = CaptureHost::new();
        host.unlink(NodeId(0), PortId(2));

        let result = host.send(NodeId(0), PortId(2), WireFrame::new(vec![1]));
        assert!(matches!(result, Err(EnvError::PortNotLinked { .. })));
    }

    #[test]
    fn test_capture_host_ready_count() {
        let mut host = CaptureHost::new();
        host.primary_ok_to_end(NodeId(1));
        host.primary_ok_to_end(NodeId(1));

        assert_eq!(host.ready_count(NodeId(1)), 2);
        assert_eq!(host.ready_count(NodeId(2)), 0);
    }
}
