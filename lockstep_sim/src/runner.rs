//! Scenario runner - builds a world per scenario, runs it and checks the outcome.

use crate::error::SimError;
use crate::layout::Layout;
use crate::scenarios::ScenarioId;
use crate::world::{SimMetrics, SimWorld, WorldSnapshot};

use lockstep_core::{DeterministicStream, NodeConfig, NodeCounters, NodeState};
use lockstep_env::NodeId;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Shortest link latency the runner assigns.
const MIN_LATENCY_PS: u64 = 100;

/// Spread of link latencies above the minimum.
const LATENCY_SPAN_PS: u64 = 2900;

/// Per-endpoint buffer for the backpressure scenario.
const BACKPRESSURE_CAPACITY_WORDS: u64 = 16;

/// Final state of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub state: NodeState,
    pub counters: NodeCounters,
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the run finished and every check held
    pub passed: bool,

    /// Ticks delivered across all nodes
    pub total_ticks: u64,

    /// Simulated time at the end of the run
    pub final_time_ps: u64,

    /// Cycle at which the world was checkpointed and restored, if any
    pub checkpoint_cycle: Option<u64>,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Host-side counters
    pub metrics: SimMetrics,

    /// Per-node counters
    pub nodes: Vec<NodeSummary>,
}

/// Runs traffic scenarios.
pub struct ScenarioRunner {
    /// Seed for node streams, buffer pattern and link latencies
    seed: u64,

    /// Cycles each node runs before signalling ready
    clocks: u64,

    /// Settings applied to every node before the scenario's own
    base: NodeConfig,

    /// Pause, snapshot and restore at this cycle
    checkpoint_at: Option<u64>,

    /// Route the snapshot through this file instead of memory
    checkpoint_file: Option<PathBuf>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clocks: 1000,
            base: NodeConfig::default(),
            checkpoint_at: None,
            checkpoint_file: None,
        }
    }

    /// Sets the number of cycles per node.
    pub fn with_clocks(mut self, clocks: u64) -> Self {
        self.clocks = clocks;
        self
    }

    /// Sets the node settings every scenario starts from.
    ///
    /// The runner's seed and clock count still take precedence.
    pub fn with_base_config(mut self, config: NodeConfig) -> Self {
        self.base = config;
        self
    }

    /// Checkpoints every run at `cycle`.
    pub fn with_checkpoint_at(mut self, cycle: u64) -> Self {
        self.checkpoint_at = Some(cycle);
        self
    }

    /// Writes checkpoints to `path` and resumes from the file.
    pub fn with_checkpoint_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_file = Some(path.into());
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let checkpoint_cycle = if scenario.is_checkpoint_comparison() {
            Some(self.checkpoint_at.unwrap_or(self.clocks / 2))
        } else {
            self.checkpoint_at
        };

        let outcome = self.layout_for(scenario).and_then(|layout| {
            match (scenario.is_checkpoint_comparison(), checkpoint_cycle) {
                (true, Some(cycle)) => self.run_compared(&layout, cycle),
                (_, Some(cycle)) => self.run_checkpointed(&layout, cycle),
                (_, None) => self.run_straight(&layout),
            }
        });

        let mut result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_ps: 0,
            checkpoint_cycle,
            failure_reason: None,
            metrics: SimMetrics::default(),
            nodes: Vec::new(),
        };

        match outcome {
            Ok(world) => {
                result.failure_reason = self.check(&world).err();
                result.passed = result.failure_reason.is_none();
                result.total_ticks = world.metrics().ticks;
                result.final_time_ps = world.now_ps();
                result.metrics = world.metrics().clone();
                result.nodes = world
                    .nodes()
                    .iter()
                    .map(|node| NodeSummary {
                        id: node.id(),
                        state: node.state(),
                        counters: node.counters().clone(),
                    })
                    .collect();
            }
            Err(e) => {
                warn!("{} aborted: {}", scenario.name(), e);
                result.failure_reason = Some(e.to_string());
            }
        }
        result
    }

    fn base_config(&self) -> NodeConfig {
        NodeConfig {
            rng_seed: self.seed,
            base_seed: self.seed as u32,
            clocks: self.clocks,
            ..self.base.clone()
        }
    }

    /// Node settings for scenarios with a two-word header.
    fn framed_config(&self) -> NodeConfig {
        NodeConfig {
            min_data: 2,
            max_data: 16,
            ..self.base_config()
        }
    }

    fn layout_for(&self, scenario: ScenarioId) -> Result<Layout, SimError> {
        let mut layout = match scenario {
            ScenarioId::PointToPoint => {
                let config = NodeConfig {
                    num_ports: 2,
                    min_data: 1,
                    max_data: 2,
                    ..self.base_config()
                };
                Layout::point_to_point(&config, MIN_LATENCY_PS)
            }
            ScenarioId::Grid | ScenarioId::GridCheckpoint => {
                let config = NodeConfig {
                    num_bytes: 64 * 1024,
                    ..self.framed_config()
                };
                Layout::grid(&config, 2, 2, MIN_LATENCY_PS)
            }
            ScenarioId::Ring => Layout::ring(&self.framed_config(), 4, MIN_LATENCY_PS),
            ScenarioId::LinearRing => {
                Layout::linear_ring(&self.framed_config(), 4, 8, MIN_LATENCY_PS)
            }
            ScenarioId::Broadcast => Layout::broadcast(&self.framed_config(), 4, MIN_LATENCY_PS),
            ScenarioId::Backpressure => {
                let config = NodeConfig {
                    queued_sends: true,
                    min_data: 4,
                    max_data: 12,
                    ..self.base_config()
                };
                Layout::ring(&config, 3, MIN_LATENCY_PS).with_capacity(BACKPRESSURE_CAPACITY_WORDS)
            }
        };

        // Per-link latency drawn from the run seed; each link stays FIFO
        let mut latencies = DeterministicStream::new(self.seed);
        for link in &mut layout.links {
            link.latency_ps = MIN_LATENCY_PS + latencies.next_below(LATENCY_SPAN_PS);
        }

        layout.validate()?;
        Ok(layout)
    }

    fn run_straight(&self, layout: &Layout) -> Result<SimWorld, SimError> {
        let mut world = SimWorld::new(layout)?;
        world.run()?;
        Ok(world)
    }

    fn run_checkpointed(&self, layout: &Layout, cycle: u64) -> Result<SimWorld, SimError> {
        let mut world = SimWorld::new(layout)?;
        world.run_until_cycle(cycle)?;
        let snapshot = world.snapshot();
        drop(world);

        let snapshot = match &self.checkpoint_file {
            Some(path) => {
                snapshot.write_to_file(path)?;
                info!("Checkpoint at cycle {} written to {}", cycle, path.display());
                WorldSnapshot::read_from_file(path)?
            }
            None => WorldSnapshot::from_json(&snapshot.to_json()?)?,
        };

        let mut resumed = SimWorld::restore(snapshot)?;
        resumed.run()?;
        Ok(resumed)
    }

    fn run_compared(&self, layout: &Layout, cycle: u64) -> Result<SimWorld, SimError> {
        let straight = self.run_straight(layout)?;
        let resumed = self.run_checkpointed(layout, cycle)?;

        if straight.metrics() != resumed.metrics() {
            return Err(SimError::Divergence(format!(
                "host metrics {:?} != {:?}",
                resumed.metrics(),
                straight.metrics()
            )));
        }
        for (a, b) in resumed.nodes().iter().zip(straight.nodes()) {
            if a.snapshot() != b.snapshot() {
                return Err(SimError::Divergence(format!(
                    "{} ended with different state",
                    a.id()
                )));
            }
        }
        Ok(resumed)
    }

    /// Checks the end state of a finished world.
    fn check(&self, world: &SimWorld) -> Result<(), String> {
        let mut verified = 0;
        for node in world.nodes() {
            let counters = node.counters();
            if counters.ready_signals != 1 {
                return Err(format!(
                    "{} signalled ready {} times",
                    node.id(),
                    counters.ready_signals
                ));
            }
            if counters.ticks < node.config().clocks {
                return Err(format!(
                    "{} stopped after {} of {} ticks",
                    node.id(),
                    counters.ticks,
                    node.config().clocks
                ));
            }
            if node.pending_len() > 0 {
                return Err(format!("{} ended with queued sends", node.id()));
            }
            verified += counters.messages_verified;
        }

        let metrics = world.metrics();
        if metrics.frames_delivered + metrics.undelivered_frames != metrics.frames_sent {
            return Err(format!(
                "{} frames sent but {} delivered and {} in flight",
                metrics.frames_sent, metrics.frames_delivered, metrics.undelivered_frames
            ));
        }
        if verified != metrics.frames_delivered {
            return Err(format!(
                "{} frames delivered but {} verified",
                metrics.frames_delivered, verified
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_to_point_signals_once_at_last_tick() {
        let result = ScenarioRunner::new(1223).run(ScenarioId::PointToPoint);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.final_time_ps, 1_000_000);
        for node in &result.nodes {
            assert_eq!(node.counters.ready_signals, 1);
            assert_eq!(node.counters.ticks, 1000);
            assert_eq!(node.counters.messages_sent, 2000);
            assert_eq!(node.state, NodeState::Terminated);
        }
    }

    #[test]
    fn test_grid_torus() {
        let result = ScenarioRunner::new(1223).run(ScenarioId::Grid);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.nodes.len(), 4);
        assert_eq!(result.total_ticks, 4000);
        for node in &result.nodes {
            assert_eq!(node.counters.messages_sent, 4000);
            assert!(node.counters.messages_verified > 3900);
        }
    }

    #[test]
    fn test_grid_checkpoint_matches_straight_run() {
        let result = ScenarioRunner::new(1223).run(ScenarioId::GridCheckpoint);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.checkpoint_cycle, Some(500));
    }

    #[test]
    fn test_backpressure_drains_after_last_cycle() {
        let result = ScenarioRunner::new(7).with_clocks(200).run(ScenarioId::Backpressure);

        assert!(result.passed, "{:?}", result.failure_reason);
        for node in &result.nodes {
            assert_eq!(node.counters.messages_sent, 400);
            assert!(node.counters.ticks >= 200);
        }
    }

    #[test]
    fn test_all_scenarios_across_seeds() {
        for seed in [1, 42, 1223] {
            let runner = ScenarioRunner::new(seed).with_clocks(80);
            for scenario in ScenarioId::all() {
                let result = runner.run(scenario);
                assert!(
                    result.passed,
                    "{} seed={}: {:?}",
                    scenario,
                    seed,
                    result.failure_reason
                );
            }
        }
    }

    #[test]
    fn test_checkpoint_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.json");

        let result = ScenarioRunner::new(3)
            .with_clocks(100)
            .with_checkpoint_at(33)
            .with_checkpoint_file(&path)
            .run(ScenarioId::Ring);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.checkpoint_cycle, Some(33));
        assert!(path.exists());
    }

    #[test]
    fn test_bad_base_config_fails_run() {
        let config = NodeConfig {
            clock_freq: "fast".to_string(),
            ..NodeConfig::default()
        };
        let result = ScenarioRunner::new(1)
            .with_base_config(config)
            .run(ScenarioId::Ring);

        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("clock"));
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = ScenarioRunner::new(99).with_clocks(50).run(ScenarioId::LinearRing);
        let b = ScenarioRunner::new(99).with_clocks(50).run(ScenarioId::LinearRing);

        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.final_time_ps, b.final_time_ps);
    }
}
