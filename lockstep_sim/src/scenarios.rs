//! Traffic verification scenarios.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Two nodes, two bidirectional ports, 1-2 word frames
    PointToPoint,

    /// 2x2 torus of grid8 nodes with 64KB self-checking buffers
    Grid,

    /// Grid paused mid-run, restored from JSON and compared to an uninterrupted run
    GridCheckpoint,

    /// Four ring4 nodes
    Ring,

    /// Four linear-ring nodes with four lanes each
    LinearRing,

    /// One hub fanning out to four leaves
    Broadcast,

    /// Queued sends over capacity-limited links, checkpointed with a full queue
    Backpressure,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::PointToPoint,
            ScenarioId::Grid,
            ScenarioId::GridCheckpoint,
            ScenarioId::Ring,
            ScenarioId::LinearRing,
            ScenarioId::Broadcast,
            ScenarioId::Backpressure,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PointToPoint => "point_to_point",
            ScenarioId::Grid => "grid",
            ScenarioId::GridCheckpoint => "grid_checkpoint",
            ScenarioId::Ring => "ring",
            ScenarioId::LinearRing => "linear_ring",
            ScenarioId::Broadcast => "broadcast",
            ScenarioId::Backpressure => "backpressure",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PointToPoint => "2 nodes x 2 ports, 1-2 word frames, every tick",
            ScenarioId::Grid => "2x2 grid8 torus, 64KB buffers self-checked every tick",
            ScenarioId::GridCheckpoint => "grid paused halfway, resumed from JSON, compared to a straight run",
            ScenarioId::Ring => "4 ring4 nodes, clockwise and counter-clockwise lanes",
            ScenarioId::LinearRing => "4 linear-ring nodes, 4 lanes to the next node",
            ScenarioId::Broadcast => "hub fanning out to 4 leaves",
            ScenarioId::Backpressure => "queued sends on 16-word links, checkpoint with a non-empty queue",
        }
    }

    /// Returns true if the scenario compares a checkpointed run against a straight one.
    pub fn is_checkpoint_comparison(&self) -> bool {
        matches!(self, ScenarioId::GridCheckpoint | ScenarioId::Backpressure)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "point_to_point" | "p2p" => Ok(ScenarioId::PointToPoint),
            "grid" => Ok(ScenarioId::Grid),
            "grid_checkpoint" | "checkpoint" => Ok(ScenarioId::GridCheckpoint),
            "ring" => Ok(ScenarioId::Ring),
            "linear_ring" | "linearring" => Ok(ScenarioId::LinearRing),
            "broadcast" => Ok(ScenarioId::Broadcast),
            "backpressure" | "queued" => Ok(ScenarioId::Backpressure),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
            assert!(!scenario.description().is_empty());
        }
        assert_eq!("P2P".parse::<ScenarioId>().unwrap(), ScenarioId::PointToPoint);
        assert!("mesh".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_serialized_name() {
        let json = serde_json::to_string(&ScenarioId::GridCheckpoint).unwrap();
        assert_eq!(json, "\"grid_checkpoint\"");
    }
}
