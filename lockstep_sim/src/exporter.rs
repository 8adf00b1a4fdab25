//! JSON run report.
//!
//! Collects scenario results from one CLI invocation so CI can archive them.

use crate::runner::{NodeSummary, ScenarioResult};
use crate::world::SimMetrics;
use serde::Serialize;
use std::fs::File;
use std::io::Write;

/// One scenario run as it appears in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub seed: u64,
    pub passed: bool,
    pub ticks: u64,
    pub time_ps: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_cycle: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: SimMetrics,
    pub nodes: Vec<NodeSummary>,
}

impl From<&ScenarioResult> for ScenarioReport {
    fn from(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            passed: result.passed,
            ticks: result.total_ticks,
            time_ps: result.final_time_ps,
            checkpoint_cycle: result.checkpoint_cycle,
            failure_reason: result.failure_reason.clone(),
            metrics: result.metrics.clone(),
            nodes: result.nodes.clone(),
        }
    }
}

/// Summary of every run in one invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<ScenarioReport>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finished run.
    pub fn add(&mut self, result: &ScenarioResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(ScenarioReport::from(result));
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Failed runs in the order they ran.
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_counts_and_failures() {
        let mut report = RunReport::new();
        let mut result = ScenarioRunner::new(5).with_clocks(20).run(ScenarioId::Ring);
        report.add(&result);

        result.passed = false;
        result.failure_reason = Some("boom".to_string());
        report.add(&result);

        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.all_passed());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_write_to_file() {
        let mut report = RunReport::new();
        report.add(&ScenarioRunner::new(1).with_clocks(10).run(ScenarioId::PointToPoint));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_to_file(path.to_str().unwrap()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["results"][0]["scenario"], "point_to_point");
        assert_eq!(json["results"][0]["ticks"], 20);
        assert!(json["results"][0].get("failure_reason").is_none());
    }
}
