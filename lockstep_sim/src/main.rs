//! Lockstep traffic verification CLI
//!
//! Runs the named scenarios against the reference host.

use clap::Parser;
use lockstep_core::NodeConfig;
use lockstep_sim::scenarios::ScenarioId;
use lockstep_sim::{RunReport, ScenarioRunner};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Lockstep deterministic traffic verification
#[derive(Parser, Debug)]
#[command(name = "lockstep-sim")]
#[command(about = "Run deterministic, checkpoint-resumable traffic scenarios", long_about = None)]
struct Args {
    /// Seed for node streams and link latencies
    #[arg(short, long, default_value = "1223")]
    seed: u64,

    /// Scenario to run (point_to_point, grid, grid_checkpoint, ring, linear_ring, broadcast, backpressure, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Cycles each node runs before it signals ready
    #[arg(short, long, default_value = "1000")]
    clocks: u64,

    /// Pause every run at this cycle, snapshot and resume
    #[arg(long)]
    checkpoint_at: Option<u64>,

    /// Route checkpoints through this JSON file
    #[arg(long)]
    checkpoint_file: Option<PathBuf>,

    /// Node config JSON applied to every node before the scenario's settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Write the run report to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.json { Level::ERROR } else { level })
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Lockstep traffic verifier v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all()
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            std::process::exit(1);
        })]
    };

    let base = match &args.config {
        Some(path) => NodeConfig::from_json_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => NodeConfig::default(),
    };

    let mut report = RunReport::new();

    for seed_offset in 0..args.seeds {
        let seed = args.seed.wrapping_add(seed_offset as u64);

        let mut runner = ScenarioRunner::new(seed)
            .with_clocks(args.clocks)
            .with_base_config(base.clone());
        if let Some(cycle) = args.checkpoint_at {
            runner = runner.with_checkpoint_at(cycle);
        }
        if let Some(path) = &args.checkpoint_file {
            runner = runner.with_checkpoint_file(path);
        }

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED - {} frames delivered",
                        scenario.name(),
                        seed,
                        result.metrics.frames_delivered
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            report.add(&result);
        }
    }

    if let Some(path) = &args.export {
        match report.write_to_file(path) {
            Ok(()) => {
                if !args.json {
                    info!("Report written to {}", path);
                }
            }
            Err(e) => error!("Failed to write report: {}", e),
        }
    }

    if args.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if report.all_passed() {
            info!("✅ All {} scenario runs passed!", report.total);
        } else {
            error!("❌ {}/{} scenario runs failed!", report.failed, report.total);
            for failed in report.failures() {
                error!(
                    "  - {} seed={}: {}",
                    failed.scenario,
                    failed.seed,
                    failed.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if !report.all_passed() {
        std::process::exit(1);
    }
}
