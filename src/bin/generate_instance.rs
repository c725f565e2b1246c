//! Synthetic instance generator for stress tests and benchmarks.
//!
//! Usage: generate_instance <output-dir> [--model two-stage|three-stage]
//!        [--scenarios N] [--seed N]
//!
//! Writes a model_data.json with a seeded spread of shortage scenarios
//! around the capacity of a fixed action set.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::process;

use aqueduct::data::actions::{
    Coupling, CouplingKind, LongTermAction, MidTermExpansion, ShortTermAction, UnservedAllowance,
};
use aqueduct::data::instance::{
    InstanceFile, ModelKind, ProjectionRecord, ScenarioRecord, INSTANCE_FILE,
};
use aqueduct::rng::Rng;

fn main() {
    let args: Vec<String> = env::args().collect();
    process::exit(run(&args));
}

fn run(args: &[String]) -> i32 {
    let Some(output_dir) = args.get(1).filter(|arg| !arg.starts_with("--")) else {
        eprintln!(
            "usage: generate_instance <output-dir> [--model two-stage|three-stage] \
             [--scenarios N] [--seed N]"
        );
        return 2;
    };
    let model = match flag_value(args, "--model") {
        None => ModelKind::TwoStage,
        Some(raw) => match ModelKind::parse(raw) {
            Some(kind) => kind,
            None => {
                eprintln!("invalid --model '{raw}', expected two-stage or three-stage");
                return 2;
            }
        },
    };
    let scenarios = parse_usize_flag(args, "--scenarios", 5).max(1);
    let seed = parse_u64_flag(args, "--seed", 0);

    let file = match model {
        ModelKind::TwoStage => two_stage_file(scenarios, seed),
        ModelKind::ThreeStage => three_stage_file(scenarios, seed),
    };

    let dir = Path::new(output_dir);
    if let Err(err) = fs::create_dir_all(dir) {
        eprintln!("unable to create '{}': {err}", dir.display());
        return 1;
    }
    let path = dir.join(INSTANCE_FILE);
    let payload = match serde_json::to_string_pretty(&file) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("failed to serialize instance: {err}");
            return 1;
        }
    };
    if let Err(err) = fs::write(&path, payload) {
        eprintln!("unable to write '{}': {err}", path.display());
        return 1;
    }

    println!(
        "wrote {} instance: {} ({} scenarios, seed {seed})",
        model.as_str(),
        path.display(),
        scenarios
    );
    0
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

fn parse_usize_flag(args: &[String], name: &str, default: usize) -> usize {
    flag_value(args, name)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn parse_u64_flag(args: &[String], name: &str, default: u64) -> u64 {
    flag_value(args, name)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn action_tables() -> (
    BTreeMap<String, LongTermAction>,
    BTreeMap<String, ShortTermAction>,
) {
    let mut long_term = BTreeMap::new();
    long_term.insert(
        "LS_RETRO".to_string(),
        LongTermAction {
            max_units: 4,
            yield_per_unit: 25.0,
            cost_per_unit: 900.0,
        },
    );
    long_term.insert(
        "NEW_WELL".to_string(),
        LongTermAction {
            max_units: 2,
            yield_per_unit: 75.0,
            cost_per_unit: 2400.0,
        },
    );
    long_term.insert(
        "OPTION".to_string(),
        LongTermAction {
            max_units: 3,
            yield_per_unit: 0.0,
            cost_per_unit: 250.0,
        },
    );

    let mut short_term = BTreeMap::new();
    short_term.insert(
        "EX_OPTION".to_string(),
        ShortTermAction {
            max_quantity: 150.0,
            cost_per_unit: 12.0,
            coupling: Some(Coupling {
                kind: CouplingKind::LongTermLevel,
                action: "OPTION".to_string(),
                quantity_per_unit: 50.0,
            }),
        },
    );
    short_term.insert(
        "LS_RESTRICT".to_string(),
        ShortTermAction {
            max_quantity: 60.0,
            cost_per_unit: 18.0,
            coupling: Some(Coupling {
                kind: CouplingKind::UnusedLongTermCapacity,
                action: "LS_RETRO".to_string(),
                quantity_per_unit: 25.0,
            }),
        },
    );
    short_term.insert(
        "SPOT_TRANSFER".to_string(),
        ShortTermAction {
            max_quantity: 80.0,
            cost_per_unit: 45.0,
            coupling: None,
        },
    );
    (long_term, short_term)
}

/// Shortage spread: evenly spaced steps up to ~90% of total capacity with a
/// seeded jitter, the worst scenario carrying an unserved allowance.
fn scenario_table(count: usize, rng: &mut Rng, capacity: f64) -> BTreeMap<String, ScenarioRecord> {
    let mut scenarios = BTreeMap::new();
    let mut assigned = 0.0;
    for index in 0..count {
        let step = capacity * 0.9 * index as f64 / count.max(1) as f64;
        let jitter = rng.next_below(1000) as f64 / 1000.0 * capacity * 0.05;
        let probability = if index + 1 == count {
            1.0 - assigned
        } else {
            let p = 1.0 / count as f64;
            assigned += p;
            p
        };
        scenarios.insert(
            format!("S{index:02}"),
            ScenarioRecord {
                probability,
                shortage: step + jitter,
                unserved: (index + 1 == count).then(|| UnservedAllowance {
                    max_quantity: capacity * 0.2,
                    cost_per_unit: 400.0,
                }),
            },
        );
    }
    scenarios
}

fn two_stage_file(scenarios: usize, seed: u64) -> InstanceFile {
    let (long_term, short_term) = action_tables();
    let mut rng = Rng::new(seed);
    let scenarios = scenario_table(scenarios, &mut rng, 400.0);
    InstanceFile {
        long_term,
        mid_term: BTreeMap::new(),
        short_term,
        scenarios,
        projections: BTreeMap::new(),
    }
}

fn three_stage_file(scenarios: usize, seed: u64) -> InstanceFile {
    let (long_term, short_term) = action_tables();
    let mut mid_term = BTreeMap::new();
    mid_term.insert(
        "LS_RETRO".to_string(),
        MidTermExpansion {
            max_fraction: 0.5,
            cost_per_unit: 30.0,
            fixed_cost: 1000.0,
        },
    );
    let mut rng = Rng::new(seed);
    let mut projections = BTreeMap::new();
    projections.insert(
        "WARM_DRY".to_string(),
        ProjectionRecord {
            probability: 0.4,
            scenarios: scenario_table(scenarios, &mut rng, 420.0),
        },
    );
    projections.insert(
        "MEDIAN".to_string(),
        ProjectionRecord {
            probability: 0.6,
            scenarios: scenario_table(scenarios, &mut rng, 260.0),
        },
    );
    InstanceFile {
        long_term,
        mid_term,
        short_term,
        scenarios: BTreeMap::new(),
        projections,
    }
}
