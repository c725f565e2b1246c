use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use aqueduct::data::instance::{ModelKind, DEFAULT_THREE_STAGE_DIR, DEFAULT_TWO_STAGE_DIR};
use aqueduct::optimizer::{
    evaluate_instance, solve_instance, SolveOptions, DEFAULT_RISK_ALPHA,
};

fn temp_instance(name: &str, body: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("aqueduct-{name}-{stamp}"));
    fs::create_dir_all(&dir).expect("temp dir");
    fs::write(dir.join("model_data.json"), body).expect("instance file");
    dir
}

/// One retrofit action (10 units firm supply each, 100 per unit) against a
/// spot market at 30/unit and a 50% chance of a 30-unit shortage. Committing
/// both retrofit units is cheapest: 200 + 0.5*10*30 = 350.
const TINY_TWO_STAGE: &str = r#"{
    "long_term": {
        "RETRO": {"max_units": 2, "yield_per_unit": 10.0, "cost_per_unit": 100.0}
    },
    "short_term": {
        "SPOT": {"max_quantity": 40.0, "cost_per_unit": 30.0}
    },
    "scenarios": {
        "WET": {"probability": 0.5, "shortage": 0.0},
        "DRY": {"probability": 0.5, "shortage": 30.0}
    }
}"#;

#[test]
fn tiny_two_stage_reaches_the_hand_computed_optimum() {
    let dir = temp_instance("tiny", TINY_TWO_STAGE);
    let report = solve_instance(&dir, &SolveOptions::default()).expect("solve should succeed");

    let best = report.best.as_ref().expect("best portfolio");
    assert_eq!(best.units["RETRO"], 2);
    assert!((best.expected_cost - 350.0).abs() < 1e-6);
    assert!((best.first_stage_cost - 200.0).abs() < 1e-6);
    assert!((best.worst_case_cost - 500.0).abs() < 1e-6);

    // The lattice has 3 candidates; the runner-up commits one unit.
    assert_eq!(report.candidates_examined, 3);
    assert_eq!(report.candidates_infeasible, 0);
    assert!((report.ranked[1].expected_cost - 400.0).abs() < 1e-6);
    assert!((report.ranked[2].expected_cost - 450.0).abs() < 1e-6);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn ranked_portfolios_are_sorted_and_best_is_minimal() {
    let report = solve_instance(Path::new(DEFAULT_TWO_STAGE_DIR), &SolveOptions::default())
        .expect("shipped instance should solve");

    let scores: Vec<f64> = report.ranked.iter().map(|p| p.score).collect();
    assert!(scores.windows(2).all(|pair| pair[0] <= pair[1] + 1e-9));

    let best = report.best.as_ref().expect("best portfolio");
    assert!((best.expected_cost - report.ranked[0].expected_cost).abs() < 1e-9);
    for portfolio in &report.ranked {
        assert!(best.expected_cost <= portfolio.expected_cost + 1e-9);
        assert!(portfolio.cvar + 1e-9 >= portfolio.expected_cost);
        assert!(portfolio.worst_case_cost + 1e-9 >= portfolio.cvar);
    }
}

#[test]
fn solve_is_deterministic() {
    let options = SolveOptions {
        cvar_weight: 0.5,
        ..SolveOptions::default()
    };
    let first = solve_instance(Path::new(DEFAULT_TWO_STAGE_DIR), &options).expect("first solve");
    let second = solve_instance(Path::new(DEFAULT_TWO_STAGE_DIR), &options).expect("second solve");

    let strip_timestamp = |report: &aqueduct::optimizer::SolveReport| {
        let mut value = serde_json::to_value(report).expect("report serializes");
        value["generated_at"] = serde_json::Value::Null;
        value
    };
    assert_eq!(strip_timestamp(&first), strip_timestamp(&second));
}

#[test]
fn cvar_weight_can_change_the_preferred_portfolio_order() {
    let neutral = solve_instance(Path::new(DEFAULT_TWO_STAGE_DIR), &SolveOptions::default())
        .expect("neutral solve");
    let averse = solve_instance(
        Path::new(DEFAULT_TWO_STAGE_DIR),
        &SolveOptions {
            cvar_weight: 5.0,
            risk_alpha: DEFAULT_RISK_ALPHA,
            ..SolveOptions::default()
        },
    )
    .expect("risk-averse solve");

    // Scores must include the CVaR term.
    for portfolio in &averse.ranked {
        assert!(
            (portfolio.score - (portfolio.expected_cost + 5.0 * portfolio.cvar)).abs() < 1e-6
        );
    }
    // The risk-averse best never has a worse tail than the neutral best.
    assert!(averse.ranked[0].cvar <= neutral.ranked[0].cvar + 1e-9);
}

#[test]
fn infeasible_scenarios_prune_candidates() {
    // Shortage of 35 with only 20 units of firm supply and a 10-unit spot
    // market: only full commitment plus the unserved allowance survives.
    let body = r#"{
        "long_term": {
            "RETRO": {"max_units": 2, "yield_per_unit": 10.0, "cost_per_unit": 100.0}
        },
        "short_term": {
            "SPOT": {"max_quantity": 10.0, "cost_per_unit": 30.0}
        },
        "scenarios": {
            "WET": {"probability": 0.5, "shortage": 0.0},
            "DRY": {
                "probability": 0.5,
                "shortage": 35.0,
                "unserved": {"max_quantity": 5.0, "cost_per_unit": 500.0}
            }
        }
    }"#;
    let dir = temp_instance("pruned", body);
    let report = solve_instance(&dir, &SolveOptions::default()).expect("solve should succeed");
    assert_eq!(report.candidates_examined, 1);
    assert_eq!(report.candidates_infeasible, 2);
    let best = report.best.as_ref().expect("best portfolio");
    assert_eq!(best.units["RETRO"], 2);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn unsolvable_instances_report_an_error() {
    let body = r#"{
        "long_term": {
            "RETRO": {"max_units": 1, "yield_per_unit": 10.0, "cost_per_unit": 100.0}
        },
        "short_term": {
            "SPOT": {"max_quantity": 10.0, "cost_per_unit": 30.0}
        },
        "scenarios": {
            "DRY": {"probability": 1.0, "shortage": 1000.0}
        }
    }"#;
    let dir = temp_instance("unsolvable", body);
    let err = solve_instance(&dir, &SolveOptions::default()).expect_err("nothing can cover 1000");
    assert!(err.contains("no candidate portfolio"), "unexpected: {err}");
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn invalid_options_are_rejected() {
    let err = solve_instance(
        Path::new(DEFAULT_TWO_STAGE_DIR),
        &SolveOptions {
            risk_alpha: 1.0,
            ..SolveOptions::default()
        },
    )
    .expect_err("alpha 1.0 is out of range");
    assert!(err.contains("risk alpha"));

    let err = solve_instance(
        Path::new(DEFAULT_TWO_STAGE_DIR),
        &SolveOptions {
            cvar_weight: -0.1,
            ..SolveOptions::default()
        },
    )
    .expect_err("negative weight");
    assert!(err.contains("cvar weight"));
}

#[test]
fn three_stage_solve_produces_branch_recourse() {
    let report = solve_instance(Path::new(DEFAULT_THREE_STAGE_DIR), &SolveOptions::default())
        .expect("shipped three-stage instance should solve");
    assert_eq!(report.model, ModelKind::ThreeStage);

    let best = report.best.as_ref().expect("best portfolio");
    assert_eq!(best.branches.len(), 2);
    assert_eq!(best.outcomes.len(), 6);
    let probability_total: f64 = best.outcomes.iter().map(|o| o.probability).sum();
    assert!((probability_total - 1.0).abs() < 1e-9);

    for recourse in &best.branches {
        for (name, fraction) in &recourse.mid_term {
            assert!(*fraction >= 0.0, "{name} fraction negative");
            assert!(*fraction <= 1.0 + 1e-9, "{name} fraction above cap");
        }
    }
}

#[test]
fn three_stage_recourse_reacts_to_the_projection() {
    let mut units = BTreeMap::new();
    units.insert("LS_RETRO".to_string(), 2);
    units.insert("OPTION".to_string(), 2);
    let evaluation = evaluate_instance(Path::new(DEFAULT_THREE_STAGE_DIR), None, &units)
        .expect("portfolio should be feasible");

    let warm_dry = evaluation
        .branches
        .iter()
        .find(|branch| branch.branch == "WARM_DRY")
        .expect("WARM_DRY recourse");
    let median = evaluation
        .branches
        .iter()
        .find(|branch| branch.branch == "MEDIAN")
        .expect("MEDIAN recourse");
    // The drier projection carries larger shortages, so its recourse costs more.
    assert!(warm_dry.cost > median.cost);
    // Expansion only pays off under the dry projection, where it displaces
    // the unserved penalty; the median projection is covered by exercise.
    assert!(warm_dry.mid_term.values().any(|fraction| *fraction > 1e-6));
    assert!(median.mid_term.values().all(|fraction| *fraction < 1e-6));
}
