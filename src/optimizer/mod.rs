pub mod portfolio_generator;
pub mod ranking;
pub mod recourse;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use crate::data::instance::{load_instance, ModelKind, PortfolioInstance};
use crate::data::validate::validate_instance;
use crate::optimizer::portfolio_generator::{
    CandidateStrategy, PortfolioGenerator, DEFAULT_MAX_CANDIDATES,
};
use crate::optimizer::ranking::{rank_portfolios, RankedPortfolio};
use crate::optimizer::recourse::{solve_branch_recourse, BranchRecourse, RecourseError};
use crate::parallel::{batch_ranges, WorkerPool};

/// Number of progress-reporting batches for solve-with-progress runs.
const SOLVE_PROGRESS_BATCH_COUNT: usize = 40;

pub const DEFAULT_RISK_ALPHA: f64 = 0.95;
pub const DEFAULT_TOP: usize = 10;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Force a model kind; None detects it from the instance file.
    pub model: Option<ModelKind>,
    /// Candidate cap passed to the generator. None enumerates everything.
    pub max_candidates: Option<usize>,
    /// Seed for candidate sampling above the cap.
    pub seed: u64,
    /// Worker threads for the sweep. 0 uses all cores.
    pub workers: usize,
    /// Weight of the CVaR term in the ranking score. 0 ranks purely by
    /// expected cost.
    pub cvar_weight: f64,
    /// CVaR tail level, in `[0, 1)`.
    pub risk_alpha: f64,
    /// Number of ranked portfolios kept in the report.
    pub top: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_candidates: Some(DEFAULT_MAX_CANDIDATES),
            seed: 0,
            workers: 0,
            cvar_weight: 0.0,
            risk_alpha: DEFAULT_RISK_ALPHA,
            top: DEFAULT_TOP,
        }
    }
}

/// Total cost of one root-to-leaf outcome under a fixed commitment.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeCost {
    pub branch: String,
    pub leaf: String,
    pub probability: f64,
    pub cost: f64,
}

/// Full evaluation of one first-stage commitment: optimal recourse in every
/// branch plus the resulting cost distribution.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioEvaluation {
    pub units: BTreeMap<String, u32>,
    pub first_stage_cost: f64,
    pub expected_cost: f64,
    pub worst_case_cost: f64,
    pub branches: Vec<BranchRecourse>,
    pub outcomes: Vec<OutcomeCost>,
}

#[derive(Debug)]
pub enum EvaluateError {
    Infeasible { branch: String },
    Solver(String),
}

impl fmt::Display for EvaluateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infeasible { branch } => {
                write!(f, "portfolio cannot cover the shortage under '{branch}'")
            }
            Self::Solver(message) => write!(f, "lp solver failure: {message}"),
        }
    }
}

/// Evaluate a fixed commitment against every branch of the tree.
pub fn evaluate_portfolio(
    instance: &PortfolioInstance,
    units: &BTreeMap<String, u32>,
) -> Result<PortfolioEvaluation, EvaluateError> {
    let first_stage_cost = instance.first_stage_cost(units);
    let mut branches = Vec::with_capacity(instance.tree.branches.len());
    for branch in &instance.tree.branches {
        match solve_branch_recourse(instance, units, branch) {
            Ok(recourse) => branches.push(recourse),
            Err(RecourseError::Infeasible) => {
                return Err(EvaluateError::Infeasible {
                    branch: branch.name.clone(),
                })
            }
            Err(RecourseError::Solver(message)) => return Err(EvaluateError::Solver(message)),
        }
    }

    let expected_cost = first_stage_cost
        + instance
            .tree
            .branches
            .iter()
            .zip(&branches)
            .map(|(branch, recourse)| branch.probability * recourse.cost)
            .sum::<f64>();

    let mut outcomes = Vec::with_capacity(instance.tree.leaf_count());
    let mut worst_case_cost = first_stage_cost;
    for (branch, recourse) in instance.tree.branches.iter().zip(&branches) {
        for leaf in &recourse.leaves {
            let cost = first_stage_cost + recourse.mid_term_cost + leaf.cost;
            worst_case_cost = worst_case_cost.max(cost);
            outcomes.push(OutcomeCost {
                branch: branch.name.clone(),
                leaf: leaf.leaf.clone(),
                probability: branch.probability * leaf.probability,
                cost,
            });
        }
    }

    Ok(PortfolioEvaluation {
        units: units.clone(),
        first_stage_cost,
        expected_cost,
        worst_case_cost,
        branches,
        outcomes,
    })
}

/// Load, validate and evaluate one explicit commitment.
pub fn evaluate_instance(
    dir: &Path,
    model: Option<ModelKind>,
    units: &BTreeMap<String, u32>,
) -> Result<PortfolioEvaluation, String> {
    let instance = load_instance(dir, model)?;
    let validation = validate_instance(&instance);
    if validation.has_errors() {
        return Err(format!(
            "instance validation failed:\n{}",
            validation.render()
        ));
    }
    for (name, &committed) in units {
        let Some(action) = instance.long_term.get(name) else {
            return Err(format!("unknown long-term action '{name}'"));
        };
        if committed > action.max_units {
            return Err(format!(
                "'{name}' commits {committed} units, max is {}",
                action.max_units
            ));
        }
    }
    evaluate_portfolio(&instance, units).map_err(|err| err.to_string())
}

/// Result of a full solve run.
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub instance_dir: String,
    pub model: ModelKind,
    /// RFC3339 timestamp of the run.
    pub generated_at: String,
    /// Size of the full commitment lattice (saturating).
    pub candidate_space: u64,
    pub candidates_examined: usize,
    pub candidates_infeasible: usize,
    /// True when the lattice was sampled rather than enumerated.
    pub truncated: bool,
    pub ranked: Vec<RankedPortfolio>,
    pub best: Option<PortfolioEvaluation>,
}

/// Solve an instance directory: enumerate, evaluate in parallel, rank.
pub fn solve_instance(dir: &Path, options: &SolveOptions) -> Result<SolveReport, String> {
    solve_instance_with_progress(dir, options, |_, _| {})
}

/// Like [solve_instance] but runs the sweep in batches and invokes
/// `on_progress(done, total)` between them.
pub fn solve_instance_with_progress(
    dir: &Path,
    options: &SolveOptions,
    mut on_progress: impl FnMut(usize, usize),
) -> Result<SolveReport, String> {
    if !(0.0..1.0).contains(&options.risk_alpha) {
        return Err(format!(
            "risk alpha must be in [0, 1), got {}",
            options.risk_alpha
        ));
    }
    if options.cvar_weight < 0.0 {
        return Err(format!(
            "cvar weight must be non-negative, got {}",
            options.cvar_weight
        ));
    }

    let instance = load_instance(dir, options.model)?;
    let validation = validate_instance(&instance);
    if validation.has_errors() {
        return Err(format!(
            "instance validation failed:\n{}",
            validation.render()
        ));
    }

    let generated = PortfolioGenerator::with_strategy(CandidateStrategy {
        max_candidates: options.max_candidates,
        seed: options.seed,
    })
    .generate(&instance);
    let total = generated.candidates.len();
    if total == 0 {
        return Err(format!(
            "no candidate portfolio can cover the worst shortage \
             ({} candidates pruned by the supply bound)",
            generated.pruned
        ));
    }
    on_progress(0, total);

    let pool = WorkerPool::with_workers(options.workers);
    let mut evaluations: Vec<PortfolioEvaluation> = Vec::with_capacity(total);
    let mut infeasible = generated.pruned;
    for (start, end) in batch_ranges(total, SOLVE_PROGRESS_BATCH_COUNT.min(total)) {
        let batch = &generated.candidates[start..end];
        let results: Vec<Result<PortfolioEvaluation, EvaluateError>> = pool.install(|| {
            batch
                .par_iter()
                .map(|candidate| evaluate_portfolio(&instance, &candidate.units))
                .collect()
        });
        for result in results {
            match result {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(EvaluateError::Infeasible { .. }) => infeasible += 1,
                Err(EvaluateError::Solver(message)) => {
                    return Err(format!("lp solver failure: {message}"))
                }
            }
        }
        on_progress(end, total);
    }
    if evaluations.is_empty() {
        return Err(format!("all {total} candidate portfolios were infeasible"));
    }

    let ranked = rank_portfolios(&evaluations, options.cvar_weight, options.risk_alpha);
    let best_units = ranked[0].units.clone();
    let best = evaluations
        .into_iter()
        .find(|evaluation| evaluation.units == best_units);
    let ranked: Vec<RankedPortfolio> =
        ranked.into_iter().take(options.top.max(1)).collect();

    Ok(SolveReport {
        instance_dir: dir.display().to_string(),
        model: instance.kind,
        generated_at: chrono::Utc::now().to_rfc3339(),
        candidate_space: generated.space.min(u128::from(u64::MAX)) as u64,
        candidates_examined: total,
        candidates_infeasible: infeasible,
        truncated: generated.truncated,
        ranked,
        best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::actions::{LongTermAction, ShortTermAction};
    use crate::data::tree::{Branch, Leaf, ScenarioTree};

    fn small_instance() -> PortfolioInstance {
        let mut long_term = BTreeMap::new();
        long_term.insert(
            "RETRO".to_string(),
            LongTermAction {
                max_units: 2,
                yield_per_unit: 10.0,
                cost_per_unit: 100.0,
            },
        );
        let mut short_term = BTreeMap::new();
        short_term.insert(
            "SPOT".to_string(),
            ShortTermAction {
                max_quantity: 40.0,
                cost_per_unit: 30.0,
                coupling: None,
            },
        );
        PortfolioInstance {
            kind: ModelKind::TwoStage,
            long_term,
            mid_term: BTreeMap::new(),
            short_term,
            tree: ScenarioTree {
                stages: 2,
                branches: vec![
                    Branch {
                        name: "WET".to_string(),
                        probability: 0.5,
                        leaves: vec![Leaf {
                            name: "WET".to_string(),
                            probability: 1.0,
                            shortage: 0.0,
                            unserved: None,
                        }],
                    },
                    Branch {
                        name: "DRY".to_string(),
                        probability: 0.5,
                        leaves: vec![Leaf {
                            name: "DRY".to_string(),
                            probability: 1.0,
                            shortage: 30.0,
                            unserved: None,
                        }],
                    },
                ],
            },
        }
    }

    #[test]
    fn evaluation_weights_branch_costs_by_probability() {
        let instance = small_instance();
        let mut units = BTreeMap::new();
        units.insert("RETRO".to_string(), 1);
        let evaluation = evaluate_portfolio(&instance, &units).expect("feasible");
        // First stage 100; DRY buys 20 spot units at 30 with probability 0.5.
        assert!((evaluation.first_stage_cost - 100.0).abs() < 1e-6);
        assert!((evaluation.expected_cost - (100.0 + 0.5 * 600.0)).abs() < 1e-6);
        assert!((evaluation.worst_case_cost - 700.0).abs() < 1e-6);
        assert_eq!(evaluation.outcomes.len(), 2);
    }

    #[test]
    fn evaluation_rejects_uncoverable_commitments() {
        let mut instance = small_instance();
        instance.tree.branches[1].leaves[0].shortage = 200.0;
        let units = BTreeMap::new();
        let err = evaluate_portfolio(&instance, &units).expect_err("cannot cover 200");
        assert!(matches!(err, EvaluateError::Infeasible { .. }));
    }
}
