//! Ranking of evaluated portfolios. The score is expected cost plus an
//! optional weighted CVaR term over the exact scenario cost distribution,
//! so risk-averse runs penalize plans with expensive tails.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::optimizer::PortfolioEvaluation;

#[derive(Debug, Clone, Serialize)]
pub struct RankedPortfolio {
    pub units: BTreeMap<String, u32>,
    pub first_stage_cost: f64,
    pub expected_cost: f64,
    pub worst_case_cost: f64,
    pub cvar: f64,
    pub score: f64,
}

/// Conditional value-at-risk of a discrete cost distribution at level
/// `alpha`: the expected cost of the worst `1 - alpha` probability tail.
/// The boundary outcome is included fractionally. `alpha = 0` degenerates
/// to the expected cost.
pub fn conditional_value_at_risk(outcomes: &[(f64, f64)], alpha: f64) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let tail = (1.0 - alpha).max(1e-9);
    let mut sorted: Vec<(f64, f64)> = outcomes.to_vec();
    sorted.sort_by(|left, right| right.1.total_cmp(&left.1));

    let mut taken = 0.0;
    let mut cost_sum = 0.0;
    for (probability, cost) in sorted {
        if taken >= tail {
            break;
        }
        let take = probability.min(tail - taken);
        cost_sum += take * cost;
        taken += take;
    }
    if taken <= 0.0 {
        return 0.0;
    }
    cost_sum / taken
}

/// Rank feasible evaluations by `expected + cvar_weight * cvar`, ascending.
/// Ties break on worst case, then on the commitment itself so equal-cost
/// portfolios order deterministically.
pub fn rank_portfolios(
    evaluations: &[PortfolioEvaluation],
    cvar_weight: f64,
    risk_alpha: f64,
) -> Vec<RankedPortfolio> {
    let mut ranked: Vec<RankedPortfolio> = evaluations
        .iter()
        .map(|evaluation| {
            let distribution: Vec<(f64, f64)> = evaluation
                .outcomes
                .iter()
                .map(|outcome| (outcome.probability, outcome.cost))
                .collect();
            let cvar = conditional_value_at_risk(&distribution, risk_alpha);
            RankedPortfolio {
                units: evaluation.units.clone(),
                first_stage_cost: evaluation.first_stage_cost,
                expected_cost: evaluation.expected_cost,
                worst_case_cost: evaluation.worst_case_cost,
                cvar,
                score: evaluation.expected_cost + cvar_weight * cvar,
            }
        })
        .collect();

    ranked.sort_by(|left, right| {
        left.score
            .total_cmp(&right.score)
            .then_with(|| left.worst_case_cost.total_cmp(&right.worst_case_cost))
            .then_with(|| left.units.cmp(&right.units))
    });

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cvar_at_zero_alpha_is_the_expected_cost() {
        let outcomes = vec![(0.5, 10.0), (0.3, 20.0), (0.2, 100.0)];
        let expected = 0.5 * 10.0 + 0.3 * 20.0 + 0.2 * 100.0;
        let cvar = conditional_value_at_risk(&outcomes, 0.0);
        assert!((cvar - expected).abs() < 1e-9);
    }

    #[test]
    fn cvar_takes_the_worst_tail() {
        let outcomes = vec![(0.5, 10.0), (0.3, 20.0), (0.2, 100.0)];
        // 20% tail is exactly the worst outcome.
        let cvar = conditional_value_at_risk(&outcomes, 0.8);
        assert!((cvar - 100.0).abs() < 1e-9);
    }

    #[test]
    fn cvar_splits_the_boundary_outcome() {
        let outcomes = vec![(0.5, 10.0), (0.3, 20.0), (0.2, 100.0)];
        // 30% tail: all of the 0.2 at 100 plus a third of the 0.3 at 20.
        let cvar = conditional_value_at_risk(&outcomes, 0.7);
        let expected = (0.2 * 100.0 + 0.1 * 20.0) / 0.3;
        assert!((cvar - expected).abs() < 1e-9);
    }

    #[test]
    fn cvar_is_bounded_by_expected_and_worst_case() {
        let outcomes = vec![(0.25, 5.0), (0.25, 15.0), (0.25, 40.0), (0.25, 80.0)];
        let expected: f64 = outcomes.iter().map(|(p, c)| p * c).sum();
        for alpha in [0.0, 0.5, 0.9, 0.99] {
            let cvar = conditional_value_at_risk(&outcomes, alpha);
            assert!(cvar >= expected - 1e-9, "alpha {alpha}: {cvar} < {expected}");
            assert!(cvar <= 80.0 + 1e-9, "alpha {alpha}: {cvar} > worst case");
        }
    }
}
