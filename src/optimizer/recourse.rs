//! Recourse subproblem: once the first-stage commitment is fixed, every
//! branch node of the tree is a small linear program over the mid-term
//! expansion fractions and the per-leaf short-term purchases. All products
//! with first-stage units reduce to constants, so the subproblem is a true
//! LP and the microlp backend solves it exactly.

use std::collections::BTreeMap;
use std::fmt;

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use serde::Serialize;

use crate::data::actions::CouplingKind;
use crate::data::instance::PortfolioInstance;
use crate::data::tree::Branch;

/// Objective weight floor for zero-probability leaves, so their purchases are
/// still driven to the cheapest feasible point.
const ZERO_PROBABILITY_WEIGHT: f64 = 1e-9;

#[derive(Debug)]
pub enum RecourseError {
    /// The branch cannot cover some leaf shortage with this commitment.
    Infeasible,
    Solver(String),
}

impl fmt::Display for RecourseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infeasible => write!(f, "no feasible recourse"),
            Self::Solver(message) => write!(f, "lp solver failure: {message}"),
        }
    }
}

/// Optimal recourse for one branch node.
#[derive(Debug, Clone, Serialize)]
pub struct BranchRecourse {
    pub branch: String,
    /// Expected recourse cost of the branch: mid-term cost plus the
    /// probability-weighted leaf costs.
    pub cost: f64,
    pub mid_term_cost: f64,
    /// Expansion fraction taken per mid-term action.
    pub mid_term: BTreeMap<String, f64>,
    pub leaves: Vec<LeafRecourse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeafRecourse {
    pub leaf: String,
    /// Probability conditional on the branch.
    pub probability: f64,
    /// Quantity purchased per short-term action.
    pub purchases: BTreeMap<String, f64>,
    pub unserved: f64,
    /// Final-stage cost in this leaf (purchases plus unserved penalty).
    pub cost: f64,
}

struct MidVar {
    variable: Variable,
    upper: f64,
    /// Supply added per unit of fraction: yield * committed units.
    supply_coef: f64,
}

struct BuyVar {
    variable: Variable,
    upper: f64,
}

/// Solve the recourse LP for one branch under a fixed commitment.
pub fn solve_branch_recourse(
    instance: &PortfolioInstance,
    units: &BTreeMap<String, u32>,
    branch: &Branch,
) -> Result<BranchRecourse, RecourseError> {
    let base_supply = instance.base_supply(units);
    let mut problem = ProblemVariables::new();
    let mut objective_terms: Vec<Expression> = Vec::new();

    // Mid-term expansion fractions. The capacity cap units*(1+frac) <= max
    // folds into the variable's upper bound.
    let mut mid_vars: BTreeMap<String, MidVar> = BTreeMap::new();
    for (name, expansion) in &instance.mid_term {
        let Some(action) = instance.long_term.get(name) else {
            continue;
        };
        let committed = f64::from(units.get(name).copied().unwrap_or(0));
        let slack = (f64::from(action.max_units) - committed).max(0.0);
        let upper = if committed > 0.0 {
            expansion.max_fraction.min(slack / committed)
        } else {
            expansion.max_fraction
        };
        if upper <= 0.0 {
            continue;
        }
        let supply_coef = action.yield_per_unit * committed;
        let variable = problem.add(variable().min(0.0).max(upper));
        objective_terms
            .push((expansion.cost_per_unit * supply_coef + expansion.fixed_cost) * variable);
        mid_vars.insert(
            name.clone(),
            MidVar {
                variable,
                upper,
                supply_coef,
            },
        );
    }

    // Per-leaf purchase and unserved variables.
    let mut leaf_buys: Vec<BTreeMap<String, BuyVar>> = Vec::with_capacity(branch.leaves.len());
    let mut leaf_unserved: Vec<Option<BuyVar>> = Vec::with_capacity(branch.leaves.len());
    for leaf in &branch.leaves {
        let weight = if leaf.probability > 0.0 {
            leaf.probability
        } else {
            ZERO_PROBABILITY_WEIGHT
        };
        let mut buys = BTreeMap::new();
        for (name, action) in &instance.short_term {
            let upper = static_purchase_cap(instance, units, action).min(action.max_quantity);
            if upper <= 0.0 {
                continue;
            }
            let variable = problem.add(variable().min(0.0).max(upper));
            objective_terms.push(weight * action.cost_per_unit * variable);
            buys.insert(name.clone(), BuyVar { variable, upper });
        }
        let unserved = leaf.unserved.as_ref().and_then(|allowance| {
            if allowance.max_quantity <= 0.0 {
                return None;
            }
            let variable = problem.add(variable().min(0.0).max(allowance.max_quantity));
            objective_terms.push(weight * allowance.cost_per_unit * variable);
            Some(BuyVar {
                variable,
                upper: allowance.max_quantity,
            })
        });
        leaf_buys.push(buys);
        leaf_unserved.push(unserved);
    }

    // Nothing to decide: the commitment either covers every leaf or fails.
    if mid_vars.is_empty()
        && leaf_buys.iter().all(BTreeMap::is_empty)
        && leaf_unserved.iter().all(Option::is_none)
    {
        return if branch
            .leaves
            .iter()
            .all(|leaf| base_supply >= leaf.shortage)
        {
            Ok(empty_recourse(branch))
        } else {
            Err(RecourseError::Infeasible)
        };
    }

    let objective: Expression = objective_terms.into_iter().sum();
    let mut model = problem.minimise(objective).using(default_solver);

    for (index, leaf) in branch.leaves.iter().enumerate() {
        // Supply balance.
        let deficit = leaf.shortage - base_supply;
        if deficit > 0.0 {
            let mut supply_terms: Vec<Expression> = Vec::new();
            for mid in mid_vars.values() {
                if mid.supply_coef > 0.0 {
                    supply_terms.push(mid.supply_coef * mid.variable);
                }
            }
            for buy in leaf_buys[index].values() {
                supply_terms.push(Expression::from(buy.variable));
            }
            if let Some(unserved) = &leaf_unserved[index] {
                supply_terms.push(Expression::from(unserved.variable));
            }
            if supply_terms.is_empty() {
                return Err(RecourseError::Infeasible);
            }
            let supply: Expression = supply_terms.into_iter().sum();
            model = model.with(constraint!(supply >= deficit));
        }

        // Coupling rows that involve a mid-term fraction.
        for (name, action) in &instance.short_term {
            let Some(buy) = leaf_buys[index].get(name) else {
                continue;
            };
            let Some(coupling) = &action.coupling else {
                continue;
            };
            let committed = f64::from(units.get(&coupling.action).copied().unwrap_or(0));
            let Some(mid) = mid_vars.get(&coupling.action) else {
                continue;
            };
            match coupling.kind {
                CouplingKind::UnusedLongTermCapacity => {
                    // Expansion consumes the same uncommitted capacity.
                    if committed > 0.0 {
                        let cap = coupling.quantity_per_unit
                            * (f64::from(
                                instance.long_term[&coupling.action].max_units,
                            ) - committed);
                        model = model.with(constraint!(
                            buy.variable
                                + (coupling.quantity_per_unit * committed) * mid.variable
                                <= cap
                        ));
                    }
                }
                CouplingKind::MidTermLevel => {
                    model = model.with(constraint!(
                        buy.variable
                            - (coupling.quantity_per_unit * committed) * mid.variable
                            <= 0.0
                    ));
                }
                CouplingKind::LongTermLevel => {}
            }
        }
    }

    let solution = model.solve().map_err(|err| match err {
        ResolutionError::Infeasible => RecourseError::Infeasible,
        other => RecourseError::Solver(other.to_string()),
    })?;

    extract_recourse(
        instance,
        branch,
        &solution,
        &mid_vars,
        &leaf_buys,
        &leaf_unserved,
    )
}

/// Purchase cap that does not depend on any LP variable. The shared-slack and
/// expansion-level couplings get their variable parts as explicit rows.
fn static_purchase_cap(
    instance: &PortfolioInstance,
    units: &BTreeMap<String, u32>,
    action: &crate::data::actions::ShortTermAction,
) -> f64 {
    let Some(coupling) = &action.coupling else {
        return f64::INFINITY;
    };
    let Some(coupled) = instance.long_term.get(&coupling.action) else {
        return f64::INFINITY;
    };
    let committed = f64::from(units.get(&coupling.action).copied().unwrap_or(0));
    match coupling.kind {
        CouplingKind::LongTermLevel => coupling.quantity_per_unit * committed,
        CouplingKind::UnusedLongTermCapacity => {
            coupling.quantity_per_unit * (f64::from(coupled.max_units) - committed).max(0.0)
        }
        CouplingKind::MidTermLevel => {
            let max_fraction = instance
                .mid_term
                .get(&coupling.action)
                .map(|expansion| expansion.max_fraction)
                .unwrap_or(0.0);
            let slack = (f64::from(coupled.max_units) - committed).max(0.0);
            coupling.quantity_per_unit * (committed * max_fraction).min(slack)
        }
    }
}

fn empty_recourse(branch: &Branch) -> BranchRecourse {
    BranchRecourse {
        branch: branch.name.clone(),
        cost: 0.0,
        mid_term_cost: 0.0,
        mid_term: BTreeMap::new(),
        leaves: branch
            .leaves
            .iter()
            .map(|leaf| LeafRecourse {
                leaf: leaf.name.clone(),
                probability: leaf.probability,
                purchases: BTreeMap::new(),
                unserved: 0.0,
                cost: 0.0,
            })
            .collect(),
    }
}

fn extract_recourse(
    instance: &PortfolioInstance,
    branch: &Branch,
    solution: &impl Solution,
    mid_vars: &BTreeMap<String, MidVar>,
    leaf_buys: &[BTreeMap<String, BuyVar>],
    leaf_unserved: &[Option<BuyVar>],
) -> Result<BranchRecourse, RecourseError> {
    let mut mid_term = BTreeMap::new();
    let mut mid_term_cost = 0.0;
    for (name, mid) in mid_vars {
        let fraction = solution.value(mid.variable).clamp(0.0, mid.upper);
        let expansion = &instance.mid_term[name];
        mid_term_cost +=
            (expansion.cost_per_unit * mid.supply_coef + expansion.fixed_cost) * fraction;
        mid_term.insert(name.clone(), fraction);
    }

    let mut leaves = Vec::with_capacity(branch.leaves.len());
    let mut expected_leaf_cost = 0.0;
    for (index, leaf) in branch.leaves.iter().enumerate() {
        let mut purchases = BTreeMap::new();
        let mut cost = 0.0;
        for (name, buy) in &leaf_buys[index] {
            let quantity = solution.value(buy.variable).clamp(0.0, buy.upper);
            cost += instance.short_term[name].cost_per_unit * quantity;
            purchases.insert(name.clone(), quantity);
        }
        let unserved = match (&leaf_unserved[index], &leaf.unserved) {
            (Some(var), Some(allowance)) => {
                let quantity = solution.value(var.variable).clamp(0.0, var.upper);
                cost += allowance.cost_per_unit * quantity;
                quantity
            }
            _ => 0.0,
        };
        expected_leaf_cost += leaf.probability * cost;
        leaves.push(LeafRecourse {
            leaf: leaf.name.clone(),
            probability: leaf.probability,
            purchases,
            unserved,
            cost,
        });
    }

    Ok(BranchRecourse {
        branch: branch.name.clone(),
        cost: mid_term_cost + expected_leaf_cost,
        mid_term_cost,
        mid_term,
        leaves,
    })
}
