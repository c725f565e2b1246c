//! First-stage candidate generation: every integer commitment vector in the
//! unit lattice, odometer-ordered over action names. Above the candidate cap
//! a seeded index sample keeps the sweep bounded and reproducible.

use std::collections::{BTreeMap, BTreeSet};

use crate::data::actions::CouplingKind;
use crate::data::instance::PortfolioInstance;
use crate::data::tree::Leaf;
use crate::rng::Rng;

/// Cap applied when the caller does not choose one.
pub const DEFAULT_MAX_CANDIDATES: usize = 20_000;

/// A first-stage commitment: units per long-term action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioCandidate {
    pub units: BTreeMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct CandidateStrategy {
    /// When the lattice is larger, a seeded sample of this many candidates
    /// is drawn instead. None disables the cap (full enumeration).
    pub max_candidates: Option<usize>,
    pub seed: u64,
}

impl Default for CandidateStrategy {
    fn default() -> Self {
        Self {
            max_candidates: Some(DEFAULT_MAX_CANDIDATES),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedCandidates {
    pub candidates: Vec<PortfolioCandidate>,
    /// Full lattice size before capping or pruning.
    pub space: u128,
    /// True when the lattice was sampled instead of enumerated.
    pub truncated: bool,
    /// Candidates dropped by the supply-bound pre-filter.
    pub pruned: usize,
}

#[derive(Debug, Clone)]
pub struct PortfolioGenerator {
    strategy: CandidateStrategy,
}

impl PortfolioGenerator {
    pub fn new() -> Self {
        Self {
            strategy: CandidateStrategy::default(),
        }
    }

    pub fn with_strategy(strategy: CandidateStrategy) -> Self {
        Self { strategy }
    }

    pub fn generate(&self, instance: &PortfolioInstance) -> GeneratedCandidates {
        let names: Vec<&String> = instance.long_term.keys().collect();
        let bases: Vec<u128> = instance
            .long_term
            .values()
            .map(|action| u128::from(action.max_units) + 1)
            .collect();
        let space: u128 = bases.iter().product();

        let cap = self.strategy.max_candidates.map(|c| c.max(1) as u128);
        let (indices, truncated) = match cap {
            Some(cap) if space > cap => (sample_indices(space, cap, self.strategy.seed), true),
            _ => ((0..space).collect(), false),
        };

        let mut pruned = 0;
        let candidates = indices
            .into_iter()
            .map(|index| decode_candidate(index, &names, &bases))
            .filter(|candidate| {
                let keep = covers_every_leaf(instance, &candidate.units);
                if !keep {
                    pruned += 1;
                }
                keep
            })
            .collect();

        GeneratedCandidates {
            candidates,
            space,
            truncated,
            pruned,
        }
    }
}

impl Default for PortfolioGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a lattice index into a commitment vector. The first action name
/// (sorted order) varies fastest.
fn decode_candidate(mut index: u128, names: &[&String], bases: &[u128]) -> PortfolioCandidate {
    let mut units = BTreeMap::new();
    for (name, base) in names.iter().zip(bases) {
        units.insert((*name).clone(), (index % base) as u32);
        index /= base;
    }
    PortfolioCandidate { units }
}

/// Distinct seeded sample of `cap` lattice indices, ascending. Index 0 (the
/// do-nothing portfolio) is always included as a baseline.
fn sample_indices(space: u128, cap: u128, seed: u64) -> Vec<u128> {
    let mut picked = BTreeSet::new();
    picked.insert(0u128);
    let mut rng = Rng::new(seed);
    while (picked.len() as u128) < cap {
        let wide = (u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64());
        picked.insert(wide % space);
    }
    picked.into_iter().collect()
}

/// Cheap feasibility pre-filter: optimistic supply bound per leaf. Individual
/// caps are summed without shared-slack accounting, so the bound only ever
/// overestimates; a candidate rejected here is infeasible in the exact LP too.
pub fn covers_every_leaf(instance: &PortfolioInstance, units: &BTreeMap<String, u32>) -> bool {
    let base = instance.base_supply(units);
    let expansion: f64 = instance
        .mid_term
        .iter()
        .filter_map(|(name, expansion)| {
            instance.long_term.get(name).map(|action| {
                let committed = f64::from(units.get(name).copied().unwrap_or(0));
                let slack = f64::from(action.max_units) - committed;
                action.yield_per_unit * (committed * expansion.max_fraction).min(slack.max(0.0))
            })
        })
        .sum();
    let short_term: f64 = instance
        .short_term
        .values()
        .map(|action| {
            let cap = short_term_cap(instance, units, action);
            cap.min(action.max_quantity)
        })
        .sum();

    instance
        .tree
        .branches
        .iter()
        .flat_map(|branch| branch.leaves.iter())
        .all(|leaf| base + expansion + short_term + unserved_cap(leaf) >= leaf.shortage)
}

fn unserved_cap(leaf: &Leaf) -> f64 {
    leaf.unserved
        .as_ref()
        .map(|allowance| allowance.max_quantity)
        .unwrap_or(0.0)
}

fn short_term_cap(
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
        CouplingKind::UnusedLongTermCapacity => {
            coupling.quantity_per_unit * (f64::from(coupled.max_units) - committed).max(0.0)
        }
        CouplingKind::LongTermLevel => coupling.quantity_per_unit * committed,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::actions::{LongTermAction, ShortTermAction};
    use crate::data::instance::ModelKind;
    use crate::data::tree::{Branch, Leaf, ScenarioTree};

    fn instance_with_two_actions() -> PortfolioInstance {
        let mut long_term = BTreeMap::new();
        long_term.insert(
            "OPTION".to_string(),
            LongTermAction {
                max_units: 2,
                yield_per_unit: 0.0,
                cost_per_unit: 10.0,
            },
        );
        long_term.insert(
            "RETRO".to_string(),
            LongTermAction {
                max_units: 1,
                yield_per_unit: 5.0,
                cost_per_unit: 50.0,
            },
        );
        let mut short_term = BTreeMap::new();
        short_term.insert(
            "SPOT".to_string(),
            ShortTermAction {
                max_quantity: 100.0,
                cost_per_unit: 1.0,
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
                branches: vec![Branch {
                    name: "DRY".to_string(),
                    probability: 1.0,
                    leaves: vec![Leaf {
                        name: "DRY".to_string(),
                        probability: 1.0,
                        shortage: 10.0,
                        unserved: None,
                    }],
                }],
            },
        }
    }

    #[test]
    fn enumerates_the_full_lattice_in_order() {
        let generated = PortfolioGenerator::new().generate(&instance_with_two_actions());
        assert_eq!(generated.space, 6);
        assert!(!generated.truncated);
        assert_eq!(generated.candidates.len(), 6);
        // First action name (OPTION) varies fastest.
        assert_eq!(generated.candidates[0].units["OPTION"], 0);
        assert_eq!(generated.candidates[1].units["OPTION"], 1);
        assert_eq!(generated.candidates[2].units["OPTION"], 2);
        assert_eq!(generated.candidates[3].units["RETRO"], 1);
    }

    #[test]
    fn sampling_is_deterministic_and_keeps_the_baseline() {
        let mut instance = instance_with_two_actions();
        instance.long_term.get_mut("OPTION").unwrap().max_units = 1000;
        let strategy = CandidateStrategy {
            max_candidates: Some(16),
            seed: 9,
        };
        let a = PortfolioGenerator::with_strategy(strategy.clone()).generate(&instance);
        let b = PortfolioGenerator::with_strategy(strategy).generate(&instance);
        assert!(a.truncated);
        assert_eq!(a.candidates.len(), 16);
        assert_eq!(a.candidates, b.candidates);
        assert!(a.candidates[0].units.values().all(|&u| u == 0));
    }

    #[test]
    fn prefilter_drops_candidates_that_cannot_cover() {
        let mut instance = instance_with_two_actions();
        instance.short_term.get_mut("SPOT").unwrap().max_quantity = 6.0;
        // Only portfolios with the retrofit committed reach 10 units of supply.
        let generated = PortfolioGenerator::new().generate(&instance);
        assert_eq!(generated.pruned, 3);
        assert!(generated
            .candidates
            .iter()
            .all(|candidate| candidate.units["RETRO"] == 1));
    }
}
