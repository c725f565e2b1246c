//! Scenario tree: the uncertainty structure a portfolio is planned against.
//!
//! Two-stage instances branch straight from the root into leaf scenarios;
//! three-stage instances branch into projections first, each with its own
//! conditional shortage scenarios. Both load into the same branch/leaf tree
//! (a two-stage scenario becomes a single-leaf branch) so one recourse
//! solver and one report path serve both forms.

use serde::Serialize;

use crate::data::actions::UnservedAllowance;

/// Node name used for the first stage in reports and solution files.
pub const ROOT_NODE: &str = "root";

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioTree {
    /// 2 for two-stage instances, 3 for three-stage.
    pub stages: u8,
    pub branches: Vec<Branch>,
}

/// Intermediate node. For two-stage trees this is the scenario itself and
/// carries a single leaf with conditional probability 1.
#[derive(Debug, Clone, Serialize)]
pub struct Branch {
    pub name: String,
    pub probability: f64,
    pub leaves: Vec<Leaf>,
}

/// Final-stage scenario: the realized shortage to cover.
#[derive(Debug, Clone, Serialize)]
pub struct Leaf {
    pub name: String,
    /// Probability conditional on the parent branch.
    pub probability: f64,
    pub shortage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unserved: Option<UnservedAllowance>,
}

/// One root-to-leaf path with its joint probability.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub branch: String,
    pub leaf: String,
    pub probability: f64,
    pub shortage: f64,
}

impl ScenarioTree {
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.branches.iter().map(|branch| branch.leaves.len()).sum()
    }

    /// All root-to-leaf paths with joint probabilities, in tree order.
    pub fn outcomes(&self) -> Vec<ScenarioOutcome> {
        let mut outcomes = Vec::with_capacity(self.leaf_count());
        for branch in &self.branches {
            for leaf in &branch.leaves {
                outcomes.push(ScenarioOutcome {
                    branch: branch.name.clone(),
                    leaf: leaf.name.clone(),
                    probability: branch.probability * leaf.probability,
                    shortage: leaf.shortage,
                });
            }
        }
        outcomes
    }

    /// Largest shortage anywhere in the tree.
    pub fn max_shortage(&self) -> f64 {
        self.branches
            .iter()
            .flat_map(|branch| branch.leaves.iter())
            .map(|leaf| leaf.shortage)
            .fold(0.0, f64::max)
    }

    /// Node name for a leaf in reports: two-stage leaves are the scenario
    /// itself; three-stage leaves are qualified by their branch.
    pub fn leaf_node_name(&self, branch: &Branch, leaf: &Leaf) -> String {
        if self.stages == 2 {
            leaf.name.clone()
        } else {
            format!("{}/{}", branch.name, leaf.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ScenarioTree {
        ScenarioTree {
            stages: 3,
            branches: vec![
                Branch {
                    name: "WARM_DRY".to_string(),
                    probability: 0.4,
                    leaves: vec![
                        Leaf {
                            name: "MILD".to_string(),
                            probability: 0.25,
                            shortage: 50.0,
                            unserved: None,
                        },
                        Leaf {
                            name: "SEVERE".to_string(),
                            probability: 0.75,
                            shortage: 200.0,
                            unserved: None,
                        },
                    ],
                },
                Branch {
                    name: "MEDIAN".to_string(),
                    probability: 0.6,
                    leaves: vec![Leaf {
                        name: "NONE".to_string(),
                        probability: 1.0,
                        shortage: 0.0,
                        unserved: None,
                    }],
                },
            ],
        }
    }

    #[test]
    fn outcomes_carry_joint_probabilities() {
        let tree = sample_tree();
        let outcomes = tree.outcomes();
        assert_eq!(outcomes.len(), 3);
        assert!((outcomes[0].probability - 0.1).abs() < 1e-12);
        assert!((outcomes[1].probability - 0.3).abs() < 1e-12);
        assert!((outcomes[2].probability - 0.6).abs() < 1e-12);
        let total: f64 = outcomes.iter().map(|o| o.probability).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn max_shortage_scans_all_leaves() {
        assert_eq!(sample_tree().max_shortage(), 200.0);
    }

    #[test]
    fn leaf_node_names_follow_stage_count() {
        let mut tree = sample_tree();
        let name = tree.leaf_node_name(&tree.branches[0], &tree.branches[0].leaves[1]);
        assert_eq!(name, "WARM_DRY/SEVERE");
        tree.stages = 2;
        let name = tree.leaf_node_name(&tree.branches[0], &tree.branches[0].leaves[1]);
        assert_eq!(name, "SEVERE");
    }
}
