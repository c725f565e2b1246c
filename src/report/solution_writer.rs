//! CSV solution writer: one row per decision variable per tree node, plus a
//! stage cost row per node. Format: `stage,node,variable,index,value`.

use std::path::Path;

use crate::data::instance::PortfolioInstance;
use crate::data::tree::ROOT_NODE;
use crate::optimizer::PortfolioEvaluation;

/// Write the best portfolio's full solution to a CSV file.
pub fn write_solution_csv(
    path: &Path,
    instance: &PortfolioInstance,
    evaluation: &PortfolioEvaluation,
) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|err| format!("unable to create '{}': {err}", path.display()))?;
    let mut write_row = |row: [&str; 5]| {
        writer
            .write_record(row)
            .map_err(|err| format!("unable to write '{}': {err}", path.display()))
    };

    write_row(["stage", "node", "variable", "index", "value"])?;

    // First stage: committed units and cost.
    for name in instance.long_term.keys() {
        let committed = evaluation.units.get(name).copied().unwrap_or(0).to_string();
        write_row(["1", ROOT_NODE, "units", name.as_str(), committed.as_str()])?;
    }
    let first_stage_cost = format!("{:.6}", evaluation.first_stage_cost);
    write_row(["1", ROOT_NODE, "stage_cost", "", first_stage_cost.as_str()])?;

    let leaf_stage = instance.tree.stages.to_string();
    for (branch, recourse) in instance.tree.branches.iter().zip(&evaluation.branches) {
        // Mid-term nodes only exist in three-stage trees.
        if instance.tree.stages == 3 {
            for name in instance.mid_term.keys() {
                let fraction =
                    format!("{:.6}", recourse.mid_term.get(name).copied().unwrap_or(0.0));
                write_row([
                    "2",
                    branch.name.as_str(),
                    "expansion_fraction",
                    name.as_str(),
                    fraction.as_str(),
                ])?;
            }
            let mid_term_cost = format!("{:.6}", recourse.mid_term_cost);
            write_row([
                "2",
                branch.name.as_str(),
                "stage_cost",
                "",
                mid_term_cost.as_str(),
            ])?;
        }

        for (leaf, leaf_recourse) in branch.leaves.iter().zip(&recourse.leaves) {
            let node = instance.tree.leaf_node_name(branch, leaf);
            for name in instance.short_term.keys() {
                let quantity =
                    format!("{:.6}", leaf_recourse.purchases.get(name).copied().unwrap_or(0.0));
                write_row([
                    leaf_stage.as_str(),
                    node.as_str(),
                    "purchase",
                    name.as_str(),
                    quantity.as_str(),
                ])?;
            }
            if leaf.unserved.is_some() {
                let unserved = format!("{:.6}", leaf_recourse.unserved);
                write_row([
                    leaf_stage.as_str(),
                    node.as_str(),
                    "unserved",
                    "",
                    unserved.as_str(),
                ])?;
            }
            let stage_cost = format!("{:.6}", leaf_recourse.cost);
            write_row([
                leaf_stage.as_str(),
                node.as_str(),
                "stage_cost",
                "",
                stage_cost.as_str(),
            ])?;
        }
    }

    writer
        .flush()
        .map_err(|err| format!("unable to write '{}': {err}", path.display()))
}
