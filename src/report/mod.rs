//! Rendering of solve results: compact tables for the terminal and the CSV
//! solution writer.

pub mod solution_writer;

pub use solution_writer::write_solution_csv;

use std::collections::BTreeMap;

use crate::optimizer::SolveReport;

/// Compact commitment rendering, `NAME=units` pairs in action order.
pub fn render_units(units: &BTreeMap<String, u32>) -> String {
    units
        .iter()
        .map(|(name, committed)| format!("{name}={committed}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Tab-separated ranking table, one portfolio per row.
pub fn render_table(report: &SolveReport) -> String {
    let mut lines = Vec::with_capacity(report.ranked.len() + 1);
    lines.push("rank\tportfolio\texpected_cost\tcvar\tworst_case\tscore".to_string());
    for (index, portfolio) in report.ranked.iter().enumerate() {
        lines.push(format!(
            "{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}",
            index + 1,
            render_units(&portfolio.units),
            portfolio.expected_cost,
            portfolio.cvar,
            portfolio.worst_case_cost,
            portfolio.score
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_render_in_action_order() {
        let mut units = BTreeMap::new();
        units.insert("RETRO".to_string(), 2);
        units.insert("OPTION".to_string(), 1);
        assert_eq!(render_units(&units), "OPTION=1,RETRO=2");
    }
}
