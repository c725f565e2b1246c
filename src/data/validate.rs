use std::fmt;

use crate::data::actions::CouplingKind;
use crate::data::instance::PortfolioInstance;

/// Probability tables must sum to one within this tolerance.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDiagnostic {
    pub severity: ValidationSeverity,
    pub context: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn push(
        &mut self,
        severity: ValidationSeverity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(ValidationDiagnostic {
            severity,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity == ValidationSeverity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == ValidationSeverity::Error)
            .count()
    }

    /// One line per diagnostic, `severity: context: message`.
    pub fn render(&self) -> String {
        self.diagnostics
            .iter()
            .map(|diag| format!("{}: {}: {}", diag.severity, diag.context, diag.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn check_amount(report: &mut ValidationReport, context: &str, field: &str, value: f64) {
    if !value.is_finite() {
        report.push(
            ValidationSeverity::Error,
            context,
            format!("{field} must be finite, got {value}"),
        );
    } else if value < 0.0 {
        report.push(
            ValidationSeverity::Error,
            context,
            format!("{field} must be non-negative, got {value}"),
        );
    }
}

/// Validate a loaded instance. Errors make the instance unsolvable;
/// warnings flag data that is legal but probably unintended.
pub fn validate_instance(instance: &PortfolioInstance) -> ValidationReport {
    let mut report = ValidationReport::default();

    if instance.long_term.is_empty() {
        report.push(
            ValidationSeverity::Warning,
            "long_term",
            "no long-term actions; the portfolio is pure recourse",
        );
    }
    for (name, action) in &instance.long_term {
        let context = format!("long_term.{name}");
        check_amount(&mut report, &context, "yield_per_unit", action.yield_per_unit);
        check_amount(&mut report, &context, "cost_per_unit", action.cost_per_unit);
    }

    for (name, expansion) in &instance.mid_term {
        let context = format!("mid_term.{name}");
        if !instance.long_term.contains_key(name) {
            report.push(
                ValidationSeverity::Error,
                &context,
                "expands an unknown long-term action",
            );
        }
        check_amount(&mut report, &context, "max_fraction", expansion.max_fraction);
        check_amount(&mut report, &context, "cost_per_unit", expansion.cost_per_unit);
        check_amount(&mut report, &context, "fixed_cost", expansion.fixed_cost);
    }

    for (name, action) in &instance.short_term {
        let context = format!("short_term.{name}");
        check_amount(&mut report, &context, "max_quantity", action.max_quantity);
        check_amount(&mut report, &context, "cost_per_unit", action.cost_per_unit);
        if let Some(coupling) = &action.coupling {
            if !instance.long_term.contains_key(&coupling.action) {
                report.push(
                    ValidationSeverity::Error,
                    &context,
                    format!(
                        "coupling references unknown long-term action '{}'",
                        coupling.action
                    ),
                );
            } else if coupling.kind == CouplingKind::MidTermLevel
                && !instance.mid_term.contains_key(&coupling.action)
            {
                report.push(
                    ValidationSeverity::Error,
                    &context,
                    format!(
                        "mid_term_level coupling needs a mid_term entry for '{}'",
                        coupling.action
                    ),
                );
            }
            check_amount(
                &mut report,
                &context,
                "quantity_per_unit",
                coupling.quantity_per_unit,
            );
        }
    }

    validate_tree(instance, &mut report);
    report
}

fn validate_tree(instance: &PortfolioInstance, report: &mut ValidationReport) {
    let tree = &instance.tree;
    if tree.branches.is_empty() {
        report.push(ValidationSeverity::Error, "tree", "no scenarios defined");
        return;
    }

    let branch_total: f64 = tree.branches.iter().map(|b| b.probability).sum();
    if (branch_total - 1.0).abs() > PROBABILITY_TOLERANCE {
        report.push(
            ValidationSeverity::Error,
            "tree",
            format!("branch probabilities sum to {branch_total}, expected 1"),
        );
    }

    let deliverable_bound = max_deliverable_bound(instance);
    for branch in &tree.branches {
        let context = format!("tree.{}", branch.name);
        check_amount(report, &context, "probability", branch.probability);
        if branch.probability == 0.0 {
            report.push(ValidationSeverity::Warning, &context, "probability is zero");
        }
        if branch.leaves.is_empty() {
            report.push(ValidationSeverity::Error, &context, "projection has no scenarios");
            continue;
        }
        let leaf_total: f64 = branch.leaves.iter().map(|l| l.probability).sum();
        if tree.stages == 3 && (leaf_total - 1.0).abs() > PROBABILITY_TOLERANCE {
            report.push(
                ValidationSeverity::Error,
                &context,
                format!("scenario probabilities sum to {leaf_total}, expected 1"),
            );
        }
        for leaf in &branch.leaves {
            let context = format!("tree.{}", tree.leaf_node_name(branch, leaf));
            check_amount(report, &context, "probability", leaf.probability);
            check_amount(report, &context, "shortage", leaf.shortage);
            if tree.stages == 3 && leaf.probability == 0.0 {
                report.push(ValidationSeverity::Warning, &context, "probability is zero");
            }
            let mut reachable = deliverable_bound;
            if let Some(unserved) = &leaf.unserved {
                check_amount(report, &context, "unserved.max_quantity", unserved.max_quantity);
                check_amount(report, &context, "unserved.cost_per_unit", unserved.cost_per_unit);
                reachable += unserved.max_quantity;
            }
            if leaf.shortage > reachable {
                report.push(
                    ValidationSeverity::Warning,
                    &context,
                    format!(
                        "shortage {} exceeds the largest deliverable supply {reachable}; \
                         every portfolio will be infeasible here",
                        leaf.shortage
                    ),
                );
            }
        }
    }
}

/// Optimistic upper bound on supply: every action fully committed, expanded
/// and exercised. Used only to flag scenarios no portfolio can cover.
fn max_deliverable_bound(instance: &PortfolioInstance) -> f64 {
    let base: f64 = instance
        .long_term
        .values()
        .map(|action| action.supply(action.max_units))
        .sum();
    let expansion: f64 = instance
        .mid_term
        .iter()
        .filter_map(|(name, expansion)| {
            instance.long_term.get(name).map(|action| {
                let max_expandable = f64::from(action.max_units) * expansion.max_fraction.min(1.0);
                action.yield_per_unit * max_expandable
            })
        })
        .sum();
    let short_term: f64 = instance
        .short_term
        .values()
        .map(|action| action.max_quantity)
        .sum();
    base + expansion + short_term
}
