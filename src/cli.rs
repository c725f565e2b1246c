use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::data::instance::{load_instance, ModelKind};
use crate::data::validate::validate_instance;
use crate::optimizer::portfolio_generator::DEFAULT_MAX_CANDIDATES;
use crate::optimizer::{
    evaluate_instance, solve_instance, solve_instance_with_progress, SolveOptions,
    DEFAULT_RISK_ALPHA, DEFAULT_TOP,
};
use crate::report::{render_table, write_solution_csv};
use crate::server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Solve,
    Evaluate,
    Validate,
    Scenarios,
    Serve,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("solve") => Some(Command::Solve),
        Some("evaluate") => Some(Command::Evaluate),
        Some("validate") => Some(Command::Validate),
        Some("scenarios") => Some(Command::Scenarios),
        Some("serve") => Some(Command::Serve),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    match parse_command(args) {
        Some(Command::Solve) => handle_solve(args),
        Some(Command::Evaluate) => handle_evaluate(args),
        Some(Command::Validate) => handle_validate(args),
        Some(Command::Scenarios) => handle_scenarios(args),
        Some(Command::Serve) => handle_serve(),
        None => {
            eprintln!("usage: aqueduct <solve|evaluate|validate|scenarios|serve>");
            2
        }
    }
}

/// Flags that take no value; everything else starting with `--` consumes the
/// next argument.
const BOOL_FLAGS: &[&str] = &["--table", "--progress"];

fn positionals(args: &[String]) -> Vec<&str> {
    let mut found = Vec::new();
    let mut index = 2;
    while index < args.len() {
        let arg = args[index].as_str();
        if arg.starts_with("--") {
            if !BOOL_FLAGS.contains(&arg) {
                index += 1;
            }
        } else {
            found.push(arg);
        }
        index += 1;
    }
    found
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}

fn parse_usize_flag(args: &[String], name: &str, default: usize) -> usize {
    match flag_value(args, name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("invalid {name} '{raw}', using {default}");
            default
        }),
        None => default,
    }
}

fn parse_u64_flag(args: &[String], name: &str, default: u64) -> u64 {
    match flag_value(args, name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("invalid {name} '{raw}', using {default}");
            default
        }),
        None => default,
    }
}

fn parse_f64_flag(args: &[String], name: &str, default: f64) -> f64 {
    match flag_value(args, name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("invalid {name} '{raw}', using {default}");
            default
        }),
        None => default,
    }
}

/// `--model` is structural: an unknown value is a usage error, not a default.
fn parse_model_flag(args: &[String]) -> Result<Option<ModelKind>, i32> {
    match flag_value(args, "--model") {
        None => Ok(None),
        Some(raw) => match ModelKind::parse(raw) {
            Some(kind) => Ok(Some(kind)),
            None => {
                eprintln!("invalid --model '{raw}', expected two-stage or three-stage");
                Err(2)
            }
        },
    }
}

fn handle_solve(args: &[String]) -> i32 {
    let found = positionals(args);
    let Some(dir) = found.first() else {
        eprintln!(
            "usage: aqueduct solve <instance-dir> [--model two-stage|three-stage] \
             [--max-candidates N] [--seed N] [--workers N] [--cvar-weight W] \
             [--risk-alpha A] [--top N] [--csv PATH] [--table] [--progress]"
        );
        return 2;
    };
    let model = match parse_model_flag(args) {
        Ok(model) => model,
        Err(code) => return code,
    };
    let options = SolveOptions {
        model,
        max_candidates: Some(parse_usize_flag(args, "--max-candidates", DEFAULT_MAX_CANDIDATES)),
        seed: parse_u64_flag(args, "--seed", 0),
        workers: parse_usize_flag(args, "--workers", 0),
        cvar_weight: parse_f64_flag(args, "--cvar-weight", 0.0),
        risk_alpha: parse_f64_flag(args, "--risk-alpha", DEFAULT_RISK_ALPHA),
        top: parse_usize_flag(args, "--top", DEFAULT_TOP),
    };

    let dir = Path::new(dir);
    let solved = if has_flag(args, "--progress") {
        solve_instance_with_progress(dir, &options, |done, total| {
            eprintln!("evaluated {done}/{total} candidates");
        })
    } else {
        solve_instance(dir, &options)
    };
    let report = match solved {
        Ok(report) => report,
        Err(err) => {
            eprintln!("solve failed: {err}");
            return 1;
        }
    };

    if let Some(csv_path) = flag_value(args, "--csv") {
        let Some(best) = &report.best else {
            eprintln!("no feasible portfolio to write");
            return 1;
        };
        let instance = match load_instance(dir, options.model) {
            Ok(instance) => instance,
            Err(err) => {
                eprintln!("{err}");
                return 1;
            }
        };
        if let Err(err) = write_solution_csv(Path::new(csv_path), &instance, best) {
            eprintln!("{err}");
            return 1;
        }
    }

    if has_flag(args, "--table") {
        println!("{}", render_table(&report));
        return 0;
    }
    match serde_json::to_string_pretty(&report) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize solve report: {err}");
            1
        }
    }
}

fn handle_evaluate(args: &[String]) -> i32 {
    let found = positionals(args);
    let (Some(dir), Some(portfolio_path)) = (found.first(), found.get(1)) else {
        eprintln!("usage: aqueduct evaluate <instance-dir> <portfolio.json> [--model ...]");
        return 2;
    };
    let model = match parse_model_flag(args) {
        Ok(model) => model,
        Err(code) => return code,
    };

    let raw = match fs::read_to_string(portfolio_path) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("unable to read '{portfolio_path}': {err}");
            return 1;
        }
    };
    let units: BTreeMap<String, u32> = match serde_json::from_str(&raw) {
        Ok(units) => units,
        Err(err) => {
            eprintln!("unable to parse portfolio '{portfolio_path}': {err}");
            return 1;
        }
    };

    match evaluate_instance(Path::new(dir), model, &units) {
        Ok(evaluation) => match serde_json::to_string_pretty(&evaluation) {
            Ok(payload) => {
                println!("{payload}");
                0
            }
            Err(err) => {
                eprintln!("failed to serialize evaluation: {err}");
                1
            }
        },
        Err(err) => {
            eprintln!("evaluate failed: {err}");
            1
        }
    }
}

fn handle_validate(args: &[String]) -> i32 {
    let found = positionals(args);
    let Some(dir) = found.first() else {
        eprintln!("usage: aqueduct validate <instance-dir> [--model ...]");
        return 2;
    };
    let model = match parse_model_flag(args) {
        Ok(model) => model,
        Err(code) => return code,
    };
    let instance = match load_instance(Path::new(dir), model) {
        Ok(instance) => instance,
        Err(err) => {
            eprintln!("validate failed: {err}");
            return 1;
        }
    };
    let report = validate_instance(&instance);
    if report.diagnostics.is_empty() {
        println!("ok: no findings");
    } else {
        println!("{}", report.render());
    }
    if report.has_errors() {
        1
    } else {
        0
    }
}

fn handle_scenarios(args: &[String]) -> i32 {
    let found = positionals(args);
    let Some(dir) = found.first() else {
        eprintln!("usage: aqueduct scenarios <instance-dir> [--model ...]");
        return 2;
    };
    let model = match parse_model_flag(args) {
        Ok(model) => model,
        Err(code) => return code,
    };
    let instance = match load_instance(Path::new(dir), model) {
        Ok(instance) => instance,
        Err(err) => {
            eprintln!("scenarios failed: {err}");
            return 1;
        }
    };

    let tree = &instance.tree;
    println!(
        "{} tree: {} branches, {} scenarios",
        instance.kind.as_str(),
        tree.branch_count(),
        tree.leaf_count()
    );
    for branch in &tree.branches {
        if tree.stages == 2 {
            let leaf = &branch.leaves[0];
            println!(
                "{}  p={:.3}  shortage={}",
                branch.name, branch.probability, leaf.shortage
            );
        } else {
            println!("{}  p={:.3}", branch.name, branch.probability);
            for leaf in &branch.leaves {
                println!(
                    "  {}  p={:.3}  shortage={}",
                    leaf.name, leaf.probability, leaf.shortage
                );
            }
        }
    }
    0
}

fn handle_serve() -> i32 {
    let bind_addr = env::var("AQUEDUCT_BIND").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    match server::run_server(&bind_addr) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("server error: {err}");
            1
        }
    }
}
