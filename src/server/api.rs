use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::instance::{load_instance, ModelKind};
use crate::optimizer::portfolio_generator::DEFAULT_MAX_CANDIDATES;
use crate::optimizer::{
    evaluate_instance, solve_instance, SolveOptions, DEFAULT_RISK_ALPHA, DEFAULT_TOP,
};

/// Rough wall-clock cost of one branch LP, used by the estimate endpoint.
const SECONDS_PER_BRANCH_SOLVE: f64 = 2e-4;

#[derive(Debug, Clone, Deserialize)]
pub struct SolveRequest {
    pub instance_dir: String,
    pub model: Option<String>,
    pub max_candidates: Option<usize>,
    pub seed: Option<u64>,
    pub workers: Option<usize>,
    pub cvar_weight: Option<f64>,
    pub risk_alpha: Option<f64>,
    pub top: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateRequest {
    pub instance_dir: String,
    pub model: Option<String>,
    pub units: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrorResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub errors: Vec<ValidationIssue>,
}

#[derive(Debug)]
pub enum SolvePayloadError {
    Parse(serde_json::Error),
    Validation(ValidationErrorResponse),
    Solve(String),
}

#[derive(Debug)]
pub enum EvaluatePayloadError {
    Parse(serde_json::Error),
    Run(String),
}

#[derive(Debug, Clone, Serialize)]
struct HealthPayload {
    status: &'static str,
    engine: &'static str,
    version: &'static str,
}

pub fn health_payload() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&HealthPayload {
        status: "ok",
        engine: "aqueduct",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Query string value from a raw request path, no percent-decoding.
fn query_param(path: &str, key: &str) -> Option<String> {
    let query = path.split('?').nth(1)?;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == key).then(|| value.to_string())
    })
}

fn parse_model_param(path: &str) -> Result<Option<ModelKind>, String> {
    match query_param(path, "model") {
        None => Ok(None),
        Some(raw) => ModelKind::parse(&raw)
            .map(Some)
            .ok_or_else(|| format!("invalid model '{raw}', expected two-stage or three-stage")),
    }
}

#[derive(Debug, Clone, Serialize)]
struct TreePayload<'a> {
    model: &'static str,
    tree: &'a crate::data::tree::ScenarioTree,
}

pub fn tree_payload(path: &str) -> Result<String, String> {
    let instance_dir = query_param(path, "instance")
        .ok_or_else(|| "missing 'instance' query parameter".to_string())?;
    let model = parse_model_param(path)?;
    let instance = load_instance(Path::new(&instance_dir), model)?;
    serde_json::to_string_pretty(&TreePayload {
        model: instance.kind.as_str(),
        tree: &instance.tree,
    })
    .map_err(|err| err.to_string())
}

#[derive(Debug, Clone, Serialize)]
struct EstimatePayload {
    candidate_space: u64,
    estimated_candidates: u64,
    truncated: bool,
    branches: usize,
    scenarios: usize,
    estimated_seconds: f64,
}

pub fn estimate_payload(path: &str) -> Result<String, String> {
    let instance_dir = query_param(path, "instance")
        .ok_or_else(|| "missing 'instance' query parameter".to_string())?;
    let model = parse_model_param(path)?;
    let cap = match query_param(path, "max_candidates") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("invalid max_candidates '{raw}'"))?,
        None => DEFAULT_MAX_CANDIDATES as u64,
    };
    let instance = load_instance(Path::new(&instance_dir), model)?;
    let space = instance.candidate_space().min(u128::from(u64::MAX)) as u64;
    let estimated_candidates = space.min(cap.max(1));
    let branches = instance.tree.branch_count();
    serde_json::to_string_pretty(&EstimatePayload {
        candidate_space: space,
        estimated_candidates,
        truncated: space > estimated_candidates,
        branches,
        scenarios: instance.tree.leaf_count(),
        estimated_seconds: estimated_candidates as f64 * branches as f64 * SECONDS_PER_BRANCH_SOLVE,
    })
    .map_err(|err| err.to_string())
}

fn validate_solve_request(request: &SolveRequest) -> Result<SolveOptions, ValidationErrorResponse> {
    let mut errors: Vec<ValidationIssue> = Vec::new();

    if request.instance_dir.trim().is_empty() {
        errors.push(ValidationIssue {
            field: "instance_dir",
            messages: vec!["must not be empty".to_string()],
        });
    }
    let model = match request.model.as_deref() {
        None => None,
        Some(raw) => match ModelKind::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                errors.push(ValidationIssue {
                    field: "model",
                    messages: vec![format!(
                        "'{raw}' is not a model kind, expected two-stage or three-stage"
                    )],
                });
                None
            }
        },
    };
    let risk_alpha = request.risk_alpha.unwrap_or(DEFAULT_RISK_ALPHA);
    if !(0.0..1.0).contains(&risk_alpha) {
        errors.push(ValidationIssue {
            field: "risk_alpha",
            messages: vec![format!("must be in [0, 1), got {risk_alpha}")],
        });
    }
    let cvar_weight = request.cvar_weight.unwrap_or(0.0);
    if cvar_weight < 0.0 {
        errors.push(ValidationIssue {
            field: "cvar_weight",
            messages: vec![format!("must be non-negative, got {cvar_weight}")],
        });
    }
    if request.max_candidates == Some(0) {
        errors.push(ValidationIssue {
            field: "max_candidates",
            messages: vec!["must be at least 1".to_string()],
        });
    }

    if !errors.is_empty() {
        return Err(ValidationErrorResponse {
            status: "error",
            message: "Validation failed",
            errors,
        });
    }
    Ok(SolveOptions {
        model,
        max_candidates: Some(request.max_candidates.unwrap_or(DEFAULT_MAX_CANDIDATES)),
        seed: request.seed.unwrap_or(0),
        workers: request.workers.unwrap_or(0),
        cvar_weight,
        risk_alpha,
        top: request.top.unwrap_or(DEFAULT_TOP),
    })
}

pub fn solve_payload(body: &str) -> Result<String, SolvePayloadError> {
    let request: SolveRequest = serde_json::from_str(body).map_err(SolvePayloadError::Parse)?;
    let options = validate_solve_request(&request).map_err(SolvePayloadError::Validation)?;
    let report = solve_instance(Path::new(&request.instance_dir), &options)
        .map_err(SolvePayloadError::Solve)?;
    serde_json::to_string_pretty(&report).map_err(|err| SolvePayloadError::Solve(err.to_string()))
}

pub fn evaluate_payload(body: &str) -> Result<String, EvaluatePayloadError> {
    let request: EvaluateRequest =
        serde_json::from_str(body).map_err(EvaluatePayloadError::Parse)?;
    let model = match request.model.as_deref() {
        None => None,
        Some(raw) => Some(ModelKind::parse(raw).ok_or_else(|| {
            EvaluatePayloadError::Run(format!(
                "invalid model '{raw}', expected two-stage or three-stage"
            ))
        })?),
    };
    let evaluation = evaluate_instance(Path::new(&request.instance_dir), model, &request.units)
        .map_err(EvaluatePayloadError::Run)?;
    serde_json::to_string_pretty(&evaluation)
        .map_err(|err| EvaluatePayloadError::Run(err.to_string()))
}
