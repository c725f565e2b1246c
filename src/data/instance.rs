//! Instance loading: `model_data.json` inside an instance directory.
//!
//! The file shape decides the model kind: a top-level `scenarios` table is a
//! two-stage instance, a `projections` table is three-stage. Callers can
//! force a kind and get an error when the file does not match.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::actions::{
    LongTermAction, MidTermExpansion, ShortTermAction, UnservedAllowance,
};
use crate::data::tree::{Branch, Leaf, ScenarioTree};

/// File name looked up inside an instance directory.
pub const INSTANCE_FILE: &str = "model_data.json";

/// Shipped study instances.
pub const DEFAULT_TWO_STAGE_DIR: &str = "data/two_stage";
pub const DEFAULT_THREE_STAGE_DIR: &str = "data/three_stage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    TwoStage,
    ThreeStage,
}

impl ModelKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "two-stage" => Some(Self::TwoStage),
            "three-stage" => Some(Self::ThreeStage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwoStage => "two-stage",
            Self::ThreeStage => "three-stage",
        }
    }

    pub fn stages(&self) -> u8 {
        match self {
            Self::TwoStage => 2,
            Self::ThreeStage => 3,
        }
    }
}

/// Raw `model_data.json` schema. Also written by the instance generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceFile {
    pub long_term: BTreeMap<String, LongTermAction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mid_term: BTreeMap<String, MidTermExpansion>,
    pub short_term: BTreeMap<String, ShortTermAction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scenarios: BTreeMap<String, ScenarioRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub projections: BTreeMap<String, ProjectionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub probability: f64,
    pub shortage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserved: Option<UnservedAllowance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub probability: f64,
    pub scenarios: BTreeMap<String, ScenarioRecord>,
}

/// In-memory instance: action tables plus the scenario tree. BTreeMaps keep
/// iteration (and therefore enumeration and reporting) deterministic.
#[derive(Debug, Clone)]
pub struct PortfolioInstance {
    pub kind: ModelKind,
    pub long_term: BTreeMap<String, LongTermAction>,
    pub mid_term: BTreeMap<String, MidTermExpansion>,
    pub short_term: BTreeMap<String, ShortTermAction>,
    pub tree: ScenarioTree,
}

impl PortfolioInstance {
    /// Firm supply delivered by a first-stage commitment.
    pub fn base_supply(&self, units: &BTreeMap<String, u32>) -> f64 {
        self.long_term
            .iter()
            .map(|(name, action)| action.supply(units.get(name).copied().unwrap_or(0)))
            .sum()
    }

    /// First-stage cost of a commitment.
    pub fn first_stage_cost(&self, units: &BTreeMap<String, u32>) -> f64 {
        self.long_term
            .iter()
            .map(|(name, action)| {
                action.cost_per_unit * f64::from(units.get(name).copied().unwrap_or(0))
            })
            .sum()
    }

    /// Number of integer first-stage portfolios, `prod(max_units + 1)`.
    pub fn candidate_space(&self) -> u128 {
        self.long_term
            .values()
            .map(|action| u128::from(action.max_units) + 1)
            .product()
    }

}

/// Read the raw instance file from a directory.
pub fn read_instance_file(dir: &Path) -> Result<InstanceFile, String> {
    let path = dir.join(INSTANCE_FILE);
    let raw = fs::read_to_string(&path)
        .map_err(|err| format!("unable to read '{}': {err}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("unable to parse json '{}': {err}", path.display()))
}

/// Model kind implied by the file shape, if unambiguous.
pub fn detect_model_kind(file: &InstanceFile) -> Option<ModelKind> {
    match (file.scenarios.is_empty(), file.projections.is_empty()) {
        (false, true) => Some(ModelKind::TwoStage),
        (true, false) => Some(ModelKind::ThreeStage),
        _ => None,
    }
}

/// Load an instance directory into the unified in-memory form.
/// `kind` forces a model kind; `None` detects it from the file shape.
pub fn load_instance(dir: &Path, kind: Option<ModelKind>) -> Result<PortfolioInstance, String> {
    let file = read_instance_file(dir)?;
    let detected = detect_model_kind(&file).ok_or_else(|| {
        format!(
            "'{}' must define exactly one of 'scenarios' (two-stage) or 'projections' (three-stage)",
            dir.join(INSTANCE_FILE).display()
        )
    })?;
    let kind = match kind {
        Some(requested) if requested != detected => {
            return Err(format!(
                "instance '{}' is {}, not {}",
                dir.display(),
                detected.as_str(),
                requested.as_str()
            ));
        }
        _ => detected,
    };

    if kind == ModelKind::TwoStage && !file.mid_term.is_empty() {
        return Err(format!(
            "instance '{}' declares mid_term expansions but no projections; \
             mid-term decisions need a three-stage tree",
            dir.display()
        ));
    }

    let stages = kind.stages();
    let tree = match kind {
        ModelKind::TwoStage => ScenarioTree {
            stages,
            branches: file
                .scenarios
                .iter()
                .map(|(name, record)| Branch {
                    name: name.clone(),
                    probability: record.probability,
                    leaves: vec![Leaf {
                        name: name.clone(),
                        probability: 1.0,
                        shortage: record.shortage,
                        unserved: record.unserved.clone(),
                    }],
                })
                .collect(),
        },
        ModelKind::ThreeStage => ScenarioTree {
            stages,
            branches: file
                .projections
                .iter()
                .map(|(name, projection)| Branch {
                    name: name.clone(),
                    probability: projection.probability,
                    leaves: projection
                        .scenarios
                        .iter()
                        .map(|(leaf_name, record)| Leaf {
                            name: leaf_name.clone(),
                            probability: record.probability,
                            shortage: record.shortage,
                            unserved: record.unserved.clone(),
                        })
                        .collect(),
                })
                .collect(),
        },
    };

    Ok(PortfolioInstance {
        kind,
        long_term: file.long_term,
        mid_term: file.mid_term,
        short_term: file.short_term,
        tree,
    })
}
