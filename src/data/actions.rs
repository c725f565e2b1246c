//! Portfolio action records (AQUEDUCT schema). Written by hand or by the
//! instance generator, loaded from an instance directory at runtime.

use serde::{Deserialize, Serialize};

/// Long-term supply action: integer units committed before any uncertainty
/// is revealed (conservation retrofits, option contracts, new infrastructure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermAction {
    /// Largest number of units that can be committed.
    pub max_units: u32,
    /// Firm supply each committed unit delivers in every scenario.
    /// Zero for actions that only deliver when exercised (option contracts).
    pub yield_per_unit: f64,
    pub cost_per_unit: f64,
}

impl LongTermAction {
    /// Firm supply delivered by `units` committed units.
    pub fn supply(&self, units: u32) -> f64 {
        self.yield_per_unit * f64::from(units)
    }
}

/// Mid-term expansion of a long-term action, available once a projection is
/// known (three-stage instances). A fraction `x` expands the committed units
/// by `units * x`, adding `yield_per_unit * units * x` firm supply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidTermExpansion {
    /// Largest expansion fraction offered. Capacity still caps the total:
    /// units * (1 + fraction) can never exceed the action's max_units.
    pub max_fraction: f64,
    /// Cost per unit of firm supply added by the expansion.
    pub cost_per_unit: f64,
    /// Mobilization cost charged proportionally to the fraction taken.
    #[serde(default)]
    pub fixed_cost: f64,
}

/// Short-term action purchased after the shortage is known (restrictions,
/// option exercise, spot transfers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermAction {
    pub max_quantity: f64,
    pub cost_per_unit: f64,
    /// When present, the purchasable quantity is additionally capped by the
    /// state of a long-term action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupling: Option<Coupling>,
}

/// Cap tying a short-term action to a long-term one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupling {
    pub kind: CouplingKind,
    /// Name of the coupled long-term action.
    pub action: String,
    /// Quantity the short-term action may draw per coupled unit.
    #[serde(default = "default_quantity_per_unit")]
    pub quantity_per_unit: f64,
}

fn default_quantity_per_unit() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingKind {
    /// Capped by the capacity the coupled action left uncommitted:
    /// quantity <= quantity_per_unit * (max_units - units), shrunk further
    /// by any mid-term expansion of the same action.
    UnusedLongTermCapacity,
    /// Capped by the committed level: quantity <= quantity_per_unit * units.
    LongTermLevel,
    /// Capped by the mid-term expansion taken for the coupled action:
    /// quantity <= quantity_per_unit * units * fraction.
    MidTermLevel,
}

impl CouplingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnusedLongTermCapacity => "unused_long_term_capacity",
            Self::LongTermLevel => "long_term_level",
            Self::MidTermLevel => "mid_term_level",
        }
    }
}

/// Permitted shortfall in a leaf scenario, priced per unit left unserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnservedAllowance {
    pub max_quantity: f64,
    pub cost_per_unit: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_term_supply_scales_with_units() {
        let action = LongTermAction {
            max_units: 4,
            yield_per_unit: 25.0,
            cost_per_unit: 900.0,
        };
        assert_eq!(action.supply(0), 0.0);
        assert_eq!(action.supply(3), 75.0);
    }

    #[test]
    fn coupling_quantity_per_unit_defaults_to_one() {
        let parsed: Coupling =
            serde_json::from_str(r#"{"kind": "long_term_level", "action": "OPTION"}"#)
                .expect("coupling should parse");
        assert_eq!(parsed.kind, CouplingKind::LongTermLevel);
        assert_eq!(parsed.quantity_per_unit, 1.0);
    }

    #[test]
    fn coupling_kind_round_trips_snake_case() {
        let json = serde_json::to_string(&CouplingKind::UnusedLongTermCapacity)
            .expect("kind should serialize");
        assert_eq!(json, "\"unused_long_term_capacity\"");
    }
}
