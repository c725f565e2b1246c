pub mod actions;
pub mod instance;
pub mod tree;
pub mod validate;

pub use actions::{
    Coupling, CouplingKind, LongTermAction, MidTermExpansion, ShortTermAction, UnservedAllowance,
};
pub use instance::{
    detect_model_kind, load_instance, read_instance_file, InstanceFile, ModelKind,
    PortfolioInstance, ProjectionRecord, ScenarioRecord, DEFAULT_THREE_STAGE_DIR,
    DEFAULT_TWO_STAGE_DIR, INSTANCE_FILE,
};
pub use tree::{Branch, Leaf, ScenarioOutcome, ScenarioTree, ROOT_NODE};
pub use validate::{
    validate_instance, ValidationDiagnostic, ValidationReport, ValidationSeverity,
    PROBABILITY_TOLERANCE,
};
