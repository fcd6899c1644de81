//! Specification handling: parsing, variable resolution, wiring, cost
//! estimation, validation and conversion to and from flow graphs.

pub mod connections;
pub mod context;
pub mod converter;
pub mod estimator;
pub mod model;
pub mod resolver;
pub mod validator;

pub use connections::{encode_handle, ConnectionBuilder, Connections};
pub use context::ProcessingContext;
pub use converter::{ConversionMetrics, ConversionResult, Converter};
pub use estimator::{MemoryBreakdown, MemoryEstimator};
pub use model::{
    parse_document, ComponentSpec, FlowEdge, FlowGraph, FlowNode, Link, Specification,
    VariableSpec,
};
pub use resolver::{VariableReport, VariableResolver};
pub use validator::{ComplianceRule, SpecificationValidator, ValidationResult};

/// Type-name fragments that mark a component as handling regulated data.
pub const HEALTHCARE_TERMS: &[&str] = &[
    "ehr",
    "eligibility",
    "claims",
    "medical",
    "patient",
    "phi",
    "hipaa",
    "pharmacy",
    "healthcare",
    "clinical",
    "diagnosis",
    "treatment",
];

pub fn is_regulated_type(component_type: &str) -> bool {
    let lowered = component_type.to_lowercase();
    HEALTHCARE_TERMS.iter().any(|term| lowered.contains(term))
}
