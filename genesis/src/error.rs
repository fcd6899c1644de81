//! Error taxonomy shared by every pipeline stage.
//!
//! Stages never raise across their boundary. They return an [`Outcome`], which is
//! either a payload or a non-empty [`Failure`] holding categorized
//! [`FrameworkError`]s. [`ErrorResult`] is the serializable envelope handed to
//! callers outside the crate.
//!
//! Unit tests at the bottom cover conversion from foreign errors and the envelope
//! shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Stable error identifiers. Callers match on these, never on messages.
pub mod error_ids {
    pub const INVALID_INPUT_TYPE: &str = "INVALID_INPUT_TYPE";
    pub const MISSING_REQUIRED_FIELD: &str = "MISSING_REQUIRED_FIELD";
    pub const INVALID_FIELD_VALUE: &str = "INVALID_FIELD_VALUE";
    pub const UNKNOWN_COMPONENT_ID: &str = "UNKNOWN_COMPONENT_ID";
    pub const UNKNOWN_COMPONENT_TYPE: &str = "UNKNOWN_COMPONENT_TYPE";
    pub const DUPLICATE_COMPONENT_ID: &str = "DUPLICATE_COMPONENT_ID";
    pub const DUPLICATE_COMPONENT_TYPE: &str = "DUPLICATE_COMPONENT_TYPE";

    pub const SCAN_READ_FAILED: &str = "SCAN_READ_FAILED";
    pub const SCAN_SYNTAX_ERROR: &str = "SCAN_SYNTAX_ERROR";
    pub const SCAN_ROOT_MISSING: &str = "SCAN_ROOT_MISSING";
    pub const SCAN_DUPLICATE_MODULE: &str = "SCAN_DUPLICATE_MODULE";
    pub const COMPONENT_IMPORT_FAILED: &str = "COMPONENT_IMPORT_FAILED";
    pub const COMPONENT_INTROSPECTION_FAILED: &str = "COMPONENT_INTROSPECTION_FAILED";
    pub const COMPONENT_DISCOVERY_TIMEOUT: &str = "COMPONENT_DISCOVERY_TIMEOUT";
    pub const COMPONENT_WORKER_PANICKED: &str = "COMPONENT_WORKER_PANICKED";

    pub const VARIABLE_RESOLUTION_FAILED: &str = "VARIABLE_RESOLUTION_FAILED";
    pub const VARIABLE_CIRCULAR_REFERENCE: &str = "VARIABLE_CIRCULAR_REFERENCE";
    pub const VARIABLE_RESOLUTION_TIMEOUT: &str = "VARIABLE_RESOLUTION_TIMEOUT";
    pub const VARIABLE_TYPE_VALIDATION_FAILED: &str = "VARIABLE_TYPE_VALIDATION_FAILED";
    pub const VARIABLE_NESTING_TOO_DEEP: &str = "VARIABLE_NESTING_TOO_DEEP";
    pub const INPUT_TOO_LARGE: &str = "INPUT_TOO_LARGE";

    pub const CONNECTION_INVALID_COMPONENTS: &str = "CONNECTION_INVALID_COMPONENTS";
    pub const CONNECTION_UNKNOWN_TARGET: &str = "CONNECTION_UNKNOWN_TARGET";
    pub const CONNECTION_MISSING_MAPPING: &str = "CONNECTION_MISSING_MAPPING";
    pub const CONNECTION_HANDLE_CREATION_FAILED: &str = "CONNECTION_HANDLE_CREATION_FAILED";
    pub const CONNECTION_ID_COLLISION: &str = "CONNECTION_ID_COLLISION";

    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const SPEC_DEPRECATED_FIELD: &str = "SPEC_DEPRECATED_FIELD";
    pub const SPEC_NAMING_CONVENTION: &str = "SPEC_NAMING_CONVENTION";
    pub const SPEC_MISSING_AGENT_GOAL: &str = "SPEC_MISSING_AGENT_GOAL";
    pub const SPEC_NONSTANDARD_VALUE: &str = "SPEC_NONSTANDARD_VALUE";
    pub const SPEC_DEPENDENCY_CYCLE: &str = "SPEC_DEPENDENCY_CYCLE";
    pub const SPEC_PERFORMANCE_LIMIT: &str = "SPEC_PERFORMANCE_LIMIT";
    pub const COMPLIANCE_ENCRYPTION_MISSING: &str = "COMPLIANCE_ENCRYPTION_MISSING";
    pub const COMPLIANCE_AUDIT_LOGGING_MISSING: &str = "COMPLIANCE_AUDIT_LOGGING_MISSING";
    pub const COMPLIANCE_DATA_EXPOSURE: &str = "COMPLIANCE_DATA_EXPOSURE";
    pub const COMPLIANCE_UNREGULATED_SOURCE: &str = "COMPLIANCE_UNREGULATED_SOURCE";
    pub const COMPLIANCE_CHECK_FAILED: &str = "COMPLIANCE_CHECK_FAILED";
    pub const CONVERSION_DEADLINE_EXCEEDED: &str = "CONVERSION_DEADLINE_EXCEEDED";
    pub const FLOW_INVALID_EDGE: &str = "FLOW_INVALID_EDGE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input shape or missing field
    Validation,
    /// Unexpected internal failure (import error, panic, serialization)
    System,
    /// A time budget or deadline was exceeded
    Timeout,
    /// A domain data-handling rule was violated
    Compliance,
    /// Edge construction failed
    Connection,
    /// Payload could not be interpreted
    Data,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::System => "system",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Compliance => "compliance",
            ErrorCategory::Connection => "connection",
            ErrorCategory::Data => "data",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    /// Informational and warning entries never stop a pipeline.
    pub fn is_blocking(&self) -> bool {
        matches!(self, ErrorSeverity::Error | ErrorSeverity::Critical)
    }
}

/// A single categorized failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkError {
    pub operation: String,
    pub error_id: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    pub retry_possible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FrameworkError {
    pub fn new(
        operation: impl Into<String>,
        error_id: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            error_id: error_id.into(),
            category,
            severity: ErrorSeverity::Error,
            message: message.into(),
            suggested_fix: None,
            retry_possible: false,
            exception_type: None,
            component_id: None,
            field_path: None,
            timestamp: Utc::now(),
        }
    }

    pub fn validation(
        operation: impl Into<String>,
        error_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, error_id, ErrorCategory::Validation, message)
    }

    pub fn system(
        operation: impl Into<String>,
        error_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, error_id, ErrorCategory::System, message)
    }

    pub fn timeout(
        operation: impl Into<String>,
        error_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, error_id, ErrorCategory::Timeout, message).retryable(true)
    }

    pub fn compliance(
        operation: impl Into<String>,
        error_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, error_id, ErrorCategory::Compliance, message)
            .with_severity(ErrorSeverity::Warning)
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn retryable(mut self, retry_possible: bool) -> Self {
        self.retry_possible = retry_possible;
        self
    }

    pub fn with_exception_type(mut self, exception_type: impl Into<String>) -> Self {
        self.exception_type = Some(exception_type.into());
        self
    }

    pub fn with_component(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }

    pub fn with_field(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }
}

impl fmt::Display for FrameworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {}: {}",
            self.category, self.error_id, self.operation, self.message
        )?;
        if let Some(component) = &self.component_id {
            write!(f, " (component: {})", component)?;
        }
        Ok(())
    }
}

impl std::error::Error for FrameworkError {}

/// A non-empty list of errors. The only way to build one is from at least one
/// [`FrameworkError`], so a failed [`Outcome`] always explains itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Failure {
    errors: Vec<FrameworkError>,
}

impl Failure {
    pub fn new(error: FrameworkError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Returns `None` for an empty list.
    pub fn from_errors(errors: Vec<FrameworkError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn push(&mut self, error: FrameworkError) {
        self.errors.push(error);
    }

    pub fn merge(&mut self, other: Failure) {
        self.errors.extend(other.errors);
    }

    pub fn errors(&self) -> &[FrameworkError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<FrameworkError> {
        self.errors
    }

    pub fn first(&self) -> &FrameworkError {
        // Non-empty by construction.
        &self.errors[0]
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn has_category(&self, category: ErrorCategory) -> bool {
        self.errors.iter().any(|e| e.category == category)
    }

    pub fn has_error_id(&self, error_id: &str) -> bool {
        self.errors.iter().any(|e| e.error_id == error_id)
    }
}

impl From<FrameworkError> for Failure {
    fn from(error: FrameworkError) -> Self {
        Failure::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for Failure {}

pub type Outcome<T> = Result<T, Failure>;

/// Serializable `{success, data?, errors}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub errors: Vec<FrameworkError>,
}

impl<T> ErrorResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failure(failure: Failure) -> Self {
        Self {
            success: false,
            data: None,
            errors: failure.into_errors(),
        }
    }

    pub fn into_outcome(self) -> Outcome<T> {
        match (self.data, Failure::from_errors(self.errors)) {
            (Some(data), None) if self.success => Ok(data),
            (_, Some(failure)) => Err(failure),
            _ => Err(Failure::new(FrameworkError::system(
                "error_result",
                error_ids::INTERNAL_ERROR,
                "Result envelope carried neither data nor errors",
            ))),
        }
    }
}

impl<T> From<Outcome<T>> for ErrorResult<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(data) => ErrorResult::success(data),
            Err(failure) => ErrorResult::failure(failure),
        }
    }
}

/// Per-service error factory. Every error it creates is logged once.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    service: String,
}

impl ErrorHandler {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Create and log an error.
    pub fn create(
        &self,
        operation: &str,
        error_id: &str,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> FrameworkError {
        let error = FrameworkError::new(operation, error_id, category, message);
        self.log(&error);
        error
    }

    /// Convert a foreign error, keeping its type name for diagnostics.
    pub fn from_error<E>(
        &self,
        operation: &str,
        error_id: &str,
        category: ErrorCategory,
        err: &E,
    ) -> FrameworkError
    where
        E: std::error::Error + 'static,
    {
        let error = FrameworkError::new(operation, error_id, category, err.to_string())
            .with_exception_type(short_type_name(std::any::type_name::<E>()));
        self.log(&error);
        error
    }

    /// Convert a caught panic payload into a SYSTEM error.
    pub fn from_panic(
        &self,
        operation: &str,
        error_id: &str,
        payload: &(dyn Any + Send),
    ) -> FrameworkError {
        let error = FrameworkError::system(operation, error_id, panic_message(payload))
            .with_exception_type("panic");
        self.log(&error);
        error
    }

    pub fn log(&self, error: &FrameworkError) {
        match error.severity {
            ErrorSeverity::Info => tracing::debug!(
                service = %self.service,
                error_id = %error.error_id,
                operation = %error.operation,
                "{}",
                error.message
            ),
            ErrorSeverity::Warning => tracing::warn!(
                service = %self.service,
                error_id = %error.error_id,
                operation = %error.operation,
                "{}",
                error.message
            ),
            ErrorSeverity::Error | ErrorSeverity::Critical => tracing::error!(
                service = %self.service,
                error_id = %error.error_id,
                operation = %error.operation,
                category = %error.category,
                "{}",
                error.message
            ),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// `std::io::error::Error` -> `Error`, `core::option::Option<T>` -> `Option<T>`
fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    format!("{}{}", short, &full[base.len()..])
}

/// Crate-level error for setup concerns outside the pipeline taxonomy
/// (configuration files, documents, I/O).
#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Document parse error: {0}")]
    Parse(String),
    #[error("Discovery error: {0}")]
    Discovery(String),
    #[error("{0}")]
    Pipeline(Failure),
}

impl From<serde_json::Error> for GenesisError {
    fn from(e: serde_json::Error) -> Self {
        GenesisError::Parse(e.to_string())
    }
}

impl From<serde_yaml::Error> for GenesisError {
    fn from(e: serde_yaml::Error) -> Self {
        GenesisError::Parse(e.to_string())
    }
}

impl From<toml::de::Error> for GenesisError {
    fn from(e: toml::de::Error) -> Self {
        GenesisError::Config(e.to_string())
    }
}

impl From<Failure> for GenesisError {
    fn from(f: Failure) -> Self {
        GenesisError::Pipeline(f)
    }
}

pub type GenesisResult<T> = Result<T, GenesisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_error_preserves_type_name() {
        let handler = ErrorHandler::new("test");
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = handler.from_error("read", error_ids::SCAN_READ_FAILED, ErrorCategory::System, &io);
        assert_eq!(err.category, ErrorCategory::System);
        assert_eq!(err.exception_type.as_deref(), Some("Error"));
        assert_eq!(err.message, "gone");
    }

    #[test]
    fn failure_is_never_empty() {
        assert!(Failure::from_errors(vec![]).is_none());
        let f = Failure::new(FrameworkError::validation("op", "ID", "bad"));
        assert_eq!(f.len(), 1);
        assert!(f.has_category(ErrorCategory::Validation));
        assert!(!f.has_category(ErrorCategory::Timeout));
    }

    #[test]
    fn envelope_shape() {
        let ok: ErrorResult<u32> = Ok(3).into();
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 3);
        assert!(json["errors"].as_array().unwrap().is_empty());

        let err: ErrorResult<u32> = Err(Failure::new(
            FrameworkError::timeout("resolve", "T", "too slow").with_fix("raise the budget"),
        ))
        .into();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["category"], "timeout");
        assert_eq!(json["errors"][0]["retry_possible"], true);
        assert_eq!(json["errors"][0]["suggested_fix"], "raise the budget");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let handler = ErrorHandler::new("test");
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let err = handler.from_panic("worker", error_ids::COMPONENT_WORKER_PANICKED, payload.as_ref());
        assert_eq!(err.message, "boom");
        assert_eq!(err.exception_type.as_deref(), Some("panic"));
    }

    #[test]
    fn short_type_names() {
        assert_eq!(short_type_name("std::io::error::Error"), "Error");
        assert_eq!(short_type_name("core::option::Option<u8>"), "Option<u8>");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
