//! Per-conversion request state.

use crate::error::{error_ids, FrameworkError, Outcome};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

/// Carried by reference through one conversion call; never stored globally.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    request_id: String,
    variables: Map<String, Value>,
    compliance: bool,
    start_time: Instant,
    deadline: Option<Instant>,
}

impl ProcessingContext {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            variables: Map::new(),
            compliance: false,
            start_time: Instant::now(),
            deadline: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_compliance(mut self, compliance: bool) -> Self {
        self.compliance = compliance;
        self
    }

    /// Deadline relative to when the context was created.
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(self.start_time + budget);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn compliance(&self) -> bool {
        self.compliance
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Timeout error once the deadline has passed.
    pub fn check_deadline(&self, operation: &str) -> Outcome<()> {
        if self.is_expired() {
            return Err(FrameworkError::timeout(
                operation,
                error_ids::CONVERSION_DEADLINE_EXCEEDED,
                format!(
                    "Conversion deadline exceeded after {} ms",
                    self.elapsed().as_millis()
                ),
            )
            .with_fix("Raise converter.deadline_ms or simplify the specification")
            .into());
        }
        Ok(())
    }
}

impl Default for ProcessingContext {
    fn default() -> Self {
        Self::new()
    }
}
