//! Structural and compliance validation of raw specification documents.
//!
//! Validation works on the undecoded document so that shape problems are
//! reported field by field instead of as one deserialization failure.
//! Blocking problems land in `errors`; advisory findings (naming, performance,
//! compliance) land in `warnings` and never make a specification invalid.

use super::is_regulated_type;
use super::model::listed_component_id;
use crate::catalog::Catalog;
use crate::error::{error_ids, panic_message, ErrorHandler, ErrorSeverity, FrameworkError, Failure, Outcome};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

static URN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^urn:agent:genesis:[a-z0-9\-]+:[a-z0-9\-]+:[0-9]+\.[0-9]+\.[0-9]+$").unwrap()
});
static SEMVER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").unwrap());

const REQUIRED_FIELDS: &[&str] = &["name", "description", "components"];
const STRING_FIELDS: &[&str] = &["name", "description", "agentGoal", "version", "domain", "kind"];
const DEPRECATED_FIELDS: &[&str] = &["mvp", "edge_generator", "legacy_mode"];
const POOR_NAMING_TERMS: &[&str] = &["mvp", "temp", "test", "todo", "fixme", "hack", "edge_generator"];
const STANDARD_KINDS: &[&str] = &["Agent", "Tool", "Data", "Prompt", "Model", "Memory", "Custom"];
const STANDARD_USE_AS: &[&str] = &[
    "tools",
    "input",
    "system_prompt",
    "prompt",
    "query",
    "memory",
    "output",
    "data",
    "context",
    "knowledge",
    "config",
];
const MEMORY_INTENSIVE_TERMS: &[&str] = &["embedding", "vector_store", "large_model"];

const MIN_AGENT_GOAL_CHARS: usize = 10;
const MAX_COMPONENTS: usize = 50;
const MAX_RELATIONSHIPS: usize = 100;
const MAX_MEMORY_INTENSIVE: usize = 3;

const ENCRYPTION_KEYS: &[&str] = &["encryption", "encrypt_data", "data_encryption", "encryption_enabled"];
const LOGGING_KEYS: &[&str] = &["logging", "log_requests", "log_payloads", "verbose", "debug"];
const ENDPOINT_KEYS: &[&str] = &["endpoint", "url", "api_url", "base_url", "webhook_url"];

pub type RuleResult = Result<Vec<FrameworkError>, Box<dyn std::error::Error + Send + Sync>>;

/// A data-handling rule applied to each regulated component.
pub trait ComplianceRule: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Findings for `component_id`; `spec` is the whole document.
    fn check(&self, spec: &Value, component_id: &str, component: &Value) -> RuleResult;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FrameworkError>,
    pub warnings: Vec<FrameworkError>,
    pub compliance_checked: bool,
    pub compliant: bool,
}

impl ValidationResult {
    /// Warnings on success, every error otherwise.
    pub fn into_outcome(self) -> Outcome<Vec<FrameworkError>> {
        match Failure::from_errors(self.errors) {
            Some(failure) => Err(failure),
            None => Ok(self.warnings),
        }
    }
}

pub struct SpecificationValidator {
    catalog: Option<Arc<Catalog>>,
    rules: Vec<Box<dyn ComplianceRule>>,
    error_handler: ErrorHandler,
}

impl SpecificationValidator {
    /// Validator with the built-in compliance rules.
    pub fn new() -> Self {
        Self {
            catalog: None,
            rules: vec![
                Box::new(EncryptionRule),
                Box::new(AuditLoggingRule),
                Box::new(DataExposureRule),
                Box::new(UnregulatedSourceRule),
            ],
            error_handler: ErrorHandler::new("specification_validator"),
        }
    }

    /// Also require every component type to be known to `catalog`.
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_rule(mut self, rule: Box<dyn ComplianceRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn validate(&self, spec: &Value, compliance: bool) -> ValidationResult {
        let mut report = Report::default();

        match spec.as_object() {
            Some(doc) => {
                self.check_top_level(doc, &mut report);
                self.check_variables(doc, &mut report);
                if let Some(components) = doc.get("components") {
                    let entries = self.collect_components(components, &mut report);
                    self.check_components(&entries, &mut report);
                    check_dependency_cycles(&entries, &mut report);
                    check_performance(&entries, &mut report);
                }
            }
            None => report.error(FrameworkError::validation(
                "validate_specification",
                error_ids::INVALID_INPUT_TYPE,
                "Specification must be a map",
            )),
        }

        let compliance_checked = compliance && report.errors.is_empty();
        let compliant = !compliance_checked || self.check_compliance(spec, &mut report);

        for error in report.errors.iter().chain(report.warnings.iter()) {
            self.error_handler.log(error);
        }
        tracing::info!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            compliance,
            "validated specification"
        );
        ValidationResult {
            valid: report.errors.is_empty(),
            errors: report.errors,
            warnings: report.warnings,
            compliance_checked,
            compliant,
        }
    }

    fn check_top_level(&self, doc: &Map<String, Value>, report: &mut Report) {
        for field in REQUIRED_FIELDS {
            if !doc.contains_key(*field) {
                report.error(
                    FrameworkError::validation(
                        "validate_specification",
                        error_ids::MISSING_REQUIRED_FIELD,
                        format!("Missing required field '{}'", field),
                    )
                    .with_field(*field),
                );
            }
        }
        for field in STRING_FIELDS {
            if let Some(value) = doc.get(*field) {
                if !value.is_string() {
                    report.error(
                        FrameworkError::validation(
                            "validate_specification",
                            error_ids::INVALID_FIELD_VALUE,
                            format!("Field '{}' must be a string", field),
                        )
                        .with_field(*field),
                    );
                }
            }
        }

        if let Some(id) = doc.get("id").and_then(Value::as_str) {
            if !URN_PATTERN.is_match(id) {
                report.error(
                    FrameworkError::validation(
                        "validate_specification",
                        error_ids::INVALID_FIELD_VALUE,
                        format!("Invalid id format '{}'", id),
                    )
                    .with_field("id")
                    .with_fix("Use urn:agent:genesis:{domain}:{name}:{version}"),
                );
            }
        }
        if let Some(version) = doc.get("version").and_then(Value::as_str) {
            if !SEMVER_PATTERN.is_match(version) {
                report.error(
                    FrameworkError::validation(
                        "validate_specification",
                        error_ids::INVALID_FIELD_VALUE,
                        format!("Version '{}' is not MAJOR.MINOR.PATCH", version),
                    )
                    .with_field("version"),
                );
            }
        }

        for field in DEPRECATED_FIELDS {
            if doc.contains_key(*field) {
                report.warn(
                    error_ids::SPEC_DEPRECATED_FIELD,
                    format!("Field '{}' is deprecated", field),
                    Some(*field),
                );
            }
        }
        if let Some(name) = doc.get("name").and_then(Value::as_str) {
            if let Some(term) = poor_naming_term(name) {
                report.warn(
                    error_ids::SPEC_NAMING_CONVENTION,
                    format!("Name '{}' contains '{}'", name, term),
                    Some("name"),
                );
            }
        }
        match doc.get("agentGoal").and_then(Value::as_str) {
            None => report.warn(
                error_ids::SPEC_MISSING_AGENT_GOAL,
                "No agentGoal declared".to_string(),
                Some("agentGoal"),
            ),
            Some(goal) if goal.trim().chars().count() < MIN_AGENT_GOAL_CHARS => report.warn(
                error_ids::SPEC_MISSING_AGENT_GOAL,
                format!("agentGoal is shorter than {} characters", MIN_AGENT_GOAL_CHARS),
                Some("agentGoal"),
            ),
            Some(_) => {}
        }
    }

    fn check_variables(&self, doc: &Map<String, Value>, report: &mut Report) {
        match doc.get("variables") {
            None | Some(Value::Object(_)) => {}
            Some(Value::Array(list)) => {
                for (i, entry) in list.iter().enumerate() {
                    for field in ["name", "type"] {
                        if entry.get(field).and_then(Value::as_str).is_none() {
                            report.error(
                                FrameworkError::validation(
                                    "validate_specification",
                                    error_ids::MISSING_REQUIRED_FIELD,
                                    format!("Variable {} has no '{}'", i, field),
                                )
                                .with_field(format!("variables[{}].{}", i, field)),
                            );
                        }
                    }
                }
            }
            Some(_) => report.error(
                FrameworkError::validation(
                    "validate_specification",
                    error_ids::INVALID_FIELD_VALUE,
                    "variables must be a list or a map",
                )
                .with_field("variables"),
            ),
        }
    }

    fn collect_components<'a>(&self, components: &'a Value, report: &mut Report) -> Vec<(String, &'a Value)> {
        let mut entries: Vec<(String, &Value)> = Vec::new();
        match components {
            Value::Object(map) => entries.extend(map.iter().map(|(id, c)| (id.clone(), c))),
            Value::Array(list) => {
                let mut seen = HashSet::new();
                for (i, component) in list.iter().enumerate() {
                    let id = match component.get("id") {
                        Some(Value::String(id)) => id.clone(),
                        None => {
                            let id = listed_component_id(i);
                            report.warn(
                                error_ids::SPEC_NONSTANDARD_VALUE,
                                format!("Component {} has no id; it will be named '{}'", i, id),
                                Some(&format!("components[{}].id", i)),
                            );
                            id
                        }
                        Some(_) => {
                            report.error(
                                FrameworkError::validation(
                                    "validate_specification",
                                    error_ids::INVALID_FIELD_VALUE,
                                    format!("Component {} id must be a string", i),
                                )
                                .with_field(format!("components[{}].id", i)),
                            );
                            continue;
                        }
                    };
                    if !seen.insert(id.clone()) {
                        report.error(
                            FrameworkError::validation(
                                "validate_specification",
                                error_ids::DUPLICATE_COMPONENT_ID,
                                format!("Component id '{}' is used more than once", id),
                            )
                            .with_component(id),
                        );
                        continue;
                    }
                    entries.push((id, component));
                }
            }
            _ => report.error(
                FrameworkError::validation(
                    "validate_specification",
                    error_ids::INVALID_FIELD_VALUE,
                    "components must be a map or a list",
                )
                .with_field("components"),
            ),
        }
        entries
    }

    fn check_components(&self, entries: &[(String, &Value)], report: &mut Report) {
        let ids: HashSet<&str> = entries.iter().map(|(id, _)| id.as_str()).collect();

        for (id, component) in entries {
            let prefix = format!("components.{}", id);
            let Some(body) = component.as_object() else {
                report.error(
                    FrameworkError::validation(
                        "validate_component",
                        error_ids::INVALID_FIELD_VALUE,
                        format!("Component '{}' must be a map", id),
                    )
                    .with_component(id.clone())
                    .with_field(prefix),
                );
                continue;
            };

            match body.get("type").and_then(Value::as_str) {
                None => report.error(
                    FrameworkError::validation(
                        "validate_component",
                        error_ids::MISSING_REQUIRED_FIELD,
                        format!("Component '{}' has no type", id),
                    )
                    .with_component(id.clone())
                    .with_field(format!("{}.type", prefix)),
                ),
                Some(component_type) => {
                    if let Some(catalog) = &self.catalog {
                        if !catalog.contains(component_type) && catalog.find_variant(component_type).is_none() {
                            report.error(
                                FrameworkError::validation(
                                    "validate_component",
                                    error_ids::UNKNOWN_COMPONENT_TYPE,
                                    format!("Component '{}' has unknown type '{}'", id, component_type),
                                )
                                .with_component(id.clone())
                                .with_field(format!("{}.type", prefix)),
                            );
                        }
                    }
                }
            }

            if let Some(kind) = body.get("kind").and_then(Value::as_str) {
                if !STANDARD_KINDS.contains(&kind) {
                    report.warn(
                        error_ids::SPEC_NONSTANDARD_VALUE,
                        format!("Component '{}' has non-standard kind '{}'", id, kind),
                        Some(format!("{}.kind", prefix).as_str()),
                    );
                }
            }

            if let Some(config) = body.get("config") {
                if !config.is_object() {
                    report.error(
                        FrameworkError::validation(
                            "validate_component",
                            error_ids::INVALID_FIELD_VALUE,
                            format!("Config of component '{}' must be a map", id),
                        )
                        .with_component(id.clone())
                        .with_field(format!("{}.config", prefix)),
                    );
                }
            }

            match body.get("provides") {
                None => {}
                Some(Value::Array(links)) => {
                    for (i, link) in links.iter().enumerate() {
                        let field = format!("{}.provides[{}]", prefix, i);
                        let Some(target) = link.get("in").and_then(Value::as_str) else {
                            report.error(
                                FrameworkError::validation(
                                    "validate_component",
                                    error_ids::MISSING_REQUIRED_FIELD,
                                    format!("Link {} of '{}' has no 'in' target", i, id),
                                )
                                .with_component(id.clone())
                                .with_field(field),
                            );
                            continue;
                        };
                        if !ids.contains(target) {
                            report.error(
                                FrameworkError::validation(
                                    "validate_component",
                                    error_ids::UNKNOWN_COMPONENT_ID,
                                    format!("'{}' provides to unknown component '{}'", id, target),
                                )
                                .with_component(id.clone())
                                .with_field(field.clone()),
                            );
                        }
                        if let Some(use_as) = link.get("useAs").and_then(Value::as_str) {
                            if !STANDARD_USE_AS.contains(&use_as) {
                                report.warn(
                                    error_ids::SPEC_NONSTANDARD_VALUE,
                                    format!("Link {} of '{}' uses non-standard useAs '{}'", i, id, use_as),
                                    Some(field.as_str()),
                                );
                            }
                        }
                    }
                }
                Some(_) => report.error(
                    FrameworkError::validation(
                        "validate_component",
                        error_ids::INVALID_FIELD_VALUE,
                        format!("provides of component '{}' must be a list", id),
                    )
                    .with_component(id.clone())
                    .with_field(format!("{}.provides", prefix)),
                ),
            }
        }
    }

    /// Runs every rule on every regulated component; returns whether no
    /// finding or rule failure occurred.
    fn check_compliance(&self, spec: &Value, report: &mut Report) -> bool {
        let Some(components) = spec.get("components") else {
            return true;
        };
        let mut compliant = true;
        for (id, component) in component_entries(components) {
            if !self.is_regulated(component) {
                continue;
            }
            for rule in &self.rules {
                let outcome = catch_unwind(AssertUnwindSafe(|| rule.check(spec, &id, component)));
                match outcome {
                    Ok(Ok(findings)) => {
                        compliant &= findings.is_empty();
                        for mut finding in findings {
                            if finding.is_blocking() {
                                finding = finding.with_severity(ErrorSeverity::Warning);
                            }
                            report.warnings.push(finding.with_component(id.clone()));
                        }
                    }
                    Ok(Err(e)) => {
                        compliant = false;
                        report.error(rule_failure(rule.name(), &id, e.to_string(), "error"));
                    }
                    Err(payload) => {
                        compliant = false;
                        report.error(rule_failure(rule.name(), &id, panic_message(payload.as_ref()), "panic"));
                    }
                }
            }
        }
        compliant
    }

    fn is_regulated(&self, component: &Value) -> bool {
        let Some(component_type) = component.get("type").and_then(Value::as_str) else {
            return false;
        };
        is_regulated_type(component_type)
            || self
                .catalog
                .as_ref()
                .and_then(|c| c.get(component_type))
                .map_or(false, |c| c.category.is_regulated())
    }
}

impl Default for SpecificationValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Report {
    errors: Vec<FrameworkError>,
    warnings: Vec<FrameworkError>,
}

impl Report {
    fn error(&mut self, error: FrameworkError) {
        self.errors.push(error);
    }

    fn warn(&mut self, error_id: &str, message: String, field: Option<&str>) {
        let mut warning = FrameworkError::validation("validate_specification", error_id, message)
            .with_severity(ErrorSeverity::Warning);
        if let Some(field) = field {
            warning = warning.with_field(field);
        }
        self.warnings.push(warning);
    }
}

fn rule_failure(rule: &str, component_id: &str, message: String, exception_type: &str) -> FrameworkError {
    FrameworkError::validation(
        "check_compliance",
        error_ids::COMPLIANCE_CHECK_FAILED,
        format!("Compliance rule '{}' failed: {}", rule, message),
    )
    .with_component(component_id)
    .with_exception_type(exception_type)
}

fn poor_naming_term(name: &str) -> Option<&'static str> {
    let lowered = name.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    POOR_NAMING_TERMS.iter().copied().find(|term| {
        if term.contains('_') {
            lowered.contains(term)
        } else {
            words.contains(term)
        }
    })
}

/// Components of a raw document in declaration order, skipping list entries
/// without an id.
pub fn component_entries(components: &Value) -> Vec<(String, &Value)> {
    match components {
        Value::Object(map) => map.iter().map(|(id, c)| (id.clone(), c)).collect(),
        Value::Array(list) => list
            .iter()
            .filter_map(|c| c.get("id").and_then(Value::as_str).map(|id| (id.to_string(), c)))
            .collect(),
        _ => Vec::new(),
    }
}

fn link_targets(component: &Value) -> Vec<&str> {
    component
        .get("provides")
        .and_then(Value::as_array)
        .map(|links| links.iter().filter_map(|l| l.get("in").and_then(Value::as_str)).collect())
        .unwrap_or_default()
}

fn check_dependency_cycles(entries: &[(String, &Value)], report: &mut Report) {
    let graph: HashMap<&str, Vec<&str>> = entries
        .iter()
        .map(|(id, c)| (id.as_str(), link_targets(c)))
        .collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut reported: HashSet<Vec<&str>> = HashSet::new();

    for (start, _) in entries {
        let mut path: Vec<&str> = Vec::new();
        walk(start.as_str(), &graph, &mut path, &mut done, &mut |cycle| {
            let mut key = cycle[..cycle.len() - 1].to_vec();
            key.sort_unstable();
            if reported.insert(key) {
                report.warn(
                    error_ids::SPEC_DEPENDENCY_CYCLE,
                    format!("Circular dependency: {}", cycle.join(" -> ")),
                    Some("components"),
                );
            }
        });
    }
}

fn walk<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
    on_cycle: &mut dyn FnMut(Vec<&'a str>),
) {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(node);
        on_cycle(cycle);
        return;
    }
    if done.contains(node) {
        return;
    }
    path.push(node);
    for next in graph.get(node).into_iter().flatten() {
        if graph.contains_key(next) {
            walk(*next, graph, path, done, on_cycle);
        }
    }
    path.pop();
    done.insert(node);
}

fn check_performance(entries: &[(String, &Value)], report: &mut Report) {
    if entries.len() > MAX_COMPONENTS {
        report.warn(
            error_ids::SPEC_PERFORMANCE_LIMIT,
            format!("{} components exceed the recommended {}", entries.len(), MAX_COMPONENTS),
            Some("components"),
        );
    }
    let relationships: usize = entries.iter().map(|(_, c)| link_targets(c).len()).sum();
    if relationships > MAX_RELATIONSHIPS {
        report.warn(
            error_ids::SPEC_PERFORMANCE_LIMIT,
            format!("{} relationships exceed the recommended {}", relationships, MAX_RELATIONSHIPS),
            Some("components"),
        );
    }
    let intensive = entries
        .iter()
        .filter(|(_, c)| {
            c.get("type")
                .and_then(Value::as_str)
                .map_or(false, |t| MEMORY_INTENSIVE_TERMS.iter().any(|term| t.contains(term)))
        })
        .count();
    if intensive > MAX_MEMORY_INTENSIVE {
        report.warn(
            error_ids::SPEC_PERFORMANCE_LIMIT,
            format!("{} memory-intensive components exceed the recommended {}", intensive, MAX_MEMORY_INTENSIVE),
            Some("components"),
        );
    }
}

fn config_flag(component: &Value, keys: &[&str]) -> bool {
    keys.iter().any(|key| {
        component
            .get("config")
            .and_then(|c| c.get(*key))
            .map_or(false, |v| match v {
                Value::Bool(b) => *b,
                Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "on" | "enabled"),
                _ => false,
            })
    })
}

fn external_endpoint(component: &Value) -> Option<&str> {
    let config = component.get("config")?;
    ENDPOINT_KEYS.iter().find_map(|key| {
        config
            .get(*key)
            .and_then(Value::as_str)
            .filter(|url| url.starts_with("http") && !url.contains("localhost") && !url.contains("127.0.0.1"))
    })
}

pub struct EncryptionRule;

impl ComplianceRule for EncryptionRule {
    fn name(&self) -> &str {
        "phi_encryption"
    }

    fn description(&self) -> &str {
        "Regulated components must enable data encryption"
    }

    fn check(&self, _spec: &Value, component_id: &str, component: &Value) -> RuleResult {
        if config_flag(component, ENCRYPTION_KEYS) {
            return Ok(Vec::new());
        }
        Ok(vec![FrameworkError::compliance(
            "check_compliance",
            error_ids::COMPLIANCE_ENCRYPTION_MISSING,
            format!("'{}' handles regulated data without encryption enabled", component_id),
        )
        .with_fix("Set config.encryption: true")])
    }
}

pub struct AuditLoggingRule;

impl ComplianceRule for AuditLoggingRule {
    fn name(&self) -> &str {
        "audit_logging"
    }

    fn description(&self) -> &str {
        "Regulated components must keep an audit log"
    }

    fn check(&self, _spec: &Value, component_id: &str, component: &Value) -> RuleResult {
        if config_flag(component, &["audit_logging", "audit"]) {
            return Ok(Vec::new());
        }
        Ok(vec![FrameworkError::compliance(
            "check_compliance",
            error_ids::COMPLIANCE_AUDIT_LOGGING_MISSING,
            format!("'{}' handles regulated data without audit logging", component_id),
        )
        .with_fix("Set config.audit_logging: true")])
    }
}

/// Logging combined with an external endpoint can leak payloads.
pub struct DataExposureRule;

impl ComplianceRule for DataExposureRule {
    fn name(&self) -> &str {
        "data_exposure"
    }

    fn description(&self) -> &str {
        "Regulated payloads must not be logged when sent to external endpoints"
    }

    fn check(&self, _spec: &Value, component_id: &str, component: &Value) -> RuleResult {
        match external_endpoint(component) {
            Some(url) if config_flag(component, LOGGING_KEYS) => Ok(vec![FrameworkError::compliance(
                "check_compliance",
                error_ids::COMPLIANCE_DATA_EXPOSURE,
                format!("'{}' logs payloads sent to external endpoint {}", component_id, url),
            )
            .with_fix("Disable request logging or route through an internal endpoint")]),
            _ => Ok(Vec::new()),
        }
    }
}

pub struct UnregulatedSourceRule;

impl ComplianceRule for UnregulatedSourceRule {
    fn name(&self) -> &str {
        "regulated_data_flow"
    }

    fn description(&self) -> &str {
        "Regulated components should only receive data from regulated sources"
    }

    fn check(&self, spec: &Value, component_id: &str, _component: &Value) -> RuleResult {
        let Some(components) = spec.get("components") else {
            return Ok(Vec::new());
        };
        let findings = component_entries(components)
            .into_iter()
            .filter(|(id, source)| {
                id != component_id
                    && link_targets(source).contains(&component_id)
                    && !source
                        .get("type")
                        .and_then(Value::as_str)
                        .map_or(false, is_regulated_type)
            })
            .map(|(id, _)| {
                FrameworkError::compliance(
                    "check_compliance",
                    error_ids::COMPLIANCE_UNREGULATED_SOURCE,
                    format!("Unregulated component '{}' feeds regulated component '{}'", id, component_id),
                )
                .with_severity(ErrorSeverity::Info)
            })
            .collect();
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ComponentCategory, DiscoveredComponent};
    use serde_json::json;

    fn valid_spec() -> Value {
        json!({
            "name": "Claims Assistant",
            "description": "Answers claim status questions",
            "agentGoal": "Resolve claim status questions for members",
            "version": "1.2.0",
            "id": "urn:agent:genesis:insurance:claims-assistant:1.2.0",
            "components": {
                "input": {"type": "genesis:chat_input", "provides": [{"in": "agent", "useAs": "input"}]},
                "agent": {"type": "genesis:agent", "kind": "Agent", "provides": [{"in": "output", "useAs": "input"}]},
                "output": {"type": "genesis:chat_output"}
            }
        })
    }

    #[test]
    fn well_formed_spec_is_valid() {
        let result = SpecificationValidator::new().validate(&valid_spec(), false);
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(!result.compliance_checked);
    }

    #[test]
    fn structural_problems_are_errors() {
        let spec = json!({
            "name": 42,
            "version": "v1",
            "components": [
                {"type": "genesis:agent"},
                {"id": "a", "type": "genesis:agent", "provides": [{"useAs": "tools"}, {"in": "ghost"}]},
                {"id": "a", "type": "genesis:agent"}
            ],
            "variables": [{"name": "model"}]
        });
        let result = SpecificationValidator::new().validate(&spec, false);
        assert!(!result.valid);
        let ids: Vec<&str> = result.errors.iter().map(|e| e.error_id.as_str()).collect();
        for expected in [
            error_ids::MISSING_REQUIRED_FIELD,
            error_ids::INVALID_FIELD_VALUE,
            error_ids::DUPLICATE_COMPONENT_ID,
            error_ids::UNKNOWN_COMPONENT_ID,
        ] {
            assert!(ids.contains(&expected), "missing {} in {:?}", expected, ids);
        }
        assert!(result
            .errors
            .iter()
            .any(|e| e.field_path.as_deref() == Some("variables[0].type")));
        assert!(result.clone().into_outcome().is_err());
    }

    #[test]
    fn listed_components_without_ids_get_positional_names() {
        let mut spec = valid_spec();
        spec["components"] = json!([
            {"id": "input", "type": "genesis:chat_input", "provides": [{"in": "component_1", "useAs": "input"}]},
            {"type": "genesis:agent", "kind": "Agent"}
        ]);
        let result = SpecificationValidator::new().validate(&spec, false);
        assert!(result.valid, "{:?}", result.errors);
        let warning = result
            .warnings
            .iter()
            .find(|w| w.error_id == error_ids::SPEC_NONSTANDARD_VALUE)
            .unwrap();
        assert_eq!(warning.field_path.as_deref(), Some("components[1].id"));
        assert!(warning.message.contains("component_1"));

        let decoded = crate::spec::Specification::from_value(&spec).unwrap();
        assert!(decoded.components.contains_key("component_1"));

        // A positional name still collides with an explicit id
        spec["components"][0]["id"] = json!("component_1");
        let result = SpecificationValidator::new().validate(&spec, false);
        assert!(result.errors.iter().any(|e| e.error_id == error_ids::DUPLICATE_COMPONENT_ID));
    }

    #[test]
    fn advisory_findings_are_warnings() {
        let mut spec = valid_spec();
        spec["name"] = json!("MVP test agent");
        spec["legacy_mode"] = json!(true);
        spec["agentGoal"] = json!("short");
        spec["components"]["agent"]["provides"] = json!([{"in": "input", "useAs": "feedback"}]);
        let result = SpecificationValidator::new().validate(&spec, false);
        assert!(result.valid);
        let ids: HashSet<&str> = result.warnings.iter().map(|e| e.error_id.as_str()).collect();
        assert!(ids.contains(error_ids::SPEC_DEPRECATED_FIELD));
        assert!(ids.contains(error_ids::SPEC_NAMING_CONVENTION));
        assert!(ids.contains(error_ids::SPEC_MISSING_AGENT_GOAL));
        assert!(ids.contains(error_ids::SPEC_NONSTANDARD_VALUE));
        assert!(ids.contains(error_ids::SPEC_DEPENDENCY_CYCLE));
        assert!(result.warnings.iter().all(|w| !w.is_blocking()));
    }

    #[test]
    fn catalog_check_flags_unknown_types() {
        let catalog = Catalog::from_components(vec![
            DiscoveredComponent::new("genesis:chat_input", "ChatInput", "pkg", ComponentCategory::Io),
            DiscoveredComponent::new("genesis:agent", "Agent", "pkg", ComponentCategory::Agent),
        ]);
        let result = SpecificationValidator::new()
            .with_catalog(Arc::new(catalog))
            .validate(&valid_spec(), false);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error_id, error_ids::UNKNOWN_COMPONENT_TYPE);
        assert_eq!(result.errors[0].component_id.as_deref(), Some("output"));
    }

    #[test]
    fn compliance_findings_are_warnings() {
        let mut spec = valid_spec();
        spec["components"]["ehr"] = json!({
            "type": "genesis:ehr_connector",
            "config": {"logging": true, "endpoint": "https://ehr.example.com/api"}
        });
        spec["components"]["agent"]["provides"] = json!([
            {"in": "output", "useAs": "input"},
            {"in": "ehr", "useAs": "query"}
        ]);
        let result = SpecificationValidator::new().validate(&spec, true);
        assert!(result.valid);
        assert!(result.compliance_checked);
        assert!(!result.compliant);
        let ids: HashSet<&str> = result.warnings.iter().map(|e| e.error_id.as_str()).collect();
        assert!(ids.contains(error_ids::COMPLIANCE_ENCRYPTION_MISSING));
        assert!(ids.contains(error_ids::COMPLIANCE_AUDIT_LOGGING_MISSING));
        assert!(ids.contains(error_ids::COMPLIANCE_DATA_EXPOSURE));
        assert!(ids.contains(error_ids::COMPLIANCE_UNREGULATED_SOURCE));
        assert!(result
            .warnings
            .iter()
            .filter(|w| w.error_id == error_ids::COMPLIANCE_DATA_EXPOSURE)
            .all(|w| w.component_id.as_deref() == Some("ehr")));
    }

    struct Exploding;

    impl ComplianceRule for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn check(&self, _spec: &Value, _id: &str, _component: &Value) -> RuleResult {
            panic!("rule blew up")
        }
    }

    struct Failing;

    impl ComplianceRule for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always errors"
        }

        fn check(&self, _spec: &Value, _id: &str, _component: &Value) -> RuleResult {
            Err("lookup table missing".into())
        }
    }

    #[test]
    fn rule_failures_become_validation_errors() {
        let mut spec = valid_spec();
        spec["components"]["patient"] = json!({
            "type": "genesis:patient_lookup",
            "config": {"encryption": true, "audit_logging": true}
        });
        let validator = SpecificationValidator::new()
            .with_rule(Box::new(Exploding))
            .with_rule(Box::new(Failing));
        let result = validator.validate(&spec, true);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert!(result
            .errors
            .iter()
            .all(|e| e.error_id == error_ids::COMPLIANCE_CHECK_FAILED
                && e.category == crate::error::ErrorCategory::Validation));
        assert_eq!(result.errors[0].exception_type.as_deref(), Some("panic"));
        assert!(result.errors[0].message.contains("rule blew up"));
        assert!(validator.rule_names().contains(&"exploding"));
    }
}
