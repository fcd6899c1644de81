//! `${name}` template resolution over configuration values.
//!
//! Supported forms:
//! - `${name}`: variable value. A string that is exactly one placeholder yields
//!   the typed value, otherwise the value is interpolated as text.
//! - `${config.model}`: nested access into map-valued variables.
//! - `${flag?yes:no}`: conditional on the truthiness of `flag`.
//! - `${env.NAME}`: process environment, only when enabled.
//!
//! Unknown placeholders are left unchanged. Reference cycles between variables
//! are rejected before any expansion. Every call runs under a time budget and
//! rejects inputs above the configured size limits.

use crate::config::ResolverConfig;
use crate::error::{error_ids, ErrorCategory, ErrorHandler, FrameworkError, Outcome};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

static VARIABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());
static CONDITIONAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}?:]+)\?([^:}]*):([^}]*)\}").unwrap());
static ENVIRONMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{env\.([^}]+)\}").unwrap());
static SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\{([^}?:]+)\}$").unwrap());

const FALSY_STRINGS: &[&str] = &["", "false", "0", "no", "off"];

/// Outcome of checking a template against a variable table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableReport {
    pub missing: Vec<String>,
    pub circular: Vec<String>,
    pub invalid: Vec<String>,
}

impl VariableReport {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.circular.is_empty() && self.invalid.is_empty()
    }
}

pub struct VariableResolver {
    config: ResolverConfig,
    error_handler: ErrorHandler,
}

impl VariableResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            error_handler: ErrorHandler::new("variable_resolver"),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        config: &Map<String, Value>,
        variables: &Map<String, Value>,
    ) -> Outcome<Map<String, Value>> {
        self.resolve_until(config, variables, None)
    }

    /// Resolve under the configured budget, or `deadline` if that is sooner.
    pub fn resolve_until(
        &self,
        config: &Map<String, Value>,
        variables: &Map<String, Value>,
        deadline: Option<Instant>,
    ) -> Outcome<Map<String, Value>> {
        let budget = Instant::now() + self.config.timeout();
        let deadline = deadline.map_or(budget, |d| d.min(budget));

        self.check_map(config, "config")?;
        self.check_map(variables, "variables")?;

        let mut roots = BTreeSet::new();
        for value in config.values() {
            collect_references(value, &mut roots);
        }
        if let Some(cycle) = find_cycle(roots.iter().map(String::as_str), variables) {
            return Err(self.circular_error("resolve", &cycle).into());
        }

        let mut resolved = Map::with_capacity(config.len());
        for (key, value) in config {
            resolved.insert(key.clone(), self.resolve_value(value, variables, 0, deadline, key)?);
        }
        tracing::debug!(
            keys = resolved.len(),
            variables = variables.len(),
            "resolved configuration variables"
        );
        Ok(resolved)
    }

    /// Resolve a whole specification document. Built-in variables derived from
    /// the document are available, user variables take precedence.
    pub fn resolve_specification(
        &self,
        spec: &Value,
        variables: &Map<String, Value>,
    ) -> Outcome<Value> {
        let Value::Object(document) = spec else {
            return Err(self
                .error_handler
                .create(
                    "resolve_specification",
                    error_ids::VARIABLE_TYPE_VALIDATION_FAILED,
                    ErrorCategory::Validation,
                    "Specification must be a map",
                )
                .into());
        };
        let mut all = builtin_variables(spec);
        all.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.resolve(document, &all).map(Value::Object)
    }

    /// Report missing, circular and disallowed references in `template`.
    pub fn validate_variables(&self, template: &str, variables: &Map<String, Value>) -> VariableReport {
        let mut report = VariableReport::default();
        let refs = references_in(template);

        for reference in &refs {
            if let Some(name) = reference.strip_prefix("env.") {
                if !self.config.allow_environment_variables {
                    report
                        .invalid
                        .push(format!("Environment variables not allowed: {}", reference));
                } else if std::env::var(name).is_err() {
                    report.missing.push(reference.clone());
                }
            } else if lookup(reference, variables, false).is_none() {
                report.missing.push(reference.clone());
            }
        }

        let mut circular = BTreeSet::new();
        for reference in &refs {
            if let Some(cycle) = find_cycle(std::iter::once(reference.as_str()), variables) {
                circular.extend(cycle);
            }
        }
        report.circular = circular.into_iter().collect();
        report
    }

    fn resolve_value(
        &self,
        value: &Value,
        variables: &Map<String, Value>,
        depth: usize,
        deadline: Instant,
        path: &str,
    ) -> Outcome<Value> {
        self.check_deadline(deadline, path)?;
        match value {
            Value::String(text) => self.resolve_string(text, variables, depth, deadline, path),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.resolve_value(item, variables, depth, deadline, &format!("{}[{}]", path, i))
                })
                .collect::<Outcome<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    let child = format!("{}.{}", path, key);
                    out.insert(key.clone(), self.resolve_value(item, variables, depth, deadline, &child)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &self,
        text: &str,
        variables: &Map<String, Value>,
        depth: usize,
        deadline: Instant,
        path: &str,
    ) -> Outcome<Value> {
        self.check_deadline(deadline, path)?;
        if depth > self.config.max_depth {
            return Err(FrameworkError::validation(
                "resolve",
                error_ids::VARIABLE_NESTING_TOO_DEEP,
                format!(
                    "Placeholder expansion exceeded depth {}",
                    self.config.max_depth
                ),
            )
            .with_field(path)
            .with_fix("Flatten chained variable references")
            .into());
        }
        if !text.contains("${") {
            return Ok(Value::String(text.to_string()));
        }

        let allow_env = self.config.allow_environment_variables;
        if let Some(caps) = SINGLE.captures(text) {
            if let Some(value) = lookup(caps[1].trim(), variables, allow_env) {
                return self.resolve_value(&value, variables, depth + 1, deadline, path);
            }
        }

        let mut out = CONDITIONAL
            .replace_all(text, |caps: &Captures| {
                let flag = lookup(caps[1].trim(), variables, allow_env);
                if truthy(flag.as_ref()) {
                    caps[2].to_string()
                } else {
                    caps[3].to_string()
                }
            })
            .into_owned();
        self.check_expansion(out.len(), path)?;
        if allow_env {
            out = ENVIRONMENT
                .replace_all(&out, |caps: &Captures| {
                    std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
                })
                .into_owned();
        }
        self.check_expansion(out.len(), path)?;
        out = self.expand_variables(&out, variables, deadline, path)?;

        if out != text && VARIABLE.is_match(&out) {
            return self.resolve_string(&out, variables, depth + 1, deadline, path);
        }
        Ok(Value::String(out))
    }

    /// One `${name}` pass. The output is built incrementally so a fan-out of
    /// large values stops at `max_string_length` instead of after the copy.
    fn expand_variables(
        &self,
        text: &str,
        variables: &Map<String, Value>,
        deadline: Instant,
        path: &str,
    ) -> Outcome<String> {
        let allow_env = self.config.allow_environment_variables;
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in VARIABLE.captures_iter(text) {
            self.check_deadline(deadline, path)?;
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            let name = caps[1].trim();
            match lookup(name, variables, allow_env) {
                Some(value) => out.push_str(&display(&value)),
                None => {
                    tracing::trace!(variable = name, "unknown variable left unchanged");
                    out.push_str(whole.as_str());
                }
            }
            last = whole.end();
            self.check_expansion(out.len(), path)?;
        }
        out.push_str(&text[last..]);
        self.check_expansion(out.len(), path)?;
        Ok(out)
    }

    fn check_expansion(&self, len: usize, path: &str) -> Outcome<()> {
        if len > self.config.max_string_length {
            return Err(self.too_large(
                path,
                format!("placeholder expansion past {} bytes", self.config.max_string_length),
            ));
        }
        Ok(())
    }

    fn check_deadline(&self, deadline: Instant, path: &str) -> Outcome<()> {
        if Instant::now() >= deadline {
            return Err(FrameworkError::timeout(
                "resolve",
                error_ids::VARIABLE_RESOLUTION_TIMEOUT,
                format!(
                    "Variable resolution exceeded its {} ms budget",
                    self.config.timeout_ms
                ),
            )
            .with_field(path)
            .with_fix("Simplify the variable structure or raise resolver.timeout_ms")
            .into());
        }
        Ok(())
    }

    fn check_map(&self, map: &Map<String, Value>, path: &str) -> Outcome<()> {
        if map.len() > self.config.max_entries {
            return Err(self.too_large(path, format!("map with {} entries", map.len())));
        }
        for (key, value) in map {
            self.check_limits(value, 1, &format!("{}.{}", path, key))?;
        }
        let size = serde_json::to_vec(map).map(|v| v.len()).map_err(|e| {
            self.error_handler
                .from_error("resolve", error_ids::VARIABLE_RESOLUTION_FAILED, ErrorCategory::System, &e)
        })?;
        if size > self.config.max_serialized_bytes {
            return Err(self.too_large(path, format!("{} serialized bytes", size)));
        }
        Ok(())
    }

    fn check_limits(&self, value: &Value, nesting: usize, path: &str) -> Outcome<()> {
        if nesting > self.config.max_nesting {
            return Err(FrameworkError::validation(
                "resolve",
                error_ids::VARIABLE_NESTING_TOO_DEEP,
                format!("Value nests deeper than {} levels", self.config.max_nesting),
            )
            .with_field(path)
            .into());
        }
        match value {
            Value::Object(map) => {
                if map.len() > self.config.max_entries {
                    return Err(self.too_large(path, format!("map with {} entries", map.len())));
                }
                for (key, item) in map {
                    self.check_limits(item, nesting + 1, &format!("{}.{}", path, key))?;
                }
            }
            Value::Array(items) => {
                if items.len() > self.config.max_list_length {
                    return Err(self.too_large(path, format!("list with {} items", items.len())));
                }
                for (i, item) in items.iter().enumerate() {
                    self.check_limits(item, nesting + 1, &format!("{}[{}]", path, i))?;
                }
            }
            Value::String(s) if s.len() > self.config.max_string_length => {
                return Err(self.too_large(path, format!("string of {} bytes", s.len())));
            }
            _ => {}
        }
        Ok(())
    }

    fn too_large(&self, path: &str, what: String) -> crate::error::Failure {
        self.error_handler
            .create(
                "resolve",
                error_ids::INPUT_TOO_LARGE,
                ErrorCategory::System,
                format!("Input too large to copy safely: {}", what),
            )
            .with_field(path)
            .with_fix("Reduce the configuration size")
            .into()
    }

    fn circular_error(&self, operation: &str, cycle: &[String]) -> FrameworkError {
        self.error_handler
            .create(
                operation,
                error_ids::VARIABLE_CIRCULAR_REFERENCE,
                ErrorCategory::Validation,
                format!("Circular variable reference: {}", cycle.join(" -> ")),
            )
            .with_field(cycle.first().cloned().unwrap_or_default())
            .with_fix("Break the cycle between these variables")
    }
}

impl Default for VariableResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

/// Variables every specification provides.
pub fn builtin_variables(spec: &Value) -> Map<String, Value> {
    let text = |key: &str, default: &str| {
        Value::String(
            spec.get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string(),
        )
    };
    let component_count = match spec.get("components") {
        Some(Value::Object(m)) => m.len(),
        Some(Value::Array(a)) => a.len(),
        _ => 0,
    };
    let now = Utc::now();

    let mut vars = Map::new();
    vars.insert("spec_name".into(), text("name", ""));
    vars.insert("spec_version".into(), text("version", "1.0.0"));
    vars.insert("spec_domain".into(), text("domain", "general"));
    vars.insert("spec_kind".into(), text("kind", "Single Agent"));
    vars.insert("component_count".into(), Value::from(component_count));
    vars.insert("timestamp".into(), Value::String(now.to_rfc3339()));
    vars.insert("date".into(), Value::String(now.format("%Y-%m-%d").to_string()));
    vars.insert("time".into(), Value::String(now.format("%H:%M:%S").to_string()));
    vars
}

/// Every variable name referenced anywhere in `value`.
pub fn extract_variable_references(value: &Value) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    collect_references(value, &mut refs);
    refs
}

fn collect_references(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => refs.extend(references_in(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, refs)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, refs)),
        _ => {}
    }
}

fn references_in(text: &str) -> BTreeSet<String> {
    VARIABLE
        .captures_iter(text)
        .map(|caps| {
            let inner = &caps[1];
            inner.split('?').next().unwrap_or(inner).trim().to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

fn lookup(name: &str, variables: &Map<String, Value>, allow_env: bool) -> Option<Value> {
    if let Some(value) = variables.get(name) {
        return Some(value.clone());
    }
    if let Some(env_name) = name.strip_prefix("env.") {
        return if allow_env {
            std::env::var(env_name).ok().map(Value::String)
        } else {
            None
        };
    }
    let mut parts = name.split('.');
    let mut current = variables.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !FALSY_STRINGS.contains(&s.to_lowercase().as_str()),
        Some(_) => true,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Table key a reference depends on: the full name if defined, else its root.
fn variable_key<'a>(reference: &'a str, variables: &Map<String, Value>) -> Option<&'a str> {
    if reference.starts_with("env.") {
        return None;
    }
    if variables.contains_key(reference) {
        return Some(reference);
    }
    let root = reference.split('.').next()?;
    variables.contains_key(root).then_some(root)
}

/// First reference cycle reachable from `roots`, as `a -> b -> a`.
fn find_cycle<'a>(
    roots: impl Iterator<Item = &'a str>,
    variables: &Map<String, Value>,
) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Active,
        Done,
    }

    fn visit(
        name: &str,
        variables: &Map<String, Value>,
        marks: &mut HashMap<String, Mark>,
        stack: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Active) => {
                let start = stack.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(name.to_string(), Mark::Active);
        stack.push(name.to_string());
        if let Some(value) = variables.get(name) {
            for reference in extract_variable_references(value) {
                if let Some(key) = variable_key(&reference, variables) {
                    if let Some(cycle) = visit(key, variables, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
        stack.pop();
        marks.insert(name.to_string(), Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    for root in roots {
        if let Some(key) = variable_key(root, variables) {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(key, variables, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn resolves_nested_structures() {
        let resolver = VariableResolver::default();
        let config = map(json!({
            "model": "${model}",
            "prompt": "You are ${role} for ${org.name}",
            "max_tokens": "${tokens}",
            "nested": {"list": ["${role}", 3, {"deep": "${org.name}"}]},
            "unknown": "${nope} stays"
        }));
        let vars = map(json!({
            "model": "gpt-4o",
            "role": "a triage assistant",
            "tokens": 4096,
            "org": {"name": "Acme"}
        }));

        let resolved = resolver.resolve(&config, &vars).unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({
                "model": "gpt-4o",
                "prompt": "You are a triage assistant for Acme",
                "max_tokens": 4096,
                "nested": {"list": ["a triage assistant", 3, {"deep": "Acme"}]},
                "unknown": "${nope} stays"
            })
        );
    }

    #[test]
    fn conditionals_and_chained_variables() {
        let resolver = VariableResolver::default();
        let config = map(json!({
            "mode": "${debug?verbose:quiet}",
            "off": "${missing?yes:no}",
            "greeting": "Hello ${who}"
        }));
        let vars = map(json!({"debug": "true", "who": "${first} ${last}", "first": "Ada", "last": "L"}));
        let resolved = resolver.resolve(&config, &vars).unwrap();
        assert_eq!(resolved["mode"], "verbose");
        assert_eq!(resolved["off"], "no");
        assert_eq!(resolved["greeting"], "Hello Ada L");
    }

    #[test]
    fn two_cycle_is_rejected() {
        let resolver = VariableResolver::default();
        let vars = map(json!({"var1": "${var2}", "var2": "${var1}"}));
        let config = map(json!({"value": "${var1}"}));

        let err = resolver.resolve(&config, &vars).unwrap_err();
        assert_eq!(err.first().error_id, error_ids::VARIABLE_CIRCULAR_REFERENCE);
        assert_eq!(err.first().category, ErrorCategory::Validation);

        let report = resolver.validate_variables("${var1}", &vars);
        assert!(!report.is_valid());
        assert_eq!(report.circular, vec!["var1".to_string(), "var2".to_string()]);
    }

    #[test]
    fn validate_reports_missing_and_disallowed() {
        let resolver = VariableResolver::default();
        let vars = map(json!({"a": 1}));
        let report = resolver.validate_variables("${a} ${b} ${env.HOME}", &vars);
        assert_eq!(report.missing, vec!["b".to_string()]);
        assert_eq!(report.invalid.len(), 1);
        assert!(report.circular.is_empty());
    }

    #[test]
    fn environment_placeholders_need_opt_in() {
        let config = map(json!({"path": "${env.PATH}"}));
        let closed = VariableResolver::default().resolve(&config, &Map::new()).unwrap();
        assert_eq!(closed["path"], "${env.PATH}");

        let open = VariableResolver::new(ResolverConfig {
            allow_environment_variables: true,
            ..ResolverConfig::default()
        });
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(open.resolve(&config, &Map::new()).unwrap()["path"], json!(path));
        }
    }

    #[test]
    fn oversized_input_is_a_system_error() {
        let resolver = VariableResolver::new(ResolverConfig {
            max_list_length: 3,
            ..ResolverConfig::default()
        });
        let config = map(json!({"items": [1, 2, 3, 4]}));
        let err = resolver.resolve(&config, &Map::new()).unwrap_err();
        assert_eq!(err.first().error_id, error_ids::INPUT_TOO_LARGE);
        assert_eq!(err.first().category, ErrorCategory::System);
        assert_eq!(err.first().field_path.as_deref(), Some("config.items"));
    }

    #[test]
    fn exhausted_budget_is_a_timeout() {
        let resolver = VariableResolver::new(ResolverConfig {
            timeout_ms: 0,
            ..ResolverConfig::default()
        });
        let config = map(json!({"a": "${b}"}));
        let err = resolver.resolve(&config, &map(json!({"b": 1}))).unwrap_err();
        assert!(err.has_category(ErrorCategory::Timeout));
    }

    #[test]
    fn fan_out_stops_at_the_string_limit() {
        let resolver = VariableResolver::default();
        let vars = map(json!({
            "a": "${b}".repeat(200),
            "b": "${c}".repeat(200),
            "c": "${d}".repeat(200),
            "d": "0123456789"
        }));
        let config = map(json!({"x": "${a}"}));

        let started = Instant::now();
        let err = resolver.resolve(&config, &vars).unwrap_err();
        assert!(started.elapsed() < resolver.config().timeout());
        assert_eq!(err.errors()[0].error_id, error_ids::INPUT_TOO_LARGE);
        assert_eq!(err.errors()[0].field_path.as_deref(), Some("x"));
        assert!(err.has_category(ErrorCategory::System));
    }

    #[test]
    fn small_fan_out_still_resolves() {
        let resolver = VariableResolver::default();
        let vars = map(json!({"a": "${b}-${b}", "b": "${c}${c}", "c": "xy"}));
        let resolved = resolver.resolve(&map(json!({"x": "[${a}]"})), &vars).unwrap();
        assert_eq!(resolved["x"], json!("[xyxy-xyxy]"));
    }

    #[test]
    fn specification_builtins_yield_to_user_variables() {
        let resolver = VariableResolver::default();
        let spec = json!({
            "name": "Claims Agent",
            "components": {"a": {"type": "genesis:agent", "config": {"title": "${spec_name} v${spec_version} (${component_count})"}}},
            "note": "${spec_domain}"
        });
        let resolved = resolver
            .resolve_specification(&spec, &map(json!({"spec_domain": "healthcare"})))
            .unwrap();
        assert_eq!(resolved["components"]["a"]["config"]["title"], "Claims Agent v1.0.0 (1)");
        assert_eq!(resolved["note"], "healthcare");
        assert!(extract_variable_references(&spec).contains("spec_name"));
    }
}
