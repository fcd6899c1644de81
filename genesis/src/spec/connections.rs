//! Edge construction from declared `provides` links, plus optional inferred
//! wiring between inputs, agents, outputs and tools.

use super::context::ProcessingContext;
use super::model::{ComponentSpec, FlowEdge};
use crate::catalog::{ComponentCategory, ComponentMapping};
use crate::config::ConverterConfig;
use crate::error::{error_ids, ErrorCategory, ErrorHandler, Failure, FrameworkError, Outcome};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Longest encoded handle accepted
pub const MAX_HANDLE_LENGTH: usize = 10_000;
const MAX_HANDLE_DEPTH: usize = 32;
const EDGE_ID_ATTEMPTS: u32 = 3;
/// Stands in for `"` inside encoded handles
const HANDLE_QUOTE: &str = "œ";

const HEALTHCARE_TOOL_TERMS: &[&str] = &["ehr", "eligibility", "claims", "medical"];
const HEALTHCARE_PROMPT_TERMS: &[&str] = &["medical", "health", "patient", "clinical"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Connections {
    pub edges: Vec<FlowEdge>,
    pub explicit: usize,
    pub implicit: usize,
    pub duplicates_removed: usize,
}

pub struct ConnectionBuilder {
    implicit_connections: bool,
    error_handler: ErrorHandler,
}

impl ConnectionBuilder {
    pub fn new(implicit_connections: bool) -> Self {
        Self {
            implicit_connections,
            error_handler: ErrorHandler::new("connection_builder"),
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.implicit_connections)
    }

    /// Build from an undecoded `components` value. Anything other than a map
    /// fails immediately.
    pub fn build_value(
        &self,
        components: &Value,
        mappings: &HashMap<String, ComponentMapping>,
        context: &ProcessingContext,
    ) -> Outcome<Connections> {
        let Value::Object(raw) = components else {
            return Err(self
                .error_handler
                .create(
                    "build_connections",
                    error_ids::CONNECTION_INVALID_COMPONENTS,
                    ErrorCategory::Validation,
                    format!("Components must be a map, got {}", json_type(components)),
                )
                .with_fix("Key components by instance id")
                .into());
        };

        let mut parsed = IndexMap::with_capacity(raw.len());
        let mut errors = Vec::new();
        for (id, value) in raw {
            match serde_json::from_value::<ComponentSpec>(value.clone()) {
                Ok(component) => {
                    parsed.insert(id.clone(), component);
                }
                Err(e) => errors.push(
                    FrameworkError::validation(
                        "build_connections",
                        error_ids::INVALID_FIELD_VALUE,
                        format!("Component '{}' is malformed: {}", id, e),
                    )
                    .with_component(id.clone())
                    .with_field(format!("components.{}", id)),
                ),
            }
        }
        if let Some(failure) = Failure::from_errors(errors) {
            return Err(failure);
        }
        self.build(&parsed, mappings, context)
    }

    /// `mappings` is keyed by instance id. Every link failure is collected;
    /// any failure means no edges are returned.
    pub fn build(
        &self,
        components: &IndexMap<String, ComponentSpec>,
        mappings: &HashMap<String, ComponentMapping>,
        context: &ProcessingContext,
    ) -> Outcome<Connections> {
        let mut state = EdgeSet::default();
        let mut errors = Vec::new();

        for (source_id, component) in components {
            for (i, link) in component.provides.iter().enumerate() {
                let field = format!("components.{}.provides[{}]", source_id, i);
                match self.explicit_edge(source_id, link.target.as_str(), &link.use_as, components, mappings, &mut state) {
                    Ok(()) => {}
                    Err(e) => errors.push(e.with_component(source_id.clone()).with_field(field)),
                }
            }
        }
        let explicit = state.edges.len();

        if self.implicit_connections && errors.is_empty() {
            if let Err(e) = self.implicit_edges(components, mappings, &mut state) {
                errors.push(e);
            }
        }

        if let Some(failure) = Failure::from_errors(errors) {
            for error in failure.errors() {
                self.error_handler.log(error);
            }
            return Err(failure);
        }

        let connections = Connections {
            implicit: state.edges.len() - explicit,
            explicit,
            duplicates_removed: state.duplicates,
            edges: state.edges,
        };
        tracing::info!(
            request_id = context.request_id(),
            explicit = connections.explicit,
            implicit = connections.implicit,
            duplicates = connections.duplicates_removed,
            "built connections"
        );
        Ok(connections)
    }

    fn explicit_edge(
        &self,
        source_id: &str,
        target_id: &str,
        use_as: &str,
        components: &IndexMap<String, ComponentSpec>,
        mappings: &HashMap<String, ComponentMapping>,
        state: &mut EdgeSet,
    ) -> Result<(), FrameworkError> {
        if target_id.is_empty() {
            return Err(FrameworkError::validation(
                "build_connections",
                error_ids::MISSING_REQUIRED_FIELD,
                format!("Link from '{}' has no 'in' target", source_id),
            ));
        }
        if !components.contains_key(target_id) {
            return Err(FrameworkError::validation(
                "build_connections",
                error_ids::CONNECTION_UNKNOWN_TARGET,
                format!("'{}' provides to unknown component '{}'", source_id, target_id),
            )
            .with_fix("Point 'in' at an existing component id"));
        }
        let source = mapping_for(source_id, components, mappings)?;
        let target = mapping_for(target_id, components, mappings)?;
        state.add(source_id, source, target_id, target, use_as, true)
    }

    fn implicit_edges(
        &self,
        components: &IndexMap<String, ComponentSpec>,
        mappings: &HashMap<String, ComponentMapping>,
        state: &mut EdgeSet,
    ) -> Result<(), FrameworkError> {
        let mapped: Vec<(&str, &ComponentSpec, &ComponentMapping)> = components
            .iter()
            .filter_map(|(id, c)| mappings.get(id).map(|m| (id.as_str(), c, m)))
            .collect();
        let inputs: Vec<_> = mapped.iter().filter(|(_, _, m)| is_input(m)).collect();
        let agents: Vec<_> = mapped.iter().filter(|(_, _, m)| is_agent(m)).collect();
        let outputs: Vec<_> = mapped.iter().filter(|(_, _, m)| is_output(m)).collect();

        for (input_id, _, input) in &inputs {
            for (agent_id, _, agent) in &agents {
                if !state.connected(input_id, agent_id) {
                    state.add(input_id, input, agent_id, agent, "input", false)?;
                }
            }
        }
        for (agent_id, _, agent) in &agents {
            for (output_id, _, output) in &outputs {
                if !state.connected(agent_id, output_id) {
                    state.add(agent_id, agent, output_id, output, "response", false)?;
                }
            }
        }
        for (tool_id, tool_spec, tool) in mapped.iter().filter(|(_, c, m)| is_tool_provider(c, m)) {
            for (agent_id, agent_spec, agent) in &agents {
                if tool_id != agent_id
                    && !state.connected(tool_id, agent_id)
                    && should_wire_tool(tool_spec, agent_spec)
                {
                    state.add(tool_id, tool, agent_id, agent, "tools", false)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new(false)
    }
}

#[derive(Default)]
struct EdgeSet {
    edges: Vec<FlowEdge>,
    ids: HashSet<String>,
    links: HashSet<(String, String, String)>,
    pairs: HashSet<(String, String)>,
    duplicates: usize,
}

impl EdgeSet {
    fn connected(&self, from: &str, to: &str) -> bool {
        self.pairs.contains(&(from.to_string(), to.to_string()))
    }

    fn add(
        &mut self,
        from: &str,
        source: &ComponentMapping,
        to: &str,
        target: &ComponentMapping,
        use_as: &str,
        explicit: bool,
    ) -> Result<(), FrameworkError> {
        let link = (from.to_string(), to.to_string(), use_as.to_string());
        if self.links.contains(&link) {
            self.duplicates += 1;
            return Ok(());
        }
        let source_handle = encode_handle(&source_handle(source, from))?;
        let target_handle = encode_handle(&target_handle(target, to, use_as))?;
        let id = self.edge_id(from, to, use_as)?;

        tracing::debug!(from, to, use_as, explicit, "connection");
        self.links.insert(link);
        self.pairs.insert((from.to_string(), to.to_string()));
        self.edges.push(FlowEdge {
            id,
            from: from.to_string(),
            to: to.to_string(),
            use_as: use_as.to_string(),
            source_handle,
            target_handle,
            explicit,
        });
        Ok(())
    }

    /// Content-derived id, re-salted on collision.
    fn edge_id(&mut self, from: &str, to: &str, use_as: &str) -> Result<String, FrameworkError> {
        for attempt in 0..EDGE_ID_ATTEMPTS {
            let mut hasher = Sha256::new();
            hasher.update(from.as_bytes());
            hasher.update([0u8]);
            hasher.update(to.as_bytes());
            hasher.update([0u8]);
            hasher.update(use_as.as_bytes());
            hasher.update(attempt.to_le_bytes());
            let digest = format!("{:x}", hasher.finalize());
            let id = format!("edge-{}", &digest[..12]);
            if self.ids.insert(id.clone()) {
                return Ok(id);
            }
        }
        Err(FrameworkError::system(
            "build_connections",
            error_ids::CONNECTION_ID_COLLISION,
            format!(
                "Could not allocate a unique edge id for {} -> {} after {} attempts",
                from, to, EDGE_ID_ATTEMPTS
            ),
        )
        .retryable(true))
    }
}

fn mapping_for<'a>(
    id: &str,
    components: &IndexMap<String, ComponentSpec>,
    mappings: &'a HashMap<String, ComponentMapping>,
) -> Result<&'a ComponentMapping, FrameworkError> {
    mappings.get(id).ok_or_else(|| {
        let declared = components
            .get(id)
            .map(|c| c.component_type.as_str())
            .unwrap_or("?");
        FrameworkError::validation(
            "build_connections",
            error_ids::UNKNOWN_COMPONENT_TYPE,
            format!("Component '{}' has unknown type '{}'", id, declared),
        )
        .with_fix("Run discovery over the tree that defines this component")
    })
}

fn is_input(m: &ComponentMapping) -> bool {
    m.category == ComponentCategory::Io && m.genesis_type.contains("input")
}

fn is_output(m: &ComponentMapping) -> bool {
    m.category == ComponentCategory::Io && m.genesis_type.contains("output")
}

fn is_agent(m: &ComponentMapping) -> bool {
    m.category == ComponentCategory::Agent
}

fn is_tool_provider(spec: &ComponentSpec, m: &ComponentMapping) -> bool {
    !is_agent(m)
        && (spec.as_tools
            || m.capabilities.provides_tools
            || m.genesis_type.contains("api_request")
            || m.genesis_type.contains("connector"))
}

fn should_wire_tool(tool: &ComponentSpec, agent: &ComponentSpec) -> bool {
    if tool.as_tools || tool.component_type.contains("api_request") {
        return true;
    }
    let tool_type = tool.component_type.to_lowercase();
    if HEALTHCARE_TOOL_TERMS.iter().any(|t| tool_type.contains(t)) {
        let prompt = agent
            .config
            .get("system_message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        return HEALTHCARE_PROMPT_TERMS.iter().any(|t| prompt.contains(t));
    }
    false
}

fn source_handle(m: &ComponentMapping, node_id: &str) -> Value {
    let (data_type, name, output_types) = if m.genesis_type.contains("chat_input") {
        ("ChatInput".to_string(), "message".to_string(), vec!["Message".to_string()])
    } else if is_agent(m) {
        ("Agent".to_string(), "response".to_string(), vec!["Message".to_string()])
    } else if m.genesis_type.contains("chat_output") {
        ("ChatOutput".to_string(), "message".to_string(), vec!["Message".to_string()])
    } else {
        let first = m.outputs.first();
        (
            m.component.clone(),
            first.map_or_else(|| "output".to_string(), |o| o.name.clone()),
            first
                .filter(|o| !o.types.is_empty())
                .map_or_else(|| vec!["Data".to_string()], |o| o.types.clone()),
        )
    };
    json!({
        "dataType": data_type,
        "id": node_id,
        "name": name,
        "output_types": output_types,
    })
}

fn target_handle(m: &ComponentMapping, node_id: &str, use_as: &str) -> Value {
    if is_output(m) {
        return json!({
            "fieldName": "input_value",
            "id": node_id,
            "inputTypes": ["Data", "DataFrame", "Message"],
            "type": "other",
        });
    }
    if is_agent(m) {
        return if use_as == "tools" {
            json!({"fieldName": "tools", "id": node_id, "inputTypes": ["Tool"], "type": "list"})
        } else {
            json!({"fieldName": "input_value", "id": node_id, "inputTypes": ["Message"], "type": "str"})
        };
    }
    match m.inputs.iter().find(|i| i.name == use_as) {
        Some(input) => json!({
            "fieldName": input.name,
            "id": node_id,
            "inputTypes": if input.input_types.is_empty() {
                vec!["Data".to_string(), "Message".to_string()]
            } else {
                input.input_types.clone()
            },
            "type": if input.is_list { "list" } else { "str" },
        }),
        None => json!({
            "fieldName": "input_value",
            "id": node_id,
            "inputTypes": ["Data", "Message"],
            "type": "str",
        }),
    }
}

/// Compact JSON with `"` replaced by `œ`, so the handle can be embedded in
/// delimiter-sensitive strings.
pub fn encode_handle(payload: &Value) -> Result<String, FrameworkError> {
    if nesting(payload) > MAX_HANDLE_DEPTH {
        return Err(FrameworkError::new(
            "encode_handle",
            error_ids::CONNECTION_HANDLE_CREATION_FAILED,
            ErrorCategory::Connection,
            format!("Handle payload nests deeper than {} levels", MAX_HANDLE_DEPTH),
        ));
    }
    let encoded = serde_json::to_string(payload).map_err(|e| {
        FrameworkError::new(
            "encode_handle",
            error_ids::CONNECTION_HANDLE_CREATION_FAILED,
            ErrorCategory::Connection,
            e.to_string(),
        )
        .with_exception_type("serde_json::Error")
    })?;
    if encoded.len() > MAX_HANDLE_LENGTH {
        return Err(FrameworkError::new(
            "encode_handle",
            error_ids::CONNECTION_HANDLE_CREATION_FAILED,
            ErrorCategory::Connection,
            format!("Handle payload is {} bytes, limit {}", encoded.len(), MAX_HANDLE_LENGTH),
        ));
    }
    Ok(encoded.replace('"', HANDLE_QUOTE))
}

fn nesting(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(nesting).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(nesting).max().unwrap_or(0),
        _ => 0,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DiscoveredComponent;
    use pretty_assertions::assert_eq;

    fn mapping(genesis_type: &str, category: ComponentCategory) -> ComponentMapping {
        let class = genesis_type.trim_start_matches("genesis:");
        ComponentMapping::from(&DiscoveredComponent::new(genesis_type, class, "pkg", category))
    }

    fn mappings(entries: &[(&str, &str, ComponentCategory)]) -> HashMap<String, ComponentMapping> {
        entries
            .iter()
            .map(|(id, t, c)| (id.to_string(), mapping(t, c.clone())))
            .collect()
    }

    #[test]
    fn single_declared_link_becomes_one_edge() {
        let mut components = IndexMap::new();
        components.insert("a".to_string(), ComponentSpec::new("genesis:calculator").provides("b", "x"));
        components.insert("b".to_string(), ComponentSpec::new("genesis:agent"));
        let maps = mappings(&[
            ("a", "genesis:calculator", ComponentCategory::Tool),
            ("b", "genesis:agent", ComponentCategory::Agent),
        ]);

        let built = ConnectionBuilder::default()
            .build(&components, &maps, &ProcessingContext::new())
            .unwrap();
        assert_eq!(built.edges.len(), 1);
        let edge = &built.edges[0];
        assert_eq!((edge.from.as_str(), edge.to.as_str(), edge.use_as.as_str()), ("a", "b", "x"));
        assert!(edge.explicit);
        assert!(edge.id.starts_with("edge-"));
        assert!(!edge.source_handle.contains('"'));
        assert!(edge.target_handle.contains('œ'));
    }

    #[test]
    fn unknown_target_is_a_validation_error() {
        let mut components = IndexMap::new();
        components.insert("a".to_string(), ComponentSpec::new("genesis:calculator").provides("ghost", "x"));
        let maps = mappings(&[("a", "genesis:calculator", ComponentCategory::Tool)]);

        let err = ConnectionBuilder::default()
            .build(&components, &maps, &ProcessingContext::new())
            .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.first().category, ErrorCategory::Validation);
        assert_eq!(err.first().error_id, error_ids::CONNECTION_UNKNOWN_TARGET);
        assert_eq!(err.first().field_path.as_deref(), Some("components.a.provides[0]"));
    }

    #[test]
    fn components_must_be_a_map() {
        let err = ConnectionBuilder::default()
            .build_value(&json!(["a", "b"]), &HashMap::new(), &ProcessingContext::new())
            .unwrap_err();
        assert_eq!(err.first().error_id, error_ids::CONNECTION_INVALID_COMPONENTS);
    }

    #[test]
    fn unmapped_types_are_reported() {
        let components = json!({
            "a": {"type": "genesis:mystery", "provides": [{"in": "b", "useAs": "input"}]},
            "b": {"type": "genesis:agent"}
        });
        let maps = mappings(&[("b", "genesis:agent", ComponentCategory::Agent)]);
        let err = ConnectionBuilder::default()
            .build_value(&components, &maps, &ProcessingContext::new())
            .unwrap_err();
        assert!(err.has_error_id(error_ids::UNKNOWN_COMPONENT_TYPE));
    }

    #[test]
    fn implicit_wiring_never_duplicates_declared_links() {
        let mut components = IndexMap::new();
        components.insert("in".to_string(), ComponentSpec::new("genesis:chat_input").provides("agent", "input"));
        components.insert("agent".to_string(), ComponentSpec::new("genesis:agent"));
        components.insert("out".to_string(), ComponentSpec::new("genesis:chat_output"));
        components.insert("search".to_string(), ComponentSpec::new("genesis:web_search").as_tools(true));
        components.insert("calc".to_string(), ComponentSpec::new("genesis:calculator"));
        let maps = mappings(&[
            ("in", "genesis:chat_input", ComponentCategory::Io),
            ("agent", "genesis:agent", ComponentCategory::Agent),
            ("out", "genesis:chat_output", ComponentCategory::Io),
            ("search", "genesis:web_search", ComponentCategory::Tool),
            ("calc", "genesis:calculator", ComponentCategory::Tool),
        ]);

        let built = ConnectionBuilder::new(true)
            .build(&components, &maps, &ProcessingContext::new())
            .unwrap();
        let links: Vec<(&str, &str, &str)> = built
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str(), e.use_as.as_str()))
            .collect();
        assert_eq!(
            links,
            vec![
                ("in", "agent", "input"),
                ("agent", "out", "response"),
                ("search", "agent", "tools"),
            ]
        );
        assert_eq!((built.explicit, built.implicit), (1, 2));
        assert!(built.edges[2].target_handle.contains("tools"));
    }

    #[test]
    fn repeated_links_collapse_and_ids_are_stable() {
        let mut components = IndexMap::new();
        components.insert(
            "a".to_string(),
            ComponentSpec::new("genesis:calculator").provides("b", "tools").provides("b", "tools"),
        );
        components.insert("b".to_string(), ComponentSpec::new("genesis:agent"));
        let maps = mappings(&[
            ("a", "genesis:calculator", ComponentCategory::Tool),
            ("b", "genesis:agent", ComponentCategory::Agent),
        ]);
        let builder = ConnectionBuilder::default();
        let first = builder.build(&components, &maps, &ProcessingContext::new()).unwrap();
        let second = builder.build(&components, &maps, &ProcessingContext::new()).unwrap();
        assert_eq!(first.edges.len(), 1);
        assert_eq!(first.duplicates_removed, 1);
        assert_eq!(first.edges, second.edges);
    }

    #[test]
    fn handles_reject_runaway_nesting() {
        let mut deep = json!("leaf");
        for _ in 0..40 {
            deep = json!([deep]);
        }
        let err = encode_handle(&deep).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Connection);
        assert_eq!(encode_handle(&json!({"a": 1})).unwrap(), "{œaœ:1}");
    }
}
