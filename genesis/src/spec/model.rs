//! Specification and flow graph documents.

use crate::catalog::{ComponentCategory, InputDescriptor};
use crate::error::{error_ids, FrameworkError, GenesisResult, Outcome};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_USE_AS: &str = "input";

fn default_use_as() -> String {
    DEFAULT_USE_AS.to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A declared link: this component feeds `target` as `use_as`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "in")]
    pub target: String,
    #[serde(rename = "useAs", default = "default_use_as")]
    pub use_as: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Link {
    pub fn new(target: impl Into<String>, use_as: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            use_as: use_as.into(),
            description: None,
        }
    }
}

/// One component instance in a specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Link>,
    /// Offer this component to agents as a tool
    #[serde(rename = "asTools", default, skip_serializing_if = "is_false")]
    pub as_tools: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComponentSpec {
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            name: None,
            kind: None,
            description: None,
            config: Map::new(),
            provides: Vec::new(),
            as_tools: false,
            extra: Map::new(),
        }
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn provides(mut self, target: impl Into<String>, use_as: impl Into<String>) -> Self {
        self.provides.push(Link::new(target, use_as));
        self
    }

    pub fn as_tools(mut self, as_tools: bool) -> Self {
        self.as_tools = as_tools;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
    #[serde(default, alias = "default", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declarative agent specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "agentGoal", default, skip_serializing_if = "Option::is_none")]
    pub agent_goal: Option<String>,
    #[serde(deserialize_with = "components_map_or_list")]
    pub components: IndexMap<String, ComponentSpec>,
    #[serde(
        default,
        deserialize_with = "variables_map_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub variables: Vec<VariableSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Specification {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            id: None,
            version: None,
            domain: None,
            kind: None,
            agent_goal: None,
            components: IndexMap::new(),
            variables: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_component(mut self, id: impl Into<String>, component: ComponentSpec) -> Self {
        self.components.insert(id.into(), component);
        self
    }

    /// Parse an already-decoded document.
    pub fn from_value(document: &Value) -> Outcome<Self> {
        serde_json::from_value(document.clone()).map_err(|e| {
            FrameworkError::validation(
                "parse_specification",
                error_ids::INVALID_INPUT_TYPE,
                format!("Specification does not match the expected shape: {}", e),
            )
            .with_fix("Provide name, description and a components map")
            .into()
        })
    }

    /// Declared variables with a value, by name.
    pub fn variable_table(&self) -> Map<String, Value> {
        self.variables
            .iter()
            .filter_map(|v| v.value.clone().map(|value| (v.name.clone(), value)))
            .collect()
    }

    pub fn link_count(&self) -> usize {
        self.components.values().map(|c| c.provides.len()).sum()
    }
}

/// Decode a JSON or YAML document.
pub fn parse_document(content: &str) -> GenesisResult<Value> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[derive(Deserialize)]
struct ListedComponent {
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    spec: ComponentSpec,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ComponentsRepr {
    Map(IndexMap<String, ComponentSpec>),
    List(Vec<ListedComponent>),
}

fn components_map_or_list<'de, D>(deserializer: D) -> Result<IndexMap<String, ComponentSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ComponentsRepr::deserialize(deserializer)? {
        ComponentsRepr::Map(map) => map,
        ComponentsRepr::List(list) => list
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c.id.unwrap_or_else(|| listed_component_id(i)), c.spec))
            .collect(),
    })
}

/// Id given to the `index`-th entry of a list-form `components` that has none.
pub fn listed_component_id(index: usize) -> String {
    format!("component_{}", index)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VariablesRepr {
    List(Vec<VariableSpec>),
    Map(IndexMap<String, Value>),
}

fn variables_map_or_list<'de, D>(deserializer: D) -> Result<Vec<VariableSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match VariablesRepr::deserialize(deserializer)? {
        VariablesRepr::List(list) => list,
        VariablesRepr::Map(map) => map
            .into_iter()
            .map(|(name, value)| VariableSpec {
                name,
                var_type: None,
                value: Some(value),
                required: false,
                description: None,
            })
            .collect(),
    })
}

/// Executable node: one per specification component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    /// Resolved genesis type
    #[serde(rename = "type")]
    pub node_type: String,
    /// Runtime component that implements the type
    pub component: String,
    pub display_name: String,
    pub category: ComponentCategory,
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Declared input fields of the component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template: Vec<InputDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "useAs")]
    pub use_as: String,
    #[serde(rename = "sourceHandle", default)]
    pub source_handle: String,
    #[serde(rename = "targetHandle", default)]
    pub target_handle: String,
    /// Declared in the specification rather than inferred
    #[serde(default)]
    pub explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn components_accept_map_and_list_forms() {
        let map_form = json!({
            "name": "Triage",
            "description": "d",
            "components": {
                "input": {"type": "genesis:chat_input", "provides": [{"in": "agent"}]},
                "agent": {"type": "genesis:agent", "config": {"temperature": 0.2}}
            }
        });
        let spec = Specification::from_value(&map_form).unwrap();
        assert_eq!(spec.components.len(), 2);
        assert_eq!(spec.components["input"].provides[0].use_as, "input");
        assert_eq!(spec.link_count(), 1);

        let list_form = json!({
            "name": "Triage",
            "components": [
                {"id": "agent", "type": "genesis:agent"},
                {"type": "genesis:chat_output"}
            ],
            "variables": [{"name": "model", "type": "string", "default": "gpt-4o"}]
        });
        let spec = Specification::from_value(&list_form).unwrap();
        let ids: Vec<&str> = spec.components.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["agent", "component_1"]);
        assert_eq!(spec.variable_table()["model"], json!("gpt-4o"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let doc = json!({
            "name": "n",
            "description": "d",
            "components": {"a": {"type": "genesis:agent", "icon": "bot"}},
            "tags": ["x"]
        });
        let spec = Specification::from_value(&doc).unwrap();
        assert_eq!(spec.extra["tags"], json!(["x"]));
        assert_eq!(spec.components["a"].extra["icon"], json!("bot"));
        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["tags"], json!(["x"]));
    }

    #[test]
    fn malformed_documents_are_validation_errors() {
        let err = Specification::from_value(&json!({"name": "x", "components": 3})).unwrap_err();
        assert_eq!(err.first().error_id, error_ids::INVALID_INPUT_TYPE);
    }

    #[test]
    fn yaml_and_json_documents_parse() {
        let yaml = "name: n\ndescription: d\ncomponents:\n  a:\n    type: genesis:agent\n";
        let doc = parse_document(yaml).unwrap();
        assert_eq!(doc["components"]["a"]["type"], "genesis:agent");
        let doc = parse_document(r#"{"name": "n"}"#).unwrap();
        assert_eq!(doc["name"], "n");
    }
}
