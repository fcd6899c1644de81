//! Capability introspection over loaded classes.
//!
//! Every fact is derived from the class's effective members and ancestor
//! chain, once, into a plain [`DiscoveredComponent`] record.

use super::loader::LoadedClass;
use super::parser::PyExpr;
use super::variants::VariantRules;
use crate::catalog::{
    ClassVariable, ComponentCapabilities, ComponentCategory, ComponentVariant, DiscoveredComponent,
    InputDescriptor, IntrospectionData, OutputDescriptor, VariantOrigin,
};
use crate::config::DiscoveryConfig;
use crate::error::{error_ids, ErrorCategory, ErrorHandler, FrameworkError};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static CAMEL_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());
static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

const TYPE_SUFFIXES: [&str; 5] = ["Component", "Node", "Tool", "Agent", "Model"];
const TOOL_PROVIDER_METHODS: [&str; 5] = ["as_tool", "build_tool", "to_toolkit", "get_tool", "_get_tools"];
const TOOL_FIELD_TYPES: [&str; 4] = ["Tool", "BaseTool", "List[Tool]", "List[BaseTool]"];
const CLASS_VARIABLE_PREVIEW: usize = 100;

/// Ancestor-name keywords, first match wins per ancestor.
const ANCESTOR_CATEGORIES: [(&[&str], ComponentCategory); 9] = [
    (&["Agent"], ComponentCategory::Agent),
    (&["Model", "LLM"], ComponentCategory::Llm),
    (&["Tool"], ComponentCategory::Tool),
    (&["Memory"], ComponentCategory::Memory),
    (&["Prompt"], ComponentCategory::Prompt),
    (&["Embedding"], ComponentCategory::Embedding),
    (&["VectorStore"], ComponentCategory::VectorStore),
    (&["Input", "Output"], ComponentCategory::Io),
    (&["Data"], ComponentCategory::Data),
];

/// Outcome of introspecting one class.
#[derive(Debug, Clone)]
pub enum Introspection {
    Component(Box<DiscoveredComponent>),
    /// Abstract classes are not catalogued
    Abstract,
}

pub struct Introspector {
    rules: VariantRules,
    variant_attribute: String,
    error_handler: ErrorHandler,
}

impl Introspector {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            rules: VariantRules::from_config(config),
            variant_attribute: config.variant_attribute.clone(),
            error_handler: ErrorHandler::new("Introspector"),
        }
    }

    pub fn rules(&self) -> &VariantRules {
        &self.rules
    }

    pub fn introspect(&self, class: &LoadedClass) -> Result<Introspection, FrameworkError> {
        if class.is_abstract() {
            tracing::debug!(class = %class.qualname(), "skipping abstract class");
            return Ok(Introspection::Abstract);
        }

        let component_name = match class.attribute("name") {
            None | Some(PyExpr::None) => class.class_name.clone(),
            Some(PyExpr::Str(s)) if s.is_empty() => class.class_name.clone(),
            Some(PyExpr::Str(s)) => s.clone(),
            Some(other) => {
                return Err(self
                    .error_handler
                    .create(
                        "introspect",
                        error_ids::COMPONENT_INTROSPECTION_FAILED,
                        ErrorCategory::Validation,
                        format!(
                            "{}: declared name must be a string, found `{}`",
                            class.qualname(),
                            other.render()
                        ),
                    )
                    .with_component(class.class_name.clone())
                    .with_field("name"));
            }
        };

        let inputs = extract_inputs(class);
        let outputs = extract_outputs(class);
        let capabilities = self.capabilities(class, &inputs);
        let category = infer_category(class);
        let variants = self.variants(class);

        let display_name = class
            .attribute("display_name")
            .and_then(PyExpr::as_str)
            .unwrap_or(&class.class_name)
            .to_string();
        let description = class
            .attribute("description")
            .and_then(PyExpr::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| class.docstring.clone())
            .unwrap_or_default();
        let icon = class.attribute("icon").and_then(PyExpr::as_str).map(str::to_string);

        let component = DiscoveredComponent {
            genesis_type: format!("genesis:{}", genesis_name(&component_name)),
            component_name,
            display_name,
            description,
            icon,
            module_path: class.module_path.clone(),
            class_name: class.class_name.clone(),
            category,
            capabilities,
            inputs,
            outputs,
            variants,
            base_component: None,
            introspection: introspection_data(class),
            introspected_at: Utc::now(),
        };
        tracing::debug!(
            genesis_type = %component.genesis_type,
            category = %component.category,
            "introspected component"
        );
        Ok(Introspection::Component(Box::new(component)))
    }

    fn capabilities(&self, class: &LoadedClass, inputs: &[InputDescriptor]) -> ComponentCapabilities {
        let mut caps = ComponentCapabilities::default();

        for method in TOOL_PROVIDER_METHODS {
            if class.methods.contains_key(method) {
                caps.provides_tools = true;
                caps.tool_methods.push(method.to_string());
            }
        }
        caps.has_as_tool_method = class.methods.contains_key("as_tool");
        caps.has_build_method = class.methods.contains_key("build");

        for ancestor in &class.ancestors {
            let name = ancestor.name.as_str();
            if name.contains("Tool") && name != "Tool" {
                caps.provides_tools = true;
            }
            if name.contains("Agent") {
                caps.accepts_tools = true;
                caps.provides_tools = true;
            }
        }

        for input in inputs {
            let named_tool = input.name == "tools" || input.name.to_lowercase().contains("tool");
            let typed_tool = TOOL_FIELD_TYPES.contains(&input.field_type.as_str())
                || input.input_types.iter().any(|t| TOOL_FIELD_TYPES.contains(&t.as_str()));
            if (named_tool || typed_tool) && !caps.tool_input_fields.contains(&input.name) {
                caps.accepts_tools = true;
                caps.tool_input_fields.push(input.name.clone());
            }
        }

        if let Some(mode) = class.attributes.get("tool_mode") {
            if mode.value.as_ref().map_or(true, PyExpr::is_truthy) {
                caps.has_tool_mode = true;
                caps.provides_tools = true;
            }
        }

        if let Some(interfaces) = class.attribute("__implements__") {
            let names: Vec<String> = interfaces
                .as_sequence()
                .map(|items| items.iter().map(interface_name).collect())
                .unwrap_or_else(|| vec![interface_name(interfaces)]);
            if names.iter().any(|n| n.contains("Tool")) {
                caps.provides_tools = true;
            }
            caps.implements_interfaces = names;
        }

        caps
    }

    fn variants(&self, class: &LoadedClass) -> Vec<ComponentVariant> {
        let mut variants = Vec::new();
        if let Some(options) = class
            .attribute(&self.variant_attribute)
            .and_then(PyExpr::as_sequence)
        {
            for option in options {
                if let Some(variant) = declared_variant(option) {
                    variants.push(variant);
                }
            }
        }
        if let Some(variant) = self.rules.heuristic_variant(&class.class_name) {
            if !variants.iter().any(|v| v.key == variant.key) {
                variants.push(variant);
            }
        }
        variants
    }
}

/// `OpenAIModelComponent` -> `open_ai`, `weather lookup` -> `weather_lookup`
pub fn genesis_name(name: &str) -> String {
    if name.is_empty() {
        return "unknown_component".to_string();
    }
    let mut stripped = name;
    for suffix in TYPE_SUFFIXES {
        if let Some(rest) = stripped.strip_suffix(suffix) {
            stripped = rest;
        }
    }
    if stripped.trim().is_empty() {
        stripped = name;
    }
    let snake = stripped
        .split([' ', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let word = CAMEL_WORD.replace_all(word, "${1}_${2}");
            CAMEL_BOUNDARY.replace_all(&word, "${1}_${2}").to_lowercase()
        })
        .collect::<Vec<_>>()
        .join("_");
    if snake.is_empty() {
        name.to_lowercase()
    } else {
        snake
    }
}

/// Explicit attribute, then ancestor keywords, then module path, else tool.
pub fn infer_category(class: &LoadedClass) -> ComponentCategory {
    if let Some(PyExpr::Str(category)) = class.attribute("category") {
        if !category.trim().is_empty() {
            return ComponentCategory::from(category.as_str());
        }
    }

    for ancestor in &class.ancestors {
        for (keywords, category) in ANCESTOR_CATEGORIES.iter() {
            if keywords.iter().any(|k| ancestor.name.contains(k)) {
                return category.clone();
            }
        }
    }

    for part in class.module_path.split('.') {
        let category = match part {
            "agents" => ComponentCategory::Agent,
            "models" => ComponentCategory::Llm,
            "tools" => ComponentCategory::Tool,
            "memories" => ComponentCategory::Memory,
            "prompts" => ComponentCategory::Prompt,
            "embeddings" => ComponentCategory::Embedding,
            "vectorstores" => ComponentCategory::VectorStore,
            "inputs" | "outputs" => ComponentCategory::Io,
            "data" => ComponentCategory::Data,
            "healthcare" => ComponentCategory::Healthcare,
            _ => continue,
        };
        return category;
    }

    ComponentCategory::Tool
}

fn declared_variant(option: &PyExpr) -> Option<ComponentVariant> {
    match option {
        PyExpr::Str(model) => Some(ComponentVariant {
            key: model.clone(),
            label: model.clone(),
            origin: VariantOrigin::Declared,
            config: Map::new(),
            metadata: Map::new(),
        }),
        PyExpr::Dict(_) => {
            let Value::Object(map) = option.to_json() else {
                return None;
            };
            let key = ["name", "model", "value"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            if key.is_empty() {
                return None;
            }
            let label = map
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or(&key)
                .to_string();
            let object = |k: &str| match map.get(k) {
                Some(Value::Object(o)) => o.clone(),
                _ => Map::new(),
            };
            Some(ComponentVariant {
                config: object("config"),
                metadata: object("metadata"),
                key,
                label,
                origin: VariantOrigin::Declared,
            })
        }
        _ => None,
    }
}

fn interface_name(expr: &PyExpr) -> String {
    match expr {
        PyExpr::Str(s) => s.clone(),
        other => other.dotted_name().unwrap_or_else(|| other.render()),
    }
}

fn string_list(expr: Option<&PyExpr>) -> Vec<String> {
    match expr {
        Some(PyExpr::Str(s)) => vec![s.clone()],
        Some(other) => other
            .as_sequence()
            .map(|items| {
                items
                    .iter()
                    .filter_map(PyExpr::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

fn flag(call: &PyExpr, name: &str) -> bool {
    call.keyword(name).and_then(PyExpr::as_bool).unwrap_or(false)
}

fn text(call: &PyExpr, name: &str) -> Option<String> {
    call.keyword(name).and_then(PyExpr::as_str).map(str::to_string)
}

/// Declared field name: `name=` keyword, else first positional string.
fn field_name(call: &PyExpr) -> Option<String> {
    text(call, "name").or_else(|| call.positional(0).and_then(PyExpr::as_str).map(str::to_string))
}

fn extract_inputs(class: &LoadedClass) -> Vec<InputDescriptor> {
    let Some(items) = class.attribute("inputs").and_then(PyExpr::as_sequence) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let field_type = item.call_name()?;
            let name = field_name(item)?;
            Some(InputDescriptor {
                name,
                field_type,
                display_name: text(item, "display_name"),
                required: flag(item, "required"),
                info: text(item, "info"),
                input_types: string_list(item.keyword("input_types")),
                is_list: flag(item, "is_list"),
                multiline: flag(item, "multiline"),
                tool_mode: flag(item, "tool_mode"),
            })
        })
        .collect()
}

fn extract_outputs(class: &LoadedClass) -> Vec<OutputDescriptor> {
    let Some(items) = class.attribute("outputs").and_then(PyExpr::as_sequence) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            item.call_name()?;
            Some(OutputDescriptor {
                name: field_name(item)?,
                display_name: text(item, "display_name"),
                method: text(item, "method"),
                types: string_list(item.keyword("types")),
            })
        })
        .collect()
}

fn python_type_name(expr: &PyExpr) -> String {
    match expr {
        PyExpr::Str(_) => "str".into(),
        PyExpr::Int(_) => "int".into(),
        PyExpr::Float(_) => "float".into(),
        PyExpr::Bool(_) => "bool".into(),
        PyExpr::None => "NoneType".into(),
        PyExpr::List(_) => "list".into(),
        PyExpr::Tuple(_) => "tuple".into(),
        PyExpr::Set(_) => "set".into(),
        PyExpr::Dict(_) => "dict".into(),
        PyExpr::Call { .. } => expr.call_name().unwrap_or_else(|| "object".into()),
        _ => "object".into(),
    }
}

fn introspection_data(class: &LoadedClass) -> IntrospectionData {
    let class_variables = class
        .attributes
        .iter()
        .filter(|(name, _)| !name.starts_with('_'))
        .filter_map(|(name, attr)| {
            let value = attr.value.as_ref()?;
            let rendered = match value {
                PyExpr::Str(s) => s.clone(),
                other => other.render(),
            };
            Some(ClassVariable {
                name: name.clone(),
                type_name: python_type_name(value),
                value: rendered.chars().take(CLASS_VARIABLE_PREVIEW).collect(),
            })
        })
        .collect();

    IntrospectionData {
        module: class.module_path.clone(),
        qualname: class.class_name.clone(),
        file: class.file.clone(),
        line: class.line,
        is_abstract: class.is_abstract(),
        base_classes: class.ancestor_names(),
        class_variables,
        methods: class
            .methods
            .keys()
            .filter(|m| !m.starts_with('_'))
            .cloned()
            .collect(),
        docstring: class.docstring.clone(),
    }
}
