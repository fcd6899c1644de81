//! Records produced by discovery.

use crate::error::FrameworkError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Inferred component category. Unknown explicit categories are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComponentCategory {
    Agent,
    Llm,
    Tool,
    Memory,
    Prompt,
    Embedding,
    VectorStore,
    Io,
    Data,
    Healthcare,
    Other(String),
}

impl ComponentCategory {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentCategory::Agent => "agent",
            ComponentCategory::Llm => "llm",
            ComponentCategory::Tool => "tool",
            ComponentCategory::Memory => "memory",
            ComponentCategory::Prompt => "prompt",
            ComponentCategory::Embedding => "embedding",
            ComponentCategory::VectorStore => "vector_store",
            ComponentCategory::Io => "io",
            ComponentCategory::Data => "data",
            ComponentCategory::Healthcare => "healthcare",
            ComponentCategory::Other(s) => s,
        }
    }

    /// Categories whose components handle regulated data.
    pub fn is_regulated(&self) -> bool {
        matches!(self, ComponentCategory::Healthcare)
    }
}

impl From<String> for ComponentCategory {
    fn from(s: String) -> Self {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "agent" | "agents" => ComponentCategory::Agent,
            "llm" | "model" | "models" | "language_model" => ComponentCategory::Llm,
            "tool" | "tools" => ComponentCategory::Tool,
            "memory" | "memories" => ComponentCategory::Memory,
            "prompt" | "prompts" => ComponentCategory::Prompt,
            "embedding" | "embeddings" => ComponentCategory::Embedding,
            "vector_store" | "vectorstore" | "vectorstores" => ComponentCategory::VectorStore,
            "io" | "input" | "output" | "inputs" | "outputs" => ComponentCategory::Io,
            "data" => ComponentCategory::Data,
            "healthcare" => ComponentCategory::Healthcare,
            _ => ComponentCategory::Other(s),
        }
    }
}

impl From<&str> for ComponentCategory {
    fn from(s: &str) -> Self {
        ComponentCategory::from(s.to_string())
    }
}

impl From<ComponentCategory> for String {
    fn from(c: ComponentCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a component can do with tools. Derived once during introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCapabilities {
    pub accepts_tools: bool,
    pub provides_tools: bool,
    /// Members that expose tool behavior (`as_tool`, `build_tool`, ...)
    pub tool_methods: Vec<String>,
    pub has_build_method: bool,
    pub has_as_tool_method: bool,
    pub has_tool_mode: bool,
    /// Declared inputs that take tools
    pub tool_input_fields: Vec<String>,
    /// Declared `__implements__` entries
    pub implements_interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub name: String,
    /// Declaring input class, e.g. `MessageTextInput`
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_types: Vec<String>,
    pub is_list: bool,
    pub multiline: bool,
    pub tool_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantOrigin {
    /// Listed in the class's variant-options attribute
    Declared,
    /// Parsed from a model-family token in the class name
    Heuristic,
    /// A separate component folded in by consolidation
    Sibling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVariant {
    pub key: String,
    pub label: String,
    pub origin: VariantOrigin,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Rendered value, truncated
    pub value: String,
}

/// Free-form facts recorded at introspection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionData {
    pub module: String,
    pub qualname: String,
    pub file: PathBuf,
    pub line: usize,
    pub is_abstract: bool,
    /// Ancestor chain, nearest first, excluding the class itself
    pub base_classes: Vec<String>,
    pub class_variables: Vec<ClassVariable>,
    pub methods: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredComponent {
    /// Stable id, `genesis:<snake_name>`
    pub genesis_type: String,
    pub component_name: String,
    pub display_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub module_path: String,
    pub class_name: String,
    pub category: ComponentCategory,
    pub capabilities: ComponentCapabilities,
    pub inputs: Vec<InputDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    pub variants: Vec<ComponentVariant>,
    /// Set on a record that was folded into another as a variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_component: Option<String>,
    pub introspection: IntrospectionData,
    pub introspected_at: DateTime<Utc>,
}

impl DiscoveredComponent {
    /// Minimal record, mainly for hosts that register components by hand.
    pub fn new(
        genesis_type: impl Into<String>,
        class_name: impl Into<String>,
        module_path: impl Into<String>,
        category: ComponentCategory,
    ) -> Self {
        let class_name = class_name.into();
        let module_path = module_path.into();
        Self {
            genesis_type: genesis_type.into(),
            component_name: class_name.clone(),
            display_name: class_name.clone(),
            description: String::new(),
            icon: None,
            module_path: module_path.clone(),
            class_name: class_name.clone(),
            category,
            capabilities: ComponentCapabilities::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            variants: Vec::new(),
            base_component: None,
            introspection: IntrospectionData {
                qualname: format!("{}.{}", module_path, class_name),
                module: module_path,
                file: PathBuf::new(),
                line: 0,
                is_abstract: false,
                base_classes: Vec::new(),
                class_variables: Vec::new(),
                methods: Vec::new(),
                docstring: None,
            },
            introspected_at: Utc::now(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ComponentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<InputDescriptor>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_variants(mut self, variants: Vec<ComponentVariant>) -> Self {
        self.variants = variants;
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputDescriptor> {
        self.inputs.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStage {
    Scan,
    Load,
    Introspect,
    Register,
}

/// Recoverable error recorded during discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryError {
    pub stage: DiscoveryStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub error: FrameworkError,
}

impl DiscoveryError {
    pub fn new(stage: DiscoveryStage, error: FrameworkError) -> Self {
        Self {
            stage,
            module_path: None,
            class_name: None,
            file: None,
            error,
        }
    }

    pub fn with_module(mut self, module_path: impl Into<String>) -> Self {
        self.module_path = Some(module_path.into());
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Counters for one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub files_scanned: usize,
    pub candidates: usize,
    pub total_discovered: usize,
    pub total_consolidated: usize,
    pub variants_found: usize,
    pub components_with_variants: usize,
    pub introspection_failures: usize,
    pub scan_failures: usize,
    pub abstract_skipped: usize,
    pub duplicate_types: usize,
    pub timeouts: usize,
    /// Percent of discovered records folded away by consolidation
    pub reduction_ratio: f64,
    pub duration_ms: u64,
}
