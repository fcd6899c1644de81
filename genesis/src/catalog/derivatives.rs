//! Pure projections of catalog entries for persistence and runtime adapters.

use super::{Catalog, DiscoveredComponent, InputDescriptor, OutputDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const RECORD_VERSION: &str = "1.0.0";
pub const ADAPTER_PRIORITY: u32 = 100;
pub const DISCOVERY_METHOD: &str = "introspection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseConfig {
    pub component: String,
    pub module_path: String,
    pub class_name: String,
    pub display_name: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoMapping {
    pub inputs: Vec<InputDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    pub category: String,
    pub subcategory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCapabilities {
    pub accepts_tools: bool,
    pub provides_tools: bool,
    pub tool_methods: Vec<String>,
    pub discovery_method: String,
    pub introspected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub model_name: String,
    pub display_name: String,
    pub config: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_list: Vec<VariantRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionSummary {
    pub methods: Vec<String>,
    pub base_classes: Vec<String>,
    pub implements_interfaces: Vec<String>,
    pub has_build_method: bool,
    pub has_as_tool_method: bool,
    pub introspected_at: DateTime<Utc>,
}

/// Persistence-ready catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub genesis_type: String,
    pub component_category: String,
    pub description: String,
    pub base_config: BaseConfig,
    pub io_mapping: IoMapping,
    pub tool_capabilities: ToolCapabilities,
    pub runtime_introspection: Value,
    pub variants: Option<VariantSummary>,
    pub introspection_data: IntrospectionSummary,
    pub introspected_at: DateTime<Utc>,
    pub version: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub module: String,
    pub class: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRules {
    pub hipaa_required: bool,
    pub audit_logging: bool,
    pub data_encryption: bool,
}

impl ComplianceRules {
    pub fn regulated() -> Self {
        Self {
            hipaa_required: true,
            audit_logging: true,
            data_encryption: true,
        }
    }
}

/// Descriptor the execution engine uses to instantiate a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeAdapter {
    pub genesis_type: String,
    pub runtime_type: String,
    pub target_component: String,
    pub adapter_config: AdapterConfig,
    pub version: String,
    pub description: String,
    pub active: bool,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_rules: Option<ComplianceRules>,
}

pub fn catalog_record(component: &DiscoveredComponent) -> CatalogRecord {
    let caps = &component.capabilities;
    let description = if component.description.is_empty() {
        format!("Component: {}", component.display_name)
    } else {
        component.description.clone()
    };
    let variants = (!component.variants.is_empty()).then(|| VariantSummary {
        variant_list: component
            .variants
            .iter()
            .map(|v| VariantRecord {
                model_name: v.key.clone(),
                display_name: v.label.clone(),
                config: v.config.clone(),
                metadata: v.metadata.clone(),
            })
            .collect(),
        count: component.variants.len(),
    });

    CatalogRecord {
        genesis_type: component.genesis_type.clone(),
        component_category: component.category.to_string(),
        description,
        base_config: BaseConfig {
            component: component.component_name.clone(),
            module_path: component.module_path.clone(),
            class_name: component.class_name.clone(),
            display_name: component.display_name.clone(),
            icon: component.icon.clone(),
        },
        io_mapping: IoMapping {
            inputs: component.inputs.clone(),
            outputs: component.outputs.clone(),
            category: component.category.to_string(),
            subcategory: None,
        },
        tool_capabilities: ToolCapabilities {
            accepts_tools: caps.accepts_tools,
            provides_tools: caps.provides_tools,
            tool_methods: caps.tool_methods.clone(),
            discovery_method: DISCOVERY_METHOD.to_string(),
            introspected_at: component.introspected_at,
        },
        runtime_introspection: serde_json::to_value(&component.introspection)
            .unwrap_or(Value::Null),
        variants,
        introspection_data: IntrospectionSummary {
            methods: component.introspection.methods.clone(),
            base_classes: component.introspection.base_classes.clone(),
            implements_interfaces: caps.implements_interfaces.clone(),
            has_build_method: caps.has_build_method,
            has_as_tool_method: caps.has_as_tool_method,
            introspected_at: component.introspected_at,
        },
        introspected_at: component.introspected_at,
        version: RECORD_VERSION.to_string(),
        active: true,
    }
}

pub fn runtime_adapter(component: &DiscoveredComponent, runtime_type: &str) -> RuntimeAdapter {
    let target_component = [&component.component_name, &component.class_name]
        .into_iter()
        .find(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| "UnknownComponent".to_string());

    RuntimeAdapter {
        genesis_type: component.genesis_type.clone(),
        runtime_type: runtime_type.to_string(),
        target_component,
        adapter_config: AdapterConfig {
            module: component.module_path.clone(),
            class: component.class_name.clone(),
            variants: component.variants.iter().map(|v| v.key.clone()).collect(),
        },
        version: RECORD_VERSION.to_string(),
        description: format!("Runtime adapter for {}", component.display_name),
        active: true,
        priority: ADAPTER_PRIORITY,
        compliance_rules: component
            .category
            .is_regulated()
            .then(ComplianceRules::regulated),
    }
}

pub fn catalog_records(catalog: &Catalog) -> Vec<CatalogRecord> {
    let records: Vec<CatalogRecord> = catalog.iter().map(catalog_record).collect();
    tracing::info!(
        records = records.len(),
        discovered = catalog.stats().total_discovered,
        "generated catalog records"
    );
    records
}

pub fn runtime_adapters(catalog: &Catalog, runtime_type: &str) -> Vec<RuntimeAdapter> {
    let adapters: Vec<RuntimeAdapter> = catalog
        .iter()
        .map(|c| runtime_adapter(c, runtime_type))
        .collect();
    tracing::info!(adapters = adapters.len(), "generated runtime adapters");
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCategory;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_without_variants_has_null_variants() {
        let component = DiscoveredComponent::new(
            "genesis:chat_input",
            "ChatInput",
            "pkg.inputs",
            ComponentCategory::Io,
        );
        let record = catalog_record(&component);
        assert_eq!(record.description, "Component: ChatInput");
        assert_eq!(record.component_category, "io");
        assert!(record.variants.is_none());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["variants"], Value::Null);
        assert_eq!(json["tool_capabilities"]["discovery_method"], "introspection");
    }

    #[test]
    fn healthcare_adapters_carry_compliance_rules() {
        let ehr = DiscoveredComponent::new(
            "genesis:ehr_connector",
            "EHRConnector",
            "pkg.healthcare",
            ComponentCategory::Healthcare,
        );
        let adapter = runtime_adapter(&ehr, "langflow");
        assert_eq!(adapter.priority, 100);
        assert_eq!(adapter.compliance_rules, Some(ComplianceRules::regulated()));

        let tool = DiscoveredComponent::new("genesis:calc", "Calc", "pkg.tools", ComponentCategory::Tool);
        let json = serde_json::to_value(runtime_adapter(&tool, "langflow")).unwrap();
        assert!(json.get("compliance_rules").is_none());
        assert_eq!(json["adapter_config"]["class"], "Calc");
    }
}
