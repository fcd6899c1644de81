//! The component catalog: one discovery run's published result.

pub mod derivatives;
pub mod types;

pub use derivatives::{
    catalog_record, catalog_records, runtime_adapter, runtime_adapters, CatalogRecord,
    ComplianceRules, RuntimeAdapter,
};
pub use types::*;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

pub const GENESIS_PREFIX: &str = "genesis:";

/// Discovered components keyed by genesis type. Immutable once built; a
/// re-scan produces a new catalog.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    components: BTreeMap<String, DiscoveredComponent>,
    stats: DiscoveryStats,
    errors: Vec<DiscoveryError>,
}

impl Catalog {
    pub(crate) fn new(
        components: BTreeMap<String, DiscoveredComponent>,
        stats: DiscoveryStats,
        errors: Vec<DiscoveryError>,
    ) -> Self {
        Self {
            components,
            stats,
            errors,
        }
    }

    /// Build a catalog from hand-registered records. Later duplicates of a
    /// genesis type are reported as errors, the first one is kept.
    pub fn from_components(components: impl IntoIterator<Item = DiscoveredComponent>) -> Self {
        let mut map = BTreeMap::new();
        let mut errors = Vec::new();
        for component in components {
            if map.contains_key(&component.genesis_type) {
                errors.push(duplicate_type_error(&component));
                continue;
            }
            map.insert(component.genesis_type.clone(), component);
        }
        let stats = DiscoveryStats {
            total_discovered: map.len(),
            total_consolidated: map.len(),
            duplicate_types: errors.len(),
            ..DiscoveryStats::default()
        };
        Self::new(map, stats, errors)
    }

    /// Look up by genesis type; the `genesis:` prefix is optional.
    pub fn get(&self, genesis_type: &str) -> Option<&DiscoveredComponent> {
        self.components.get(genesis_type).or_else(|| {
            if genesis_type.starts_with(GENESIS_PREFIX) {
                None
            } else {
                self.components
                    .get(&format!("{}{}", GENESIS_PREFIX, genesis_type))
            }
        })
    }

    /// Find the entry a consolidated variant was folded into.
    pub fn find_variant(&self, genesis_type: &str) -> Option<(&DiscoveredComponent, &ComponentVariant)> {
        let wanted = normalize_type(genesis_type);
        self.components.values().find_map(|component| {
            component
                .variants
                .iter()
                .filter(|v| v.origin == VariantOrigin::Sibling)
                .find(|v| {
                    v.config
                        .get("genesis_type")
                        .and_then(|t| t.as_str())
                        .map_or(false, |t| t == wanted)
                })
                .map(|v| (component, v))
        })
    }

    pub fn contains(&self, genesis_type: &str) -> bool {
        self.get(genesis_type).is_some()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredComponent> {
        self.components.values()
    }

    pub fn genesis_types(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn stats(&self) -> &DiscoveryStats {
        &self.stats
    }

    pub fn errors(&self) -> &[DiscoveryError] {
        &self.errors
    }

    pub fn by_category(&self, category: &ComponentCategory) -> Vec<&DiscoveredComponent> {
        self.iter().filter(|c| &c.category == category).collect()
    }

    /// Variants that stand for a folded-away component.
    pub fn sibling_variant_count(&self) -> usize {
        self.iter()
            .flat_map(|c| c.variants.iter())
            .filter(|v| v.origin == VariantOrigin::Sibling)
            .count()
    }
}

fn normalize_type(genesis_type: &str) -> String {
    if genesis_type.starts_with(GENESIS_PREFIX) {
        genesis_type.to_string()
    } else {
        format!("{}{}", GENESIS_PREFIX, genesis_type)
    }
}

pub(crate) fn duplicate_type_error(component: &DiscoveredComponent) -> DiscoveryError {
    let error = crate::error::FrameworkError::validation(
        "register",
        crate::error::error_ids::DUPLICATE_COMPONENT_TYPE,
        format!(
            "{} from {}.{} duplicates an existing entry",
            component.genesis_type, component.module_path, component.class_name
        ),
    )
    .with_component(component.genesis_type.clone())
    .with_fix("Give the component a distinct `name` attribute");
    DiscoveryError::new(DiscoveryStage::Register, error)
        .with_module(component.module_path.clone())
        .with_class(component.class_name.clone())
}

/// What the converter needs to know about a component type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentMapping {
    pub genesis_type: String,
    /// Runtime component name
    pub component: String,
    pub display_name: String,
    pub category: ComponentCategory,
    pub capabilities: ComponentCapabilities,
    pub inputs: Vec<InputDescriptor>,
    pub outputs: Vec<OutputDescriptor>,
    /// Set when the type resolved to a consolidated variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl From<&DiscoveredComponent> for ComponentMapping {
    fn from(c: &DiscoveredComponent) -> Self {
        Self {
            genesis_type: c.genesis_type.clone(),
            component: c.component_name.clone(),
            display_name: c.display_name.clone(),
            category: c.category.clone(),
            capabilities: c.capabilities.clone(),
            inputs: c.inputs.clone(),
            outputs: c.outputs.clone(),
            variant: None,
        }
    }
}

/// Source of type mappings for conversion.
#[async_trait]
pub trait MappingSource: Send + Sync {
    async fn lookup(&self, genesis_type: &str) -> Option<ComponentMapping>;
}

#[async_trait]
impl MappingSource for Catalog {
    async fn lookup(&self, genesis_type: &str) -> Option<ComponentMapping> {
        if let Some(component) = self.get(genesis_type) {
            return Some(ComponentMapping::from(component));
        }
        self.find_variant(genesis_type).map(|(base, variant)| {
            let mut mapping = ComponentMapping::from(base);
            mapping.genesis_type = normalize_type(genesis_type);
            mapping.variant = Some(variant.key.clone());
            mapping
        })
    }
}
