//! Variant naming rules and catalog consolidation.

use crate::catalog::{ComponentVariant, DiscoveredComponent, VariantOrigin};
use crate::config::DiscoveryConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\d+_\d+").unwrap());

static DEFAULT_RULES: Lazy<VariantRules> =
    Lazy::new(|| VariantRules::new(&DiscoveryConfig::default().model_families));

/// Model-family naming rules shared by the introspector and the consolidator.
#[derive(Debug, Clone)]
pub struct VariantRules {
    families: Vec<String>,
    /// `_<family>_<rest>` per family, then bare `_<major>_<minor>` versions
    suffix_patterns: Vec<Regex>,
}

impl VariantRules {
    pub fn new(families: &[String]) -> Self {
        let families: Vec<String> = families
            .iter()
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        let mut suffix_patterns: Vec<Regex> = families
            .iter()
            .filter_map(|f| Regex::new(&format!(r"(?i)_{}_\w+", regex::escape(f))).ok())
            .collect();
        suffix_patterns.push(VERSION_SUFFIX.clone());
        Self {
            families,
            suffix_patterns,
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(&config.model_families)
    }

    pub fn families(&self) -> &[String] {
        &self.families
    }

    /// Class name with variant suffixes removed; unchanged when nothing matches.
    pub fn canonical_base_name(&self, class_name: &str) -> String {
        let mut base = class_name.to_string();
        for pattern in &self.suffix_patterns {
            base = pattern.replace_all(&base, "").into_owned();
        }
        if base.is_empty() {
            class_name.to_string()
        } else {
            base
        }
    }

    /// Variant implied by a class name such as `ChatModel_gpt_4o`.
    pub fn heuristic_variant(&self, class_name: &str) -> Option<ComponentVariant> {
        let (head, rest) = class_name.split_once('_')?;
        if head.is_empty() || rest.is_empty() {
            return None;
        }
        let lowered = class_name.to_lowercase();
        if !self.families.iter().any(|f| lowered.contains(f.as_str())) {
            return None;
        }
        let model = rest.replace('_', "-");
        Some(ComponentVariant {
            key: model.clone(),
            label: format!("{} - {}", head, model),
            origin: VariantOrigin::Heuristic,
            config: Map::new(),
            metadata: Map::new(),
        })
    }
}

impl Default for VariantRules {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}

/// Canonical base name under the default model families.
pub fn canonical_base_name(class_name: &str) -> String {
    DEFAULT_RULES.canonical_base_name(class_name)
}

/// Fold variant siblings into one entry per group.
///
/// Components are grouped by canonical class name. A group is only merged when
/// at least one member carries a variant suffix, so unrelated classes that
/// merely share a name stay separate. The base is the first member (ordered by
/// class name, then module path) without variants of its own, else the first
/// member. Each other member becomes a `Sibling` variant on the base and its
/// own variants are folded in, de-duplicated by key.
///
/// Re-running on consolidated output changes nothing.
pub fn consolidate(
    components: Vec<DiscoveredComponent>,
    rules: &VariantRules,
) -> Vec<DiscoveredComponent> {
    let mut groups: BTreeMap<String, Vec<DiscoveredComponent>> = BTreeMap::new();
    for component in components {
        groups
            .entry(rules.canonical_base_name(&component.class_name))
            .or_default()
            .push(component);
    }

    let mut result = Vec::new();
    for (canonical, mut members) in groups {
        let has_suffixed = members.iter().any(|m| m.class_name != canonical);
        if members.len() < 2 || !has_suffixed {
            result.extend(members);
            continue;
        }

        members.sort_by(|a, b| {
            (a.class_name.as_str(), a.module_path.as_str())
                .cmp(&(b.class_name.as_str(), b.module_path.as_str()))
        });
        let base_index = members
            .iter()
            .position(|m| m.variants.is_empty())
            .unwrap_or(0);
        let mut base = members.remove(base_index);

        tracing::debug!(
            base = %base.genesis_type,
            merged = members.len(),
            "consolidating variant group"
        );

        let mut seen: HashSet<String> = base
            .variants
            .iter()
            .filter(|v| v.origin != VariantOrigin::Sibling)
            .map(|v| v.key.clone())
            .collect();

        for mut member in members {
            member.base_component = Some(base.genesis_type.clone());
            base.variants.push(sibling_variant(&member));
            for variant in member.variants {
                if variant.origin == VariantOrigin::Sibling || seen.insert(variant.key.clone()) {
                    base.variants.push(variant);
                }
            }
        }
        result.push(base);
    }

    result.sort_by(|a, b| a.genesis_type.cmp(&b.genesis_type));
    result
}

fn sibling_variant(member: &DiscoveredComponent) -> ComponentVariant {
    let mut config = Map::new();
    config.insert(
        "component".to_string(),
        Value::String(member.component_name.clone()),
    );
    config.insert(
        "genesis_type".to_string(),
        Value::String(member.genesis_type.clone()),
    );
    let mut metadata = Map::new();
    metadata.insert("module".to_string(), Value::String(member.module_path.clone()));
    metadata.insert("class".to_string(), Value::String(member.class_name.clone()));
    if let Some(base) = &member.base_component {
        metadata.insert("base_component".to_string(), Value::String(base.clone()));
    }

    let suffix = member
        .class_name
        .split_once('_')
        .map(|(_, rest)| rest.replace('_', "-"))
        .unwrap_or_else(|| member.display_name.clone());

    ComponentVariant {
        key: member.class_name.clone(),
        label: suffix,
        origin: VariantOrigin::Sibling,
        config,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentCategory;
    use pretty_assertions::assert_eq;

    fn component(class_name: &str) -> DiscoveredComponent {
        let rules = VariantRules::default();
        let mut c = DiscoveredComponent::new(
            format!("genesis:{}", class_name.to_lowercase()),
            class_name,
            "pkg.models",
            ComponentCategory::Llm,
        );
        if let Some(v) = rules.heuristic_variant(class_name) {
            c.variants.push(v);
        }
        c
    }

    #[test]
    fn canonical_name_strips_family_and_version_suffixes() {
        assert_eq!(canonical_base_name("ChatModel_gpt_4o_mini"), "ChatModel");
        assert_eq!(canonical_base_name("ChatModel_Claude_3"), "ChatModel");
        assert_eq!(canonical_base_name("Embedder_3_5"), "Embedder");
        assert_eq!(canonical_base_name("PlainComponent"), "PlainComponent");
        assert_eq!(canonical_base_name("_gpt_4"), "_gpt_4");
    }

    #[test]
    fn heuristic_variant_from_class_name() {
        let rules = VariantRules::default();
        let v = rules.heuristic_variant("ChatModel_gpt_4o").unwrap();
        assert_eq!(v.key, "gpt-4o");
        assert_eq!(v.label, "ChatModel - gpt-4o");
        assert_eq!(v.origin, VariantOrigin::Heuristic);
        assert!(rules.heuristic_variant("Chat_Model").is_none());
        assert!(rules.heuristic_variant("GptModel").is_none());
    }

    #[test]
    fn consolidates_siblings_into_base() {
        let input = vec![
            component("ChatModel_gpt_4o"),
            component("ChatModel"),
            component("ChatModel_claude_3"),
            component("OtherComponent"),
        ];
        let before = input.len();
        let out = consolidate(input, &VariantRules::default());

        assert_eq!(out.len(), 2);
        let base = out.iter().find(|c| c.class_name == "ChatModel").unwrap();
        let siblings: Vec<&str> = base
            .variants
            .iter()
            .filter(|v| v.origin == VariantOrigin::Sibling)
            .map(|v| v.key.as_str())
            .collect();
        assert_eq!(siblings, vec!["ChatModel_claude_3", "ChatModel_gpt_4o"]);
        let keys: Vec<&str> = base.variants.iter().map(|v| v.key.as_str()).collect();
        assert!(keys.contains(&"gpt-4o"));
        assert!(keys.contains(&"claude-3"));

        let sibling_total: usize = out
            .iter()
            .map(|c| c.variants.iter().filter(|v| v.origin == VariantOrigin::Sibling).count())
            .sum();
        assert_eq!(out.len() + sibling_total, before);
    }

    #[test]
    fn consolidation_is_idempotent() {
        let input = vec![component("ChatModel_gpt_4o"), component("ChatModel")];
        let once = consolidate(input, &VariantRules::default());
        let twice = consolidate(once.clone(), &VariantRules::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn same_named_classes_without_suffix_stay_separate() {
        let mut a = component("ChatComponent");
        a.genesis_type = "genesis:a".into();
        let mut b = component("ChatComponent");
        b.genesis_type = "genesis:b".into();
        b.module_path = "pkg.other".into();
        let out = consolidate(vec![a, b], &VariantRules::default());
        assert_eq!(out.len(), 2);
    }
}
