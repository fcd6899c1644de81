//! Rough memory cost model, in megabytes.

use super::context::ProcessingContext;
use super::is_regulated_type;
use super::model::{FlowGraph, FlowNode};
use crate::catalog::{ComponentCategory, InputDescriptor};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const BASE_OVERHEAD_MB: f64 = 10.0;
const PER_CONNECTION_MB: f64 = 0.1;
const COMPLIANCE_BASE_MB: f64 = 2.0;
const PER_REGULATED_COMPONENT_MB: f64 = 5.0;

const TOKENS_PER_MB: f64 = 2000.0;
const MAX_CONTEXT_MB: f64 = 200.0;
const MODEL_SELECTION_MB: f64 = 5.0;
const MULTILINE_FIELD_MB: f64 = 2.0;
const FIELD_MB: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryBreakdown {
    pub base_overhead: f64,
    pub components: f64,
    pub connections: f64,
    /// Only present when compliance is on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcare_overhead: Option<f64>,
    pub total: f64,
    pub per_component: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryEstimator;

impl MemoryEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Cost of one component whose category is inferred from its type name.
    pub fn estimate(&self, component_type: &str, fields: &[InputDescriptor], config: &Map<String, Value>) -> f64 {
        cost(&category_hint(component_type), fields, config)
    }

    pub fn estimate_node(&self, node: &FlowNode) -> f64 {
        cost(&node.category, &node.template, &node.config)
    }

    pub fn estimate_workflow(&self, graph: &FlowGraph, context: &ProcessingContext) -> MemoryBreakdown {
        let per_component: BTreeMap<String, f64> = graph
            .nodes
            .iter()
            .map(|node| (node.id.clone(), round2(self.estimate_node(node))))
            .collect();
        let components: f64 = per_component.values().sum();
        let connections = graph.edges.len() as f64 * PER_CONNECTION_MB;

        let healthcare_overhead = context.compliance().then(|| {
            let regulated = graph.nodes.iter().filter(|n| is_regulated_node(n)).count();
            COMPLIANCE_BASE_MB + regulated as f64 * PER_REGULATED_COMPONENT_MB
        });

        let total = BASE_OVERHEAD_MB + components + connections + healthcare_overhead.unwrap_or(0.0);
        tracing::debug!(
            request_id = context.request_id(),
            nodes = graph.nodes.len(),
            total_mb = total,
            "estimated workflow memory"
        );
        MemoryBreakdown {
            base_overhead: BASE_OVERHEAD_MB,
            components: round2(components),
            connections: round2(connections),
            healthcare_overhead: healthcare_overhead.map(round2),
            total: round2(total),
            per_component,
        }
    }
}

fn category_weight(category: &ComponentCategory) -> f64 {
    match category {
        ComponentCategory::Agent => 15.0,
        ComponentCategory::Llm => 20.0,
        ComponentCategory::Embedding => 25.0,
        ComponentCategory::VectorStore => 30.0,
        ComponentCategory::Memory => 8.0,
        ComponentCategory::Tool => 4.0,
        ComponentCategory::Prompt => 2.0,
        ComponentCategory::Io => 1.0,
        ComponentCategory::Data => 3.0,
        ComponentCategory::Healthcare => 6.0,
        ComponentCategory::Other(_) => 4.0,
    }
}

fn cost(category: &ComponentCategory, fields: &[InputDescriptor], config: &Map<String, Value>) -> f64 {
    let mut mb = category_weight(category);

    let context_tokens = ["max_tokens", "context_window"]
        .iter()
        .filter_map(|key| config.get(*key).and_then(Value::as_f64))
        .fold(0.0_f64, f64::max);
    if context_tokens > 0.0 {
        mb += (context_tokens / TOKENS_PER_MB).min(MAX_CONTEXT_MB);
    }
    if config.contains_key("model") || config.contains_key("model_name") {
        mb += MODEL_SELECTION_MB;
    }
    mb += fields.iter().filter(|f| f.multiline).count() as f64 * MULTILINE_FIELD_MB;
    mb += fields.len() as f64 * FIELD_MB;
    mb
}

/// Best-effort category from a type name, for types with no catalog entry.
pub fn category_hint(component_type: &str) -> ComponentCategory {
    let t = component_type.to_lowercase();
    let has = |terms: &[&str]| terms.iter().any(|term| t.contains(term));
    if has(&["agent"]) {
        ComponentCategory::Agent
    } else if has(&["embedding"]) {
        ComponentCategory::Embedding
    } else if has(&["vector", "chroma", "faiss", "pinecone", "qdrant"]) {
        ComponentCategory::VectorStore
    } else if has(&["memory"]) {
        ComponentCategory::Memory
    } else if has(&["prompt"]) {
        ComponentCategory::Prompt
    } else if has(&["input", "output"]) {
        ComponentCategory::Io
    } else if is_regulated_type(&t) {
        ComponentCategory::Healthcare
    } else if has(&["llm", "model", "openai", "anthropic", "ollama"]) {
        ComponentCategory::Llm
    } else if has(&["tool", "search", "api", "calculator"]) {
        ComponentCategory::Tool
    } else if has(&["data", "file", "loader", "csv", "json"]) {
        ComponentCategory::Data
    } else {
        ComponentCategory::Other("unknown".to_string())
    }
}

fn is_regulated_node(node: &FlowNode) -> bool {
    node.category.is_regulated() || is_regulated_type(&node.node_type)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::model::FlowEdge;
    use serde_json::json;

    fn node(id: &str, node_type: &str, category: ComponentCategory, config: Value) -> FlowNode {
        FlowNode {
            id: id.to_string(),
            node_type: node_type.to_string(),
            component: node_type.to_string(),
            display_name: id.to_string(),
            category,
            config: config.as_object().cloned().unwrap_or_default(),
            variant: None,
            template: Vec::new(),
        }
    }

    fn graph() -> FlowGraph {
        FlowGraph {
            name: "claims".to_string(),
            description: String::new(),
            nodes: vec![
                node("in", "genesis:chat_input", ComponentCategory::Io, json!({})),
                node("agent", "genesis:agent", ComponentCategory::Agent, json!({"model": "gpt-4o"})),
                node("ehr", "genesis:ehr_connector", ComponentCategory::Tool, json!({})),
            ],
            edges: vec![FlowEdge {
                id: "edge-1".to_string(),
                from: "in".to_string(),
                to: "agent".to_string(),
                use_as: "input".to_string(),
                source_handle: String::new(),
                target_handle: String::new(),
                explicit: true,
            }],
            metadata: Map::new(),
        }
    }

    #[test]
    fn large_context_models_outweigh_io() {
        let estimator = MemoryEstimator::new();
        let config = json!({"model": "gpt-4", "max_tokens": 100000});
        let llm = estimator.estimate("genesis:openai_model", &[], config.as_object().unwrap());
        let io = estimator.estimate("genesis:chat_input", &[], &Map::new());
        assert!(llm > 50.0, "llm cost {}", llm);
        assert!(io < 10.0, "io cost {}", io);
    }

    #[test]
    fn compliance_adds_overhead_only_when_enabled() {
        let estimator = MemoryEstimator::new();
        let plain = estimator.estimate_workflow(&graph(), &ProcessingContext::new());
        assert_eq!(plain.healthcare_overhead, None);
        assert!(plain.total >= plain.base_overhead);
        let serialized = serde_json::to_value(&plain).unwrap();
        assert!(serialized.get("healthcare_overhead").is_none());

        let regulated = estimator.estimate_workflow(&graph(), &ProcessingContext::new().with_compliance(true));
        assert_eq!(regulated.healthcare_overhead, Some(7.0));
        assert!(regulated.total > plain.total);
        assert_eq!(regulated.per_component.len(), 3);
    }

    #[test]
    fn empty_graph_costs_the_base_overhead() {
        let empty = FlowGraph {
            name: "empty".to_string(),
            description: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            metadata: Map::new(),
        };
        let breakdown = MemoryEstimator::new().estimate_workflow(&empty, &ProcessingContext::new());
        assert_eq!(breakdown.total, breakdown.base_overhead);
    }

    #[test]
    fn category_hints_cover_common_names() {
        assert_eq!(category_hint("genesis:chroma_store"), ComponentCategory::VectorStore);
        assert_eq!(category_hint("genesis:patient_lookup"), ComponentCategory::Healthcare);
        assert_eq!(category_hint("genesis:web_search"), ComponentCategory::Tool);
    }
}
