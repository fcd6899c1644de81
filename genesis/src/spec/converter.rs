//! Specification <-> flow graph conversion.
//!
//! `spec_to_flow` runs the whole pipeline: validation, variable resolution,
//! cached type lookup, edge construction and cost estimation. Per-component
//! failures are collected and returned together; only a document that cannot
//! be read as a specification at all stops the pipeline early.

use super::connections::{ConnectionBuilder, Connections};
use super::context::ProcessingContext;
use super::estimator::{MemoryBreakdown, MemoryEstimator};
use super::model::{ComponentSpec, FlowGraph, FlowNode, Link, Specification};
use super::resolver::{builtin_variables, extract_variable_references, VariableResolver};
use super::validator::SpecificationValidator;
use crate::cache::{CacheStats, ComponentMappingCache};
use crate::catalog::{ComponentMapping, MappingSource};
use crate::config::{ConverterConfig, GenesisConfig};
use crate::error::{error_ids, ErrorCategory, ErrorHandler, Failure, FrameworkError, Outcome};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionMetrics {
    pub conversion_time_ms: f64,
    pub components_processed: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub explicit_connections: usize,
    pub implicit_connections: usize,
    /// Share of edges that were inferred rather than declared
    pub automation_percentage: f64,
    pub complexity_score: f64,
    pub variables_resolved: usize,
    pub compliance_enabled: bool,
    pub estimated_memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub flow: FlowGraph,
    /// Non-blocking validation and compliance findings
    pub warnings: Vec<FrameworkError>,
    pub memory: MemoryBreakdown,
    pub metrics: ConversionMetrics,
    pub request_id: String,
}

pub struct Converter {
    mappings: Arc<dyn MappingSource>,
    cache: ComponentMappingCache<ComponentMapping>,
    resolver: VariableResolver,
    connections: ConnectionBuilder,
    estimator: MemoryEstimator,
    validator: SpecificationValidator,
    config: ConverterConfig,
    error_handler: ErrorHandler,
}

impl Converter {
    pub fn new(mappings: Arc<dyn MappingSource>, config: &GenesisConfig) -> Self {
        Self {
            mappings,
            cache: ComponentMappingCache::from_config(&config.cache),
            resolver: VariableResolver::new(config.resolver.clone()),
            connections: ConnectionBuilder::from_config(&config.converter),
            estimator: MemoryEstimator::new(),
            validator: SpecificationValidator::new(),
            config: config.converter.clone(),
            error_handler: ErrorHandler::new("converter"),
        }
    }

    pub fn with_validator(mut self, validator: SpecificationValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Fresh context carrying the configured compliance flag and deadline.
    pub fn context(&self) -> ProcessingContext {
        let context = ProcessingContext::new().with_compliance(self.config.compliance);
        match self.config.deadline() {
            Some(budget) => context.with_deadline(budget),
            None => context,
        }
    }

    pub async fn spec_to_flow(&self, spec: &Value) -> Outcome<ConversionResult> {
        let context = self.context();
        self.spec_to_flow_with(spec, &context).await
    }

    pub async fn spec_to_flow_with(&self, document: &Value, context: &ProcessingContext) -> Outcome<ConversionResult> {
        tracing::info!(request_id = context.request_id(), "converting specification to flow");

        let mut warnings = Vec::new();
        if self.config.validate {
            let validation = self.validator.validate(document, context.compliance());
            warnings = validation.into_outcome()?;
        }
        let spec = Specification::from_value(document)?;

        let mut variables = builtin_variables(document);
        variables.extend(spec.variable_table());
        variables.extend(context.variables().iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut errors = Vec::new();
        let mut resolved_configs = HashMap::with_capacity(spec.components.len());
        let mut variables_resolved = 0;
        for (id, component) in &spec.components {
            variables_resolved += count_known_references(&component.config, &variables);
            match self.resolver.resolve_until(&component.config, &variables, context.deadline()) {
                Ok(config) => {
                    resolved_configs.insert(id.clone(), config);
                }
                Err(failure) => errors.extend(
                    failure
                        .into_errors()
                        .into_iter()
                        .map(|e| e.with_component(id.clone())),
                ),
            }
        }

        let found = self.lookup_all(&spec).await;
        let mut mappings = HashMap::with_capacity(spec.components.len());
        let mut nodes = Vec::with_capacity(spec.components.len());
        for (id, component) in &spec.components {
            let Some(mapping) = found.get(&component.component_type).cloned().flatten() else {
                errors.push(
                    self.error_handler
                        .create(
                            "spec_to_flow",
                            error_ids::UNKNOWN_COMPONENT_TYPE,
                            ErrorCategory::Validation,
                            format!("Component '{}' has unknown type '{}'", id, component.component_type),
                        )
                        .with_component(id.clone())
                        .with_field(format!("components.{}.type", id))
                        .with_fix("Run discovery over the tree that defines this component"),
                );
                continue;
            };
            if let Some(config) = resolved_configs.remove(id) {
                nodes.push(node_for(id, component, &mapping, config));
            }
            mappings.insert(id.clone(), mapping);
        }

        // Links touching an unmapped component fail with the type error
        // already reported above, so only the other link failures are added.
        let built = self.connections.build(&spec.components, &mappings, context);
        if let Err(failure) = &built {
            errors.extend(
                failure
                    .errors()
                    .iter()
                    .filter(|e| e.error_id != error_ids::UNKNOWN_COMPONENT_TYPE)
                    .cloned(),
            );
        }

        if let Some(failure) = Failure::from_errors(errors) {
            tracing::warn!(
                request_id = context.request_id(),
                errors = failure.len(),
                "conversion failed"
            );
            return Err(failure);
        }
        let connections = built?;
        context.check_deadline("spec_to_flow")?;

        let flow = FlowGraph {
            name: spec.name.clone(),
            description: spec.description.clone(),
            nodes,
            edges: connections.edges.clone(),
            metadata: self.flow_metadata(&spec, context),
        };
        let memory = self.estimator.estimate_workflow(&flow, context);
        let metrics = metrics(&spec, &flow, &connections, &memory, variables_resolved, context);

        tracing::info!(
            request_id = context.request_id(),
            nodes = metrics.nodes_created,
            edges = metrics.edges_created,
            elapsed_ms = metrics.conversion_time_ms,
            "converted specification"
        );
        Ok(ConversionResult {
            flow,
            warnings,
            memory,
            metrics,
            request_id: context.request_id().to_string(),
        })
    }

    /// One node per component; each edge becomes a `provides` entry on its
    /// source component.
    pub fn flow_to_spec(&self, flow: &FlowGraph) -> Outcome<Specification> {
        let mut components: IndexMap<String, ComponentSpec> = IndexMap::with_capacity(flow.nodes.len());
        for node in &flow.nodes {
            let mut component = ComponentSpec::new(node.node_type.clone()).with_config(node.config.clone());
            component.name = Some(node.display_name.clone());
            components.insert(node.id.clone(), component);
        }

        let mut errors = Vec::new();
        for edge in &flow.edges {
            if !components.contains_key(&edge.to) {
                errors.push(invalid_edge(&edge.id, &edge.to));
                continue;
            }
            match components.get_mut(&edge.from) {
                Some(source) => source.provides.push(Link::new(edge.to.clone(), edge.use_as.clone())),
                None => errors.push(invalid_edge(&edge.id, &edge.from)),
            }
        }
        if let Some(failure) = Failure::from_errors(errors) {
            return Err(failure);
        }

        let mut spec = Specification::new(flow.name.clone(), flow.description.clone());
        spec.components = components;
        let text = |key: &str| flow.metadata.get(key).and_then(Value::as_str).map(str::to_string);
        spec.id = text("spec_id");
        spec.version = text("version");
        spec.domain = text("domain");
        spec.kind = text("kind");
        spec.agent_goal = text("agentGoal");
        tracing::debug!(components = spec.components.len(), links = spec.link_count(), "converted flow to specification");
        Ok(spec)
    }

    async fn lookup(&self, genesis_type: &str) -> Option<ComponentMapping> {
        if let Some(hit) = self.cache.get(genesis_type) {
            return Some(hit);
        }
        let found = self.mappings.lookup(genesis_type).await?;
        self.cache.set(genesis_type, found.clone());
        Some(found)
    }

    /// Distinct types looked up with bounded concurrency.
    async fn lookup_all(&self, spec: &Specification) -> HashMap<String, Option<ComponentMapping>> {
        let mut types: Vec<String> = spec.components.values().map(|c| c.component_type.clone()).collect();
        types.sort();
        types.dedup();
        let workers = if self.config.parallel_lookup {
            self.config.max_workers.max(1)
        } else {
            1
        };
        stream::iter(types)
            .map(|genesis_type| async move {
                let mapping = self.lookup(&genesis_type).await;
                (genesis_type, mapping)
            })
            .buffered(workers)
            .collect()
            .await
    }

    fn flow_metadata(&self, spec: &Specification, context: &ProcessingContext) -> Map<String, Value> {
        let mut metadata = Map::new();
        let optional = [
            ("spec_id", &spec.id),
            ("version", &spec.version),
            ("domain", &spec.domain),
            ("kind", &spec.kind),
            ("agentGoal", &spec.agent_goal),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                metadata.insert(key.to_string(), json!(value));
            }
        }
        metadata.insert("request_id".to_string(), json!(context.request_id()));
        metadata.insert("runtime_type".to_string(), json!(self.config.runtime_type));
        metadata
    }
}

fn node_for(id: &str, component: &ComponentSpec, mapping: &ComponentMapping, config: Map<String, Value>) -> FlowNode {
    FlowNode {
        id: id.to_string(),
        node_type: mapping.genesis_type.clone(),
        component: mapping.component.clone(),
        display_name: component.name.clone().unwrap_or_else(|| mapping.display_name.clone()),
        category: mapping.category.clone(),
        config,
        variant: mapping.variant.clone(),
        template: mapping.inputs.clone(),
    }
}

fn invalid_edge(edge_id: &str, endpoint: &str) -> FrameworkError {
    FrameworkError::validation(
        "flow_to_spec",
        error_ids::FLOW_INVALID_EDGE,
        format!("Edge '{}' references unknown node '{}'", edge_id, endpoint),
    )
}

fn count_known_references(config: &Map<String, Value>, variables: &Map<String, Value>) -> usize {
    extract_variable_references(&Value::Object(config.clone()))
        .iter()
        .filter(|name| {
            let root = name.split('.').next().unwrap_or(name.as_str());
            variables.contains_key(name.as_str()) || variables.contains_key(root)
        })
        .count()
}

fn metrics(
    spec: &Specification,
    flow: &FlowGraph,
    connections: &Connections,
    memory: &MemoryBreakdown,
    variables_resolved: usize,
    context: &ProcessingContext,
) -> ConversionMetrics {
    let edges = flow.edges.len();
    ConversionMetrics {
        conversion_time_ms: context.elapsed().as_secs_f64() * 1000.0,
        components_processed: spec.components.len(),
        nodes_created: flow.nodes.len(),
        edges_created: edges,
        explicit_connections: connections.explicit,
        implicit_connections: connections.implicit,
        automation_percentage: if edges > 0 {
            connections.implicit as f64 / edges as f64 * 100.0
        } else {
            0.0
        },
        complexity_score: flow.nodes.len() as f64 + edges as f64 * 0.5,
        variables_resolved,
        compliance_enabled: context.compliance(),
        estimated_memory_mb: memory.total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ComponentCategory, DiscoveredComponent};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::from_components(vec![
            DiscoveredComponent::new("genesis:chat_input", "ChatInput", "pkg.io", ComponentCategory::Io),
            DiscoveredComponent::new("genesis:agent", "Agent", "pkg.agents", ComponentCategory::Agent),
            DiscoveredComponent::new("genesis:chat_output", "ChatOutput", "pkg.io", ComponentCategory::Io),
            DiscoveredComponent::new("genesis:web_search", "WebSearch", "pkg.tools", ComponentCategory::Tool),
        ]))
    }

    fn spec() -> Value {
        json!({
            "name": "Research Assistant",
            "description": "Answers questions with web search",
            "agentGoal": "Answer research questions with cited sources",
            "version": "1.0.0",
            "variables": [{"name": "model", "type": "string", "default": "gpt-4o"}],
            "components": {
                "input": {"type": "genesis:chat_input", "provides": [{"in": "agent", "useAs": "input"}]},
                "agent": {
                    "type": "genesis:agent",
                    "config": {"model_name": "${model}", "system_message": "You help ${spec_name} users"},
                    "provides": [{"in": "output", "useAs": "input"}]
                },
                "search": {"type": "genesis:web_search", "provides": [{"in": "agent", "useAs": "tools"}]},
                "output": {"type": "genesis:chat_output"}
            }
        })
    }

    #[tokio::test]
    async fn converts_a_specification() {
        let converter = Converter::new(catalog(), &GenesisConfig::default());
        let result = converter.spec_to_flow(&spec()).await.unwrap();

        assert_eq!(result.flow.nodes.len(), 4);
        assert_eq!(result.flow.edges.len(), 3);
        let agent = result.flow.node("agent").unwrap();
        assert_eq!(agent.config["model_name"], json!("gpt-4o"));
        assert_eq!(agent.config["system_message"], json!("You help Research Assistant users"));
        assert_eq!(agent.component, "Agent");
        assert_eq!(result.metrics.explicit_connections, 3);
        assert_eq!(result.metrics.implicit_connections, 0);
        assert_eq!(result.metrics.variables_resolved, 2);
        assert_eq!(result.metrics.complexity_score, 5.5);
        assert!(result.memory.total >= result.memory.base_overhead);
        assert_eq!(result.flow.metadata["version"], json!("1.0.0"));
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[tokio::test]
    async fn every_unknown_type_is_reported() {
        let mut doc = spec();
        doc["components"]["input"]["type"] = json!("genesis:voice_input");
        doc["components"]["output"]["type"] = json!("genesis:voice_output");
        let converter = Converter::new(catalog(), &GenesisConfig::default());
        let err = converter.spec_to_flow(&doc).await.unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.errors().iter().all(|e| e.error_id == error_ids::UNKNOWN_COMPONENT_TYPE));
        let ids: Vec<_> = err.errors().iter().filter_map(|e| e.component_id.as_deref()).collect();
        assert_eq!(ids, vec!["input", "output"]);
    }

    #[tokio::test]
    async fn type_and_link_errors_are_reported_together() {
        let mut doc = spec();
        doc["components"]["input"]["type"] = json!("genesis:voice_input");
        doc["components"]["search"]["provides"] = json!([{"in": "planner", "useAs": "tools"}]);
        let mut config = GenesisConfig::default();
        config.converter.validate = false;
        let converter = Converter::new(catalog(), &config);

        let err = converter.spec_to_flow(&doc).await.unwrap_err();
        let found: Vec<_> = err
            .errors()
            .iter()
            .map(|e| (e.error_id.as_str(), e.component_id.as_deref()))
            .collect();
        assert_eq!(
            found,
            vec![
                (error_ids::UNKNOWN_COMPONENT_TYPE, Some("input")),
                (error_ids::CONNECTION_UNKNOWN_TARGET, Some("search")),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_documents_stop_before_lookup() {
        let converter = Converter::new(catalog(), &GenesisConfig::default());
        let err = converter.spec_to_flow(&json!({"name": "x"})).await.unwrap_err();
        assert!(err.has_error_id(error_ids::MISSING_REQUIRED_FIELD));
        assert_eq!(converter.cache_stats().misses, 0);
    }

    #[tokio::test]
    async fn lookups_are_cached_across_conversions() {
        let converter = Converter::new(catalog(), &GenesisConfig::default());
        converter.spec_to_flow(&spec()).await.unwrap();
        converter.spec_to_flow(&spec()).await.unwrap();
        let stats = converter.cache_stats();
        assert_eq!(stats.misses, 4);
        assert_eq!(stats.hits, 4);
    }

    #[tokio::test]
    async fn expired_deadline_is_a_timeout() {
        let converter = Converter::new(catalog(), &GenesisConfig::default());
        let context = ProcessingContext::new().with_deadline(Duration::ZERO);
        let err = converter.spec_to_flow_with(&spec(), &context).await.unwrap_err();
        assert!(err.has_category(ErrorCategory::Timeout));
    }

    #[tokio::test]
    async fn flow_round_trips_to_a_specification() {
        let converter = Converter::new(catalog(), &GenesisConfig::default());
        let result = converter.spec_to_flow(&spec()).await.unwrap();
        let back = converter.flow_to_spec(&result.flow).unwrap();

        let ids: Vec<&str> = back.components.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["input", "agent", "search", "output"]);
        assert_eq!(back.components["search"].provides, vec![Link::new("agent", "tools")]);
        assert_eq!(back.link_count(), 3);
        assert_eq!(back.version.as_deref(), Some("1.0.0"));

        let mut broken = result.flow.clone();
        broken.edges[0].to = "missing".to_string();
        let err = converter.flow_to_spec(&broken).unwrap_err();
        assert_eq!(err.first().error_id, error_ids::FLOW_INVALID_EDGE);
    }
}
