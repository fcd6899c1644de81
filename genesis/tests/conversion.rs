use genesis::catalog::{Catalog, ComponentCategory, DiscoveredComponent};
use genesis::config::GenesisConfig;
use genesis::error::{error_ids, ErrorCategory};
use genesis::{Converter, DiscoveryEngine, ProcessingContext};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn catalog() -> Arc<Catalog> {
    let mut search = DiscoveredComponent::new("genesis:web_search", "WebSearch", "pkg.tools", ComponentCategory::Tool);
    search.capabilities.provides_tools = true;
    Arc::new(Catalog::from_components(vec![
        DiscoveredComponent::new("genesis:chat_input", "ChatInput", "pkg.io", ComponentCategory::Io),
        DiscoveredComponent::new("genesis:agent", "Agent", "pkg.agents", ComponentCategory::Agent),
        DiscoveredComponent::new("genesis:chat_output", "ChatOutput", "pkg.io", ComponentCategory::Io),
        DiscoveredComponent::new("genesis:ehr_connector", "EhrConnector", "pkg.tools", ComponentCategory::Tool),
        search,
    ]))
}

fn triage_spec() -> Value {
    json!({
        "name": "Patient Triage",
        "description": "Routes patient questions",
        "agentGoal": "Route patient questions to the right clinic",
        "version": "2.1.0",
        "domain": "healthcare",
        "variables": [
            {"name": "model", "type": "string", "default": "gpt-4o"},
            {"name": "clinic", "type": "string", "default": "general"}
        ],
        "components": {
            "input": {"type": "genesis:chat_input", "provides": [{"in": "agent", "useAs": "input"}]},
            "agent": {
                "type": "genesis:agent",
                "config": {
                    "model_name": "${model}",
                    "system_message": "You triage patients for the ${clinic} clinic. Ticket ${ticket_id}."
                },
                "provides": [{"in": "output", "useAs": "input"}]
            },
            "records": {"type": "genesis:ehr_connector", "provides": [{"in": "agent", "useAs": "tools"}]},
            "output": {"type": "genesis:chat_output"}
        }
    })
}

fn links(flow: &genesis::FlowGraph) -> Vec<(String, String, String)> {
    let mut links: Vec<_> = flow
        .edges
        .iter()
        .map(|e| (e.from.clone(), e.to.clone(), e.use_as.clone()))
        .collect();
    links.sort();
    links
}

#[tokio::test]
async fn request_variables_override_declared_defaults() {
    let converter = Converter::new(catalog(), &GenesisConfig::default());
    let mut variables = Map::new();
    variables.insert("clinic".to_string(), json!("cardiology"));
    let context = converter.context().with_variables(variables);

    let result = converter.spec_to_flow_with(&triage_spec(), &context).await.unwrap();
    let agent = result.flow.node("agent").unwrap();

    assert_eq!(agent.config["model_name"], json!("gpt-4o"));
    // Unknown placeholders are left for the runtime
    assert_eq!(
        agent.config["system_message"],
        json!("You triage patients for the cardiology clinic. Ticket ${ticket_id}.")
    );
    assert_eq!(result.flow.metadata["domain"], json!("healthcare"));
    assert_eq!(result.request_id, context.request_id());
}

#[tokio::test]
async fn compliance_adds_regulated_overhead() {
    let plain = Converter::new(catalog(), &GenesisConfig::default());
    let plain_result = plain.spec_to_flow(&triage_spec()).await.unwrap();
    assert!(plain_result.memory.healthcare_overhead.is_none());

    let mut config = GenesisConfig::default();
    config.converter.compliance = true;
    let regulated = Converter::new(catalog(), &config);
    let result = regulated.spec_to_flow(&triage_spec()).await.unwrap();

    let overhead = result.memory.healthcare_overhead.unwrap();
    assert!(overhead > 0.0);
    assert!(result.memory.total > plain_result.memory.total);
    assert!(result
        .warnings
        .iter()
        .all(|w| w.category != ErrorCategory::System));
}

#[tokio::test]
async fn implicit_wiring_fills_in_missing_links() {
    let spec = json!({
        "name": "Search Helper",
        "description": "Answers with search",
        "agentGoal": "Answer questions",
        "components": {
            "input": {"type": "genesis:chat_input"},
            "agent": {"type": "genesis:agent"},
            "search": {"type": "genesis:web_search", "asTools": true},
            "output": {"type": "genesis:chat_output"}
        }
    });
    let mut config = GenesisConfig::default();
    config.converter.implicit_connections = true;
    let converter = Converter::new(catalog(), &config);
    let result = converter.spec_to_flow(&spec).await.unwrap();

    assert_eq!(
        links(&result.flow),
        vec![
            ("agent".to_string(), "output".to_string(), "response".to_string()),
            ("input".to_string(), "agent".to_string(), "input".to_string()),
            ("search".to_string(), "agent".to_string(), "tools".to_string()),
        ]
    );
    assert!(result.flow.edges.iter().all(|e| !e.explicit));
    assert_eq!(result.metrics.implicit_connections, 3);
}

#[tokio::test]
async fn flow_converts_back_to_an_equivalent_specification() {
    let converter = Converter::new(catalog(), &GenesisConfig::default());
    let first = converter.spec_to_flow(&triage_spec()).await.unwrap();

    let spec = converter.flow_to_spec(&first.flow).unwrap();
    assert_eq!(spec.agent_goal.as_deref(), Some("Route patient questions to the right clinic"));
    assert_eq!(spec.version.as_deref(), Some("2.1.0"));

    let document = serde_json::to_value(&spec).unwrap();
    let second = converter.spec_to_flow(&document).await.unwrap();
    assert_eq!(links(&first.flow), links(&second.flow));
    let ids = |flow: &genesis::FlowGraph| flow.nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first.flow), ids(&second.flow));
    assert_eq!(
        first.flow.node("agent").unwrap().config,
        second.flow.node("agent").unwrap().config
    );
}

#[tokio::test]
async fn broken_link_names_the_component_and_field() {
    let mut spec = triage_spec();
    spec["components"]["records"]["provides"] = json!([{"in": "scheduler", "useAs": "tools"}]);

    let validating = Converter::new(catalog(), &GenesisConfig::default());
    let failure = validating.spec_to_flow(&spec).await.unwrap_err();
    let error = &failure.errors()[0];
    assert_eq!(error.error_id, error_ids::UNKNOWN_COMPONENT_ID);
    assert_eq!(error.component_id.as_deref(), Some("records"));
    assert_eq!(error.field_path.as_deref(), Some("components.records.provides[0]"));

    // Without the validation pass the connection builder reports it
    let mut config = GenesisConfig::default();
    config.converter.validate = false;
    let unchecked = Converter::new(catalog(), &config);
    let failure = unchecked.spec_to_flow(&spec).await.unwrap_err();
    let error = failure
        .errors()
        .iter()
        .find(|e| e.error_id == error_ids::CONNECTION_UNKNOWN_TARGET)
        .unwrap();
    assert_eq!(error.component_id.as_deref(), Some("records"));
    assert_eq!(error.field_path.as_deref(), Some("components.records.provides[0]"));
}

#[tokio::test]
async fn spent_deadline_fails_with_timeout() {
    let converter = Converter::new(catalog(), &GenesisConfig::default());
    let context = ProcessingContext::new().with_deadline(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let failure = converter.spec_to_flow_with(&triage_spec(), &context).await.unwrap_err();
    assert!(failure.errors().iter().any(|e| e.category == ErrorCategory::Timeout));
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn discovered_catalog_drives_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("components");
    write(&root, "__init__.py", "");
    write(&root, "base.py", "class Component:\n    pass\n");
    write(
        &root,
        "inputs/chat.py",
        "from components.base import Component\n\nclass ChatInput(Component):\n    pass\n\nclass ChatOutput(Component):\n    pass\n",
    );
    write(
        &root,
        "agents/agent.py",
        "from components.base import Component\n\nclass AgentComponent(Component):\n    pass\n",
    );

    let catalog = Arc::new(DiscoveryEngine::default().discover(&[root]).await);
    assert!(catalog.errors().is_empty(), "{:?}", catalog.errors());

    let spec = json!({
        "name": "Echo",
        "description": "Echoes input",
        "agentGoal": "Echo the user",
        "components": {
            "input": {"type": "genesis:chat_input", "provides": [{"in": "agent"}]},
            "agent": {"type": "genesis:agent", "provides": [{"in": "output"}]},
            "output": {"type": "genesis:chat_output"}
        }
    });
    let converter = Converter::new(catalog, &GenesisConfig::default());
    let result = converter.spec_to_flow(&spec).await.unwrap();

    assert_eq!(result.flow.nodes.len(), 3);
    assert_eq!(result.flow.node("agent").unwrap().component, "AgentComponent");
    assert_eq!(result.metrics.explicit_connections, 2);
    assert_eq!(converter.cache_stats().entries, 3);
}
