use stellwerk::{validate_workflow, Graph, NodeKind, NodeRegistry, NodeType, OutputMode, WaitUnit};

const CUSTOMER_SUPPORT: &str = include_str!("../demos/graphs/customer_support.json");
const WAIT_DEMO: &str = include_str!("../demos/graphs/wait_demo.yaml");

#[test]
fn editor_export_loads_and_ignores_canvas_keys() {
    let graph = Graph::from_json_str(CUSTOMER_SUPPORT).expect("failed to parse customer support graph");

    assert_eq!(graph.nodes.len(), 9);
    assert_eq!(graph.nodes_of_type(NodeType::Agent).count(), 4);

    let classifier = graph
        .node("support-classifier-node")
        .and_then(|node| node.as_agent())
        .expect("classifier is an agent");
    assert!(classifier.exclude_from_conversation);
    assert!(matches!(classifier.source_type, OutputMode::Structured { schema: Some(_) }));

    let else_edge = graph.edge("router-to-else-end").expect("else edge exists");
    assert_eq!(else_edge.source_handle, "output-else");
}

#[test]
fn yaml_defaults_edge_handles() {
    let graph = Graph::from_yaml_str(WAIT_DEMO).expect("failed to parse wait demo");

    let first = graph.edge("e1").unwrap();
    assert_eq!(first.source_handle, "output");
    assert_eq!(first.target_handle, "input");

    match &graph.node("cool-down").unwrap().kind {
        NodeKind::Wait { data } => {
            assert_eq!(data.duration, 2);
            assert_eq!(data.unit, WaitUnit::Seconds);
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn json_and_yaml_round_trip() {
    let graph = Graph::from_json_str(CUSTOMER_SUPPORT).unwrap();

    let yaml = graph.to_yaml_string().expect("failed to serialize graph to yaml");
    assert_eq!(Graph::from_yaml_str(&yaml).unwrap(), graph);

    let json = graph.to_json_string().expect("failed to serialize graph to json");
    assert_eq!(Graph::from_json_str(&json).unwrap(), graph);
}

#[test]
fn from_path_picks_format_by_extension() {
    let root = env!("CARGO_MANIFEST_DIR");
    let yaml = Graph::from_path(format!("{root}/demos/graphs/wait_demo.yaml")).unwrap();
    let json = Graph::from_path(format!("{root}/demos/graphs/customer_support.json")).unwrap();
    assert_eq!(yaml.nodes.len(), 5);
    assert_eq!(json.edges.len(), 9);

    let missing = Graph::from_path(format!("{root}/demos/graphs/missing.json")).unwrap_err();
    assert!(missing.to_string().contains("missing.json"));
}

#[test]
fn unlabelled_branches_load_and_fall_back_to_their_id() {
    let graph = Graph::from_json_str(
        r#"{
            "nodes": [
                { "id": "start", "type": "start", "data": {} },
                { "id": "router", "type": "if-else", "data": { "dynamicSourceHandles": [
                    { "id": "output-a", "label": null, "condition": "true" },
                    { "id": "output-b", "label": null, "condition": "" }
                ] } },
                { "id": "a-end", "type": "end", "data": {} },
                { "id": "b-end", "type": "end", "data": {} }
            ],
            "edges": [
                { "id": "e1", "source": "start", "target": "router" },
                { "id": "e2", "source": "router", "sourceHandle": "output-a", "target": "a-end" },
                { "id": "e3", "source": "router", "sourceHandle": "output-b", "target": "b-end" }
            ]
        }"#,
    )
    .expect("null branch labels are accepted");

    let NodeKind::IfElse { data } = &graph.node("router").unwrap().kind else {
        panic!("router is an if-else node");
    };
    assert_eq!(data.dynamic_source_handles[0].label, None);
    assert_eq!(data.dynamic_source_handles[0].display_label(), "output-a");

    let report = validate_workflow(&graph, &NodeRegistry::builtin());
    let messages: Vec<_> = report.errors.iter().map(|error| error.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["If-else condition \"output-b\" has a connection but no condition expression"]
    );

    let json = graph.to_json_string().unwrap();
    assert!(json.contains(r#""label": null"#));
}
