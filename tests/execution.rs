use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stellwerk::{
    AgentData, BranchHandle, CancellationToken, ChannelSink, CollectingSink, Conversation, Edge,
    ExecutionEvent, Executor, ExecutorConfig, FunctionRegistry, Graph, LLMError, MessageRole,
    Node, NodeError, NodeRegistry, NodeStatus, RunError, ScriptedProvider,
};
use tokio::time::Instant;

fn customer_support() -> Graph {
    Graph::from_json_str(include_str!("../demos/graphs/customer_support.json")).unwrap()
}

fn executor_with(provider: Arc<ScriptedProvider>) -> Executor {
    Executor::new(
        NodeRegistry::with_agent_runtime(provider, FunctionRegistry::new()),
        ExecutorConfig::default(),
    )
}

fn classification(category: &str, escalate: bool) -> String {
    json!({
        "category": category,
        "priority": "high",
        "sentiment": "negative",
        "requires_escalation": escalate
    })
    .to_string()
}

fn statuses_for(events: &[ExecutionEvent], node: &str) -> Vec<NodeStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::NodeExecutionStatus { node_id, status, .. } if node_id == node => Some(*status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn billing_inquiry_reaches_billing_specialist() {
    let provider = Arc::new(ScriptedProvider::from_texts([
        classification("billing", false),
        "I have started a refund for the duplicate charge.".to_string(),
    ]));
    let executor = executor_with(provider.clone());
    let sink = CollectingSink::new();
    let mut conversation = Conversation::new();
    conversation.push_user("My billing statement shows incorrect charges");

    let summary = executor
        .run(&customer_support(), &mut conversation, &sink, &CancellationToken::new())
        .await
        .expect("run succeeds");

    assert_eq!(
        summary.path,
        vec![
            "start-node",
            "support-classifier-node",
            "priority-router-node",
            "billing-support-node",
            "end-node"
        ]
    );

    // the classifier is excluded from the transcript
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.messages()[1].role, MessageRole::Assistant);
    assert_eq!(
        conversation.messages()[1].text(),
        Some("I have started a refund for the duplicate charge.")
    );

    // the specialist saw its own system prompt and only the user turn
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 2);
    assert_eq!(requests[1].messages[0].role, MessageRole::System);

    let events = sink.events();
    assert_eq!(events.last(), Some(&ExecutionEvent::NodeExecutionStatus {
        node_id: "end-node".into(),
        node_type: stellwerk::NodeType::End,
        name: "end-node".into(),
        status: NodeStatus::Success,
        error: None,
    }));
    assert_eq!(events.iter().filter(|event| **event == ExecutionEvent::Finish).count(), 1);
    assert_eq!(
        statuses_for(&events, "priority-router-node"),
        vec![NodeStatus::Processing, NodeStatus::Success]
    );
}

#[tokio::test]
async fn escalation_flag_takes_the_first_matching_branch() {
    let provider = Arc::new(ScriptedProvider::from_texts([
        classification("technical", true),
        "Escalated to the on-call engineer.".to_string(),
    ]));
    let summary = executor_with(provider)
        .run(
            &customer_support(),
            &mut Conversation::from_messages(vec![stellwerk::ChatMessage::user("Production is down!")]),
            &CollectingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.path[3], "urgent-support-node");
}

#[tokio::test]
async fn unmatched_category_routes_through_else() {
    let provider = Arc::new(ScriptedProvider::from_texts([classification("general", false)]));
    let summary = executor_with(provider)
        .run(
            &customer_support(),
            &mut Conversation::new(),
            &CollectingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.path.last().map(String::as_str), Some("else-end-node"));
    assert_eq!(summary.steps, 4);
}

fn urgent_or_billing() -> Graph {
    Graph::new(
        vec![
            Node::start("start"),
            Node::agent(
                "agent",
                AgentData::new("Classifier", "gpt-4o-mini").structured(json!({
                    "type": "object",
                    "properties": {
                        "category": { "type": "string", "enum": ["urgent", "billing"] }
                    },
                    "required": ["category"]
                })),
            ),
            Node::if_else("router", vec![BranchHandle::new("output-urgent", "input.category == 'urgent'")]),
            Node::end("end1"),
            Node::end("end2"),
        ],
        vec![
            Edge::new("e1", "start", "agent"),
            Edge::new("e2", "agent", "router"),
            Edge::new("e3", "router", "end1").from_handle("output-urgent"),
            Edge::new("e4", "router", "end2").from_handle("output-else"),
        ],
    )
}

#[tokio::test]
async fn structured_category_selects_the_terminus() {
    for (category, terminus) in [("urgent", "end1"), ("billing", "end2")] {
        let provider = Arc::new(ScriptedProvider::from_texts([json!({ "category": category }).to_string()]));
        let summary = executor_with(provider)
            .run(
                &urgent_or_billing(),
                &mut Conversation::new(),
                &CollectingSink::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.path.last().map(String::as_str), Some(terminus));
    }
}

#[tokio::test(start_paused = true)]
async fn wait_suspends_then_routes_on_text() {
    let graph = Graph::from_yaml_str(include_str!("../demos/graphs/wait_demo.yaml")).unwrap();
    let mut conversation = Conversation::new();
    conversation.push_user("I would like a refund please");

    let started = Instant::now();
    let summary = Executor::default()
        .run(&graph, &mut conversation, &CollectingSink::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(
        summary.path,
        vec!["start", "cool-down", "refund-check", "refund-end"]
    );
}

#[tokio::test]
async fn endless_loop_hits_the_step_ceiling() {
    let graph = Graph::from_yaml_str(include_str!("../demos/graphs/cyclic.yaml")).unwrap();
    let sink = CollectingSink::new();
    let mut conversation = Conversation::new();
    conversation.push_user("retry");

    let error = Executor::default()
        .run(&graph, &mut conversation, &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, RunError::MaxStepsExceeded(100)));
    let started = sink
        .events()
        .iter()
        .filter(|event| matches!(event, ExecutionEvent::NodeExecutionStatus { status: NodeStatus::Processing, .. }))
        .count();
    assert_eq!(started, 100);
}

#[tokio::test]
async fn strict_config_rejects_cycles_before_running() {
    let graph = Graph::from_yaml_str(include_str!("../demos/graphs/cyclic.yaml")).unwrap();
    let config = ExecutorConfig::from_yaml_str("detect_cycles: true").unwrap();
    let sink = CollectingSink::new();

    let error = Executor::new(NodeRegistry::builtin(), config)
        .run(&graph, &mut Conversation::new(), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(&error, RunError::Invalid(errors) if errors.len() == 1));
    assert!(error.to_string().starts_with("Workflow has errors:\n- Cycle detected"));
    assert!(sink.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_abandons_the_sleeping_node() {
    let graph = Graph::from_yaml_str(include_str!("../demos/graphs/wait_demo.yaml")).unwrap();
    let token = CancellationToken::new();
    let sink = CollectingSink::new();
    let executor = Executor::default();
    let mut conversation = Conversation::new();

    let cancel_later = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(
        executor.run(&graph, &mut conversation, &sink, &token),
        cancel_later
    );

    assert!(matches!(result, Err(RunError::Cancelled)));
    let events = sink.events();
    assert_eq!(statuses_for(&events, "cool-down"), vec![NodeStatus::Processing]);
    assert!(statuses_for(&events, "refund-check").is_empty());
}

#[tokio::test]
async fn provider_failure_is_reported_on_the_node() {
    let provider = Arc::new(ScriptedProvider::new());
    let sink = CollectingSink::new();

    let error = executor_with(provider)
        .run(&urgent_or_billing(), &mut Conversation::new(), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    match error {
        RunError::Node { node_id, source } => {
            assert_eq!(node_id, "agent");
            assert!(matches!(source, NodeError::Provider(LLMError::ScriptExhausted { .. })));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        statuses_for(&sink.events(), "agent"),
        vec![NodeStatus::Processing, NodeStatus::Error]
    );
}

#[tokio::test]
async fn events_stream_through_a_channel() {
    let mut graph = Graph::from_yaml_str(include_str!("../demos/graphs/wait_demo.yaml")).unwrap();
    if let Some(node) = graph.nodes.iter_mut().find(|node| node.id == "cool-down") {
        *node = Node::wait("cool-down", 0, stellwerk::WaitUnit::Seconds);
    }
    let (sink, mut receiver) = ChannelSink::new();

    Executor::default()
        .run(&graph, &mut Conversation::new(), &sink, &CancellationToken::new())
        .await
        .unwrap();
    drop(sink);

    let mut received = Vec::new();
    while let Some(event) = receiver.recv().await {
        received.push(event);
    }
    assert_eq!(received.first().and_then(ExecutionEvent::node_id), Some("start"));
    assert!(received.contains(&ExecutionEvent::Finish));
}
