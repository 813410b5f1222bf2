use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::{
    AgentHandler, EndHandler, IfElseHandler, NodeHandler, NoteHandler, StartHandler, WaitHandler,
};
use crate::condition::ConditionEngine;
use crate::functions::FunctionRegistry;
use crate::graph::NodeType;
use crate::providers::LLMProvider;

/// Handlers keyed by node type. Validation and execution both dispatch through it.
#[derive(Clone)]
pub struct NodeRegistry {
    handlers: BTreeMap<NodeType, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// An empty registry; every node type is unknown until registered.
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// All six built-in kinds. Agent nodes have no provider and fail when run.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(StartHandler));
        registry.register(Arc::new(EndHandler));
        registry.register(Arc::new(AgentHandler::new()));
        registry.register(Arc::new(IfElseHandler::default()));
        registry.register(Arc::new(WaitHandler));
        registry.register(Arc::new(NoteHandler));
        registry
    }

    /// Built-in kinds with agent nodes backed by `provider` and `tools`.
    pub fn with_agent_runtime(provider: Arc<dyn LLMProvider>, tools: FunctionRegistry) -> Self {
        let mut registry = Self::builtin();
        registry.register(Arc::new(
            AgentHandler::new().with_provider(provider).with_tools(tools),
        ));
        registry
    }

    /// Replaces the if-else handler with one using `engine`.
    pub fn with_condition_engine(mut self, engine: Arc<dyn ConditionEngine>) -> Self {
        self.register(Arc::new(IfElseHandler::new(engine)));
        self
    }

    /// Registers `handler` for its node type, returning the handler it replaces.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.insert(handler.node_type(), handler)
    }

    pub fn get(&self, node_type: NodeType) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type)
    }

    pub fn node_types(&self) -> impl Iterator<Item = NodeType> + '_ {
        self.handlers.keys().copied()
    }

    pub fn data_schemas(&self) -> BTreeMap<NodeType, Value> {
        self.handlers
            .iter()
            .map(|(node_type, handler)| (*node_type, handler.data_schema()))
            .collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::EvalexprEngine;

    #[test]
    fn builtin_covers_every_kind() {
        let registry = NodeRegistry::builtin();
        assert_eq!(registry.node_types().collect::<Vec<_>>().len(), NodeType::ALL.len());
        for node_type in NodeType::ALL {
            assert_eq!(registry.get(node_type).unwrap().node_type(), node_type);
        }
    }

    #[test]
    fn data_schemas_describe_fields() {
        let schemas = NodeRegistry::builtin().data_schemas();
        let wait = &schemas[&NodeType::Wait];
        assert!(wait["properties"]["duration"].is_object());
        assert!(schemas[&NodeType::Agent]["properties"]["systemPrompt"].is_object());
    }

    #[test]
    fn register_replaces_existing_handler() {
        let mut registry = NodeRegistry::empty();
        assert!(registry.get(NodeType::IfElse).is_none());
        registry.register(Arc::new(IfElseHandler::default()));
        let previous = registry.register(Arc::new(IfElseHandler::new(Arc::new(EvalexprEngine::new()))));
        assert!(previous.is_some());
    }
}
