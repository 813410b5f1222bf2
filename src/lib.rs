//! Workflow graphs of typed steps: validate them, resolve the variables each
//! step can see, and run a conversation turn through them.

pub mod condition;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod executor;
pub mod functions;
pub mod graph;
pub mod nodes;
pub mod providers;
pub mod schema;
pub mod types;
pub mod validation;

pub use error::LLMError;
pub use providers::{LLMProvider, ScriptedProvider};
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, MessageRole, TokenUsage};
pub use functions::{
    DynKernelFunction, FunctionDefinition, FunctionRegistry, KernelFunction, Tool, ToolCall,
    ToolChoice,
};
pub use conversation::Conversation;
pub use graph::{
    AgentData, BranchHandle, Edge, Graph, GraphLoadError, IfElseData, Node, NodeKind, NodeType,
    OutputMode, WaitData, WaitUnit,
};
pub use schema::{
    are_schemas_identical, convert_schema_to_typed_declarations, extract_variables_from_schema,
    get_potential_input_schemas, get_union_of_variables, variable_path_set, InputSource,
    SchemaError, TaggedVariableInfo, TypedDeclarations, VariableInfo, VariableTag,
};
pub use condition::{default_engine, CelEngine, ConditionEngine, ConditionError, EvalexprEngine, TypeEnv};
pub use validation::{
    can_connect_handle, is_valid_connection, validate_workflow, Connection, HandleKind, Severity,
    ValidationError, ValidationErrorKind, ValidationOptions, ValidationReport, Validator,
};
pub use nodes::{
    ExecutionContext, NodeError, NodeExecutionResult, NodeHandler, NodeRegistry, NodeResult,
    ValidationContext,
};
pub use executor::{ExecutionMemory, ExecutionRecord, Executor, RunError, RunState, RunSummary};
pub use events::{ChannelSink, CollectingSink, EventSink, ExecutionEvent, NodeStatus};
pub use config::{ConfigError, ExecutorConfig};
pub use tokio_util::sync::CancellationToken;
