//! Sequential run loop over a validated graph.

mod memory;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ExecutorConfig;
use crate::conversation::Conversation;
use crate::events::{EventSink, ExecutionEvent, NodeStatus};
use crate::graph::{Graph, NodeType};
use crate::nodes::{ExecutionContext, NodeError, NodeRegistry};
use crate::validation::{ValidationError, ValidationReport, Validator};

pub use memory::{ExecutionMemory, ExecutionRecord};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Workflow has errors:\n{}", bullet_list(.0))]
    Invalid(Vec<ValidationError>),
    #[error("workflow has no start node")]
    NoStartNode,
    #[error("node {0} not found")]
    NodeNotFound(String),
    #[error("note node {0} cannot be executed")]
    NoteScheduled(String),
    #[error("Unknown node type: {0}")]
    UnknownNodeType(NodeType),
    #[error("maximum steps ({0}) exceeded, the workflow probably contains a cycle")]
    MaxStepsExceeded(usize),
    #[error("run cancelled")]
    Cancelled,
    #[error("node {node_id} failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },
}

fn bullet_list(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|error| format!("- {}", error.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::NotStarted => "not-started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub state: RunState,
    pub steps: usize,
    /// Node ids in execution order, repeats included.
    pub path: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Executor {
    registry: NodeRegistry,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(registry: NodeRegistry, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn validate(&self, graph: &Graph) -> ValidationReport {
        Validator::new(&self.registry)
            .with_options(self.config.validation_options())
            .validate(graph)
    }

    /// Validates `graph`, then walks it from start until a handler returns no successor.
    ///
    /// `conversation` is shared with agent nodes and keeps whatever they append,
    /// also when the run fails.
    #[instrument(skip_all, fields(nodes = graph.nodes.len(), edges = graph.edges.len()))]
    pub async fn run(
        &self,
        graph: &Graph,
        conversation: &mut Conversation,
        events: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let started_at = Utc::now();

        let report = self.validate(graph);
        for warning in &report.warnings {
            warn!(kind = warning.type_name(), message = %warning.message, "validation warning");
        }
        if report.has_errors() {
            return Err(failed(RunError::Invalid(report.errors)));
        }

        let start = graph.start_node().ok_or_else(|| failed(RunError::NoStartNode))?;
        info!(state = %RunState::Running, start = %start.id, "run started");

        let mut memory = ExecutionMemory::new();
        let mut current = Some(start.id.clone());
        let mut previous = start.id.clone();
        let mut steps = 0usize;
        let mut path = Vec::new();

        while let Some(node_id) = current.take() {
            if cancel.is_cancelled() {
                return Err(failed(RunError::Cancelled));
            }

            steps += 1;
            if steps > self.config.max_steps {
                return Err(failed(RunError::MaxStepsExceeded(self.config.max_steps)));
            }

            let node = graph
                .node(&node_id)
                .ok_or_else(|| failed(RunError::NodeNotFound(node_id.clone())))?;
            if node.node_type() == NodeType::Note {
                return Err(failed(RunError::NoteScheduled(node_id)));
            }
            let handler = self
                .registry
                .get(node.node_type())
                .ok_or_else(|| failed(RunError::UnknownNodeType(node.node_type())))?;

            events.emit(ExecutionEvent::status(node, NodeStatus::Processing));
            debug!(step = steps, node_id = %node.id, node_type = %node.node_type(), "executing node");

            let context = ExecutionContext {
                node,
                graph,
                memory: &memory,
                conversation: &mut *conversation,
                previous_node_id: &previous,
                events,
            };
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = handler.execute(context) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                return Err(failed(RunError::Cancelled));
            };

            match outcome {
                Ok(execution) => {
                    memory.record(
                        node.id.clone(),
                        ExecutionRecord {
                            text: execution.result.text,
                            structured: execution.result.structured,
                            node_type: node.node_type(),
                            messages: conversation.snapshot(),
                        },
                    );
                    events.emit(ExecutionEvent::status(node, NodeStatus::Success));
                    path.push(node.id.clone());
                    previous = node_id;
                    current = execution.next_node_id;
                }
                Err(source) => {
                    error!(node_id = %node.id, error = %source, "node failed");
                    events.emit(ExecutionEvent::failed(node, source.to_string()));
                    return Err(failed(RunError::Node {
                        node_id,
                        source,
                    }));
                }
            }
        }

        info!(state = %RunState::Completed, steps, "run finished");
        Ok(RunSummary {
            state: RunState::Completed,
            steps,
            path,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(NodeRegistry::builtin(), ExecutorConfig::default())
    }
}

fn failed(error: RunError) -> RunError {
    info!(state = %RunState::Failed, %error, "run failed");
    error
}
