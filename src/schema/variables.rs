use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::introspect::{are_schemas_identical, properties_of, SchemaError, MAX_SCHEMA_DEPTH};
use crate::graph::{Graph, NodeKind};

pub const TEXT_INPUT_DESCRIPTION: &str = "Text output from previous node";

/// A variable reachable from a node's input, mirroring the upstream schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub path: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VariableInfo>,
}

impl VariableInfo {
    fn leaf(path: String, type_name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            path,
            type_name: type_name.into(),
            description,
            children: Vec::new(),
        }
    }

    pub fn text_input() -> Self {
        Self::leaf(
            "input".to_string(),
            "string",
            Some(TEXT_INPUT_DESCRIPTION.to_string()),
        )
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a VariableInfo>) {
        out.push(self);
        for child in &self.children {
            child.flatten_into(out);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableTag {
    Common,
    PathSpecific,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedVariableInfo {
    #[serde(flatten)]
    pub variable: VariableInfo,
    pub tag: VariableTag,
    pub source_node_ids: Vec<String>,
}

/// One upstream node feeding a node's input handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSource {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// `None` means the source produces plain text.
    pub schema: Option<Value>,
}

impl InputSource {
    /// Name used when reporting problems attributed to this source.
    pub fn label(&self) -> &str {
        self.node_name.as_deref().unwrap_or(&self.node_id)
    }
}

pub fn get_potential_input_schemas(node_id: &str, graph: &Graph) -> Vec<InputSource> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for edge in graph.input_edges(node_id) {
        if !seen.insert(edge.source.as_str()) {
            continue;
        }
        let Some(source) = graph.node(&edge.source) else {
            continue;
        };
        let node_name = source
            .as_agent()
            .map(|data| data.name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        sources.push(InputSource {
            node_id: source.id.clone(),
            node_name,
            schema: output_schema(&source.id, graph, &mut HashSet::new()),
        });
    }

    sources
}

/// Output schema of a node as seen by its successors.
///
/// Wait and if-else nodes forward their upstream payload, so their schema is the
/// one shared by all of their own inputs.
fn output_schema(node_id: &str, graph: &Graph, visiting: &mut HashSet<String>) -> Option<Value> {
    let node = graph.node(node_id)?;
    match &node.kind {
        NodeKind::Agent { data } => data.output_schema().cloned(),
        NodeKind::Wait { .. } | NodeKind::IfElse { .. } => {
            if !visiting.insert(node_id.to_string()) {
                return None;
            }
            let mut upstream = Vec::new();
            for edge in graph.input_edges(node_id) {
                upstream.push(output_schema(&edge.source, graph, visiting)?);
            }
            let refs: Vec<&Value> = upstream.iter().collect();
            if refs.is_empty() || !are_schemas_identical(&refs) {
                return None;
            }
            upstream.into_iter().next()
        }
        _ => None,
    }
}

pub fn extract_variables_from_schema(
    schema: &Value,
    base_path: &str,
) -> Result<Vec<VariableInfo>, SchemaError> {
    extract_properties(schema, base_path, 0)
}

fn extract_properties(
    schema: &Value,
    base_path: &str,
    depth: usize,
) -> Result<Vec<VariableInfo>, SchemaError> {
    if depth >= MAX_SCHEMA_DEPTH {
        return Err(SchemaError::TooDeep {
            path: base_path.to_string(),
            limit: MAX_SCHEMA_DEPTH,
        });
    }

    let Some(properties) = properties_of(schema) else {
        return Ok(Vec::new());
    };

    let mut variables = Vec::new();
    for (name, property) in properties {
        if !property.is_object() {
            continue;
        }
        let path = format!("{base_path}.{name}");
        let description = property
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let variable = match property.get("type").and_then(Value::as_str) {
            Some("array") => {
                let items = property.get("items").filter(|items| items.is_object());
                match items {
                    Some(items) if properties_of(items).is_some() && kind_of(items) == "object" => {
                        let children = extract_properties(items, &format!("{path}[0]"), depth + 1)?;
                        VariableInfo {
                            path,
                            type_name: "array<object>".to_string(),
                            description,
                            children,
                        }
                    }
                    Some(items) => {
                        VariableInfo::leaf(path, format!("array<{}>", kind_of(items)), description)
                    }
                    None => VariableInfo::leaf(path, "array", description),
                }
            }
            Some("object") if properties_of(property).is_some() => {
                let children = extract_properties(property, &path, depth + 1)?;
                VariableInfo {
                    path,
                    type_name: "object".to_string(),
                    description,
                    children,
                }
            }
            _ => VariableInfo::leaf(path, kind_of(property), description),
        };
        variables.push(variable);
    }

    Ok(variables)
}

fn kind_of(property: &Value) -> &str {
    if property.get("enum").map_or(false, Value::is_array) {
        return "enum";
    }
    property
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("string")
}

fn source_variables(source: &InputSource) -> Vec<VariableInfo> {
    match &source.schema {
        None => vec![VariableInfo::text_input()],
        Some(schema) => match extract_variables_from_schema(schema, "input") {
            Ok(variables) => variables,
            Err(error) => {
                warn!(node_id = %source.node_id, %error, "skipping variables of unusable schema");
                Vec::new()
            }
        },
    }
}

/// Merges the variables of every upstream source, tagging each as common or path-specific.
pub fn get_union_of_variables(node_id: &str, graph: &Graph) -> Vec<TaggedVariableInfo> {
    let sources = get_potential_input_schemas(node_id, graph);
    union_of_sources(&sources)
}

pub fn union_of_sources(sources: &[InputSource]) -> Vec<TaggedVariableInfo> {
    let mut merged: BTreeMap<String, (VariableInfo, Vec<String>)> = BTreeMap::new();

    for source in sources {
        let variables = source_variables(source);
        let mut flat = Vec::new();
        for variable in &variables {
            variable.flatten_into(&mut flat);
        }

        for variable in flat {
            let entry = merged
                .entry(variable.path.clone())
                .or_insert_with(|| (variable.clone(), Vec::new()));
            if !entry.1.contains(&source.node_id) {
                entry.1.push(source.node_id.clone());
            }
        }
    }

    let mut tagged: Vec<TaggedVariableInfo> = merged
        .into_values()
        .map(|(variable, source_node_ids)| TaggedVariableInfo {
            tag: if source_node_ids.len() == sources.len() {
                VariableTag::Common
            } else {
                VariableTag::PathSpecific
            },
            variable,
            source_node_ids,
        })
        .collect();

    tagged.sort_by(|a, b| {
        a.tag
            .cmp(&b.tag)
            .then_with(|| a.variable.path.cmp(&b.variable.path))
    });
    tagged
}

/// Every variable path available at `node_id`, including nested children.
pub fn variable_path_set(node_id: &str, graph: &Graph) -> BTreeSet<String> {
    get_union_of_variables(node_id, graph)
        .into_iter()
        .map(|tagged| tagged.variable.path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AgentData, BranchHandle, Edge, Node, WaitUnit};
    use serde_json::json;

    fn classifier_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "enum": ["urgent", "billing"], "description": "Kind of issue" },
                "user": {
                    "type": "object",
                    "properties": { "email": { "type": "string" } }
                },
                "items": {
                    "type": "array",
                    "items": { "type": "object", "properties": { "id": { "type": "string" } } }
                },
                "scores": { "type": "array", "items": { "type": "number" } }
            }
        })
    }

    #[test]
    fn expands_nested_and_indexed_paths() {
        let variables = extract_variables_from_schema(&classifier_schema(), "input").unwrap();
        let by_path: BTreeMap<_, _> = variables.iter().map(|v| (v.path.as_str(), v)).collect();

        assert_eq!(by_path["input.category"].type_name, "enum");
        assert_eq!(
            by_path["input.category"].description.as_deref(),
            Some("Kind of issue")
        );
        assert_eq!(by_path["input.user"].children[0].path, "input.user.email");
        assert_eq!(by_path["input.items"].type_name, "array<object>");
        assert_eq!(by_path["input.items"].children[0].path, "input.items[0].id");
        assert_eq!(by_path["input.scores"].type_name, "array<number>");
    }

    fn converging_graph(second: AgentData) -> Graph {
        Graph::new(
            vec![
                Node::start("start"),
                Node::agent("a", AgentData::new("Alpha", "m").structured(json!({
                    "type": "object",
                    "properties": { "shared": { "type": "string" }, "only_a": { "type": "integer" } }
                }))),
                Node::agent("b", second),
                Node::end("end"),
            ],
            vec![
                Edge::new("e1", "a", "end"),
                Edge::new("e2", "b", "end"),
            ],
        )
    }

    #[test]
    fn tags_common_and_path_specific() {
        let graph = converging_graph(AgentData::new("Beta", "m").structured(json!({
            "type": "object",
            "properties": { "shared": { "type": "string" }, "only_b": { "type": "boolean" } }
        })));

        let union = get_union_of_variables("end", &graph);
        let paths: Vec<_> = union.iter().map(|v| v.variable.path.as_str()).collect();
        assert_eq!(paths, vec!["input.shared", "input.only_a", "input.only_b"]);

        assert_eq!(union[0].tag, VariableTag::Common);
        assert_eq!(union[0].source_node_ids, vec!["a", "b"]);
        assert_eq!(union[1].tag, VariableTag::PathSpecific);
        assert_eq!(union[1].source_node_ids, vec!["a"]);
        assert_eq!(union[2].source_node_ids, vec!["b"]);
    }

    #[test]
    fn text_source_contributes_single_input_variable() {
        let graph = converging_graph(AgentData::new("Beta", "m"));
        let sources = get_potential_input_schemas("end", &graph);
        assert_eq!(sources.len(), 2);
        assert!(sources[1].schema.is_none());
        assert_eq!(sources[1].label(), "Beta");

        let union = get_union_of_variables("end", &graph);
        let text = union
            .iter()
            .find(|v| v.variable.path == "input")
            .unwrap();
        assert_eq!(text.variable.type_name, "string");
        assert_eq!(text.tag, VariableTag::PathSpecific);
        assert_eq!(text.source_node_ids, vec!["b"]);
    }

    #[test]
    fn pass_through_nodes_forward_upstream_schema() {
        let graph = Graph::new(
            vec![
                Node::start("start"),
                Node::agent("a", AgentData::new("Alpha", "m").structured(classifier_schema())),
                Node::wait("pause", 1, WaitUnit::Seconds),
                Node::if_else("route", vec![BranchHandle::new("output-x", "true")]),
                Node::end("end"),
            ],
            vec![
                Edge::new("e1", "start", "a"),
                Edge::new("e2", "a", "pause"),
                Edge::new("e3", "pause", "route"),
                Edge::new("e4", "route", "end").from_handle("output-x"),
            ],
        );

        let sources = get_potential_input_schemas("route", &graph);
        assert_eq!(sources[0].node_id, "pause");
        assert_eq!(sources[0].schema, Some(classifier_schema()));
        assert!(sources[0].node_name.is_none());

        let paths = variable_path_set("end", &graph);
        assert!(paths.contains("input.items[0].id"));
    }

    #[test]
    fn start_feeds_text() {
        let graph = Graph::new(
            vec![Node::start("start"), Node::end("end")],
            vec![Edge::new("e1", "start", "end")],
        );
        let union = get_union_of_variables("end", &graph);
        assert_eq!(union.len(), 1);
        assert_eq!(union[0].variable, VariableInfo::text_input());
        assert_eq!(union[0].tag, VariableTag::Common);
    }
}
