use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Nesting beyond this is treated as a runaway or self-referential schema.
pub const MAX_SCHEMA_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema nesting exceeds {limit} levels at '{path}'")]
    TooDeep { path: String, limit: usize },

    #[error("schema must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Named record type with its field name to type name mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordType {
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Record types in dependency order (children first) plus the root variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDeclarations {
    pub type_definitions: Vec<RecordType>,
    pub variable_declaration: VariableDeclaration,
}

impl TypedDeclarations {
    pub fn root(&self) -> Option<&RecordType> {
        self.type_definitions
            .iter()
            .find(|record| record.name == self.variable_declaration.type_name)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Maps a JSON Schema `type` keyword onto the condition language's scalar types.
pub fn scalar_type_name(json_type: Option<&str>) -> &'static str {
    match json_type {
        Some("integer") => "int",
        Some("number") => "double",
        Some("boolean") => "bool",
        Some("string") => "string",
        Some("array") => "list",
        Some("object") => "map",
        _ => "dyn",
    }
}

pub(crate) fn properties_of(schema: &Value) -> Option<&Map<String, Value>> {
    schema.get("properties").and_then(Value::as_object)
}

fn type_keyword(schema: &Value) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn convert_schema_to_typed_declarations(
    schema: &Value,
    base_path: &str,
) -> Result<TypedDeclarations, SchemaError> {
    if !schema.is_object() {
        return Err(SchemaError::NotAnObject {
            found: json_kind(schema),
        });
    }

    let root_name = capitalize(base_path);
    let mut definitions = Vec::new();
    let fields = record_fields(schema, &root_name, base_path, 0, &mut definitions)?;
    definitions.push(RecordType {
        name: root_name.clone(),
        fields,
    });

    Ok(TypedDeclarations {
        type_definitions: definitions,
        variable_declaration: VariableDeclaration {
            name: base_path.to_string(),
            type_name: root_name,
        },
    })
}

fn record_fields(
    schema: &Value,
    record_name: &str,
    path: &str,
    depth: usize,
    definitions: &mut Vec<RecordType>,
) -> Result<BTreeMap<String, String>, SchemaError> {
    if depth >= MAX_SCHEMA_DEPTH {
        return Err(SchemaError::TooDeep {
            path: path.to_string(),
            limit: MAX_SCHEMA_DEPTH,
        });
    }

    let mut fields = BTreeMap::new();
    if let Some(properties) = properties_of(schema) {
        for (key, property) in properties {
            if !property.is_object() {
                continue;
            }
            let field_path = format!("{path}.{key}");
            let field_type =
                property_type(property, record_name, key, &field_path, depth, definitions)?;
            fields.insert(key.clone(), field_type);
        }
    }
    Ok(fields)
}

fn property_type(
    property: &Value,
    record_name: &str,
    field: &str,
    path: &str,
    depth: usize,
    definitions: &mut Vec<RecordType>,
) -> Result<String, SchemaError> {
    match type_keyword(property) {
        Some("array") => match property.get("items").filter(|items| items.is_object()) {
            Some(items) if type_keyword(items) == Some("object") && properties_of(items).is_some() => {
                let item_name = format!("{record_name}_{field}_item");
                let fields =
                    record_fields(items, &item_name, &format!("{path}[]"), depth + 1, definitions)?;
                definitions.push(RecordType {
                    name: item_name.clone(),
                    fields,
                });
                Ok(format!("list<{item_name}>"))
            }
            Some(items) => Ok(format!("list<{}>", scalar_type_name(type_keyword(items)))),
            None => Ok("list".to_string()),
        },
        Some("object") if properties_of(property).is_some() => {
            let nested_name = format!("{record_name}_{field}");
            let fields = record_fields(property, &nested_name, path, depth + 1, definitions)?;
            definitions.push(RecordType {
                name: nested_name.clone(),
                fields,
            });
            Ok(nested_name)
        }
        other => Ok(scalar_type_name(other).to_string()),
    }
}

/// True when every schema lowers to the same root field names and field types.
///
/// Only the root record is compared; schemas that fail to lower never match.
pub fn are_schemas_identical(schemas: &[&Value]) -> bool {
    let mut roots = Vec::with_capacity(schemas.len());
    for schema in schemas {
        match convert_schema_to_typed_declarations(schema, "input") {
            Ok(declarations) => match declarations.root() {
                Some(root) => roots.push(root.fields.clone()),
                None => return false,
            },
            Err(_) => return false,
        }
    }

    match roots.split_first() {
        Some((first, rest)) => rest.iter().all(|fields| fields == first),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "total": { "type": "number" },
                "count": { "type": "integer" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "customer": {
                    "type": "object",
                    "properties": {
                        "email": { "type": "string" },
                        "address": {
                            "type": "object",
                            "properties": { "city": { "type": "string" } }
                        }
                    }
                },
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "id": { "type": "string" }, "qty": { "type": "integer" } }
                    }
                },
                "meta": { "type": "object" },
                "anything": {}
            }
        })
    }

    #[test]
    fn lowers_nested_records_children_first() {
        let declarations = convert_schema_to_typed_declarations(&order_schema(), "input").unwrap();
        let names: Vec<_> = declarations
            .type_definitions
            .iter()
            .map(|record| record.name.as_str())
            .collect();

        assert_eq!(
            names,
            vec!["Input_customer_address", "Input_customer", "Input_items_item", "Input"]
        );
        assert_eq!(declarations.variable_declaration.name, "input");
        assert_eq!(declarations.variable_declaration.type_name, "Input");

        let root = declarations.root().unwrap();
        assert_eq!(root.fields["total"], "double");
        assert_eq!(root.fields["count"], "int");
        assert_eq!(root.fields["tags"], "list<string>");
        assert_eq!(root.fields["customer"], "Input_customer");
        assert_eq!(root.fields["items"], "list<Input_items_item>");
        assert_eq!(root.fields["meta"], "map");
        assert_eq!(root.fields["anything"], "dyn");
    }

    #[test]
    fn rejects_runaway_nesting() {
        let mut schema = json!({ "type": "string" });
        for _ in 0..(MAX_SCHEMA_DEPTH + 2) {
            schema = json!({ "type": "object", "properties": { "next": schema } });
        }
        let error = convert_schema_to_typed_declarations(&schema, "input").unwrap_err();
        assert!(matches!(error, SchemaError::TooDeep { .. }));
    }

    #[test]
    fn identical_ignores_descriptions_but_not_types() {
        let a = json!({ "type": "object", "properties": { "x": { "type": "string", "description": "a" } } });
        let b = json!({ "type": "object", "properties": { "x": { "type": "string" } } });
        let c = json!({ "type": "object", "properties": { "x": { "type": "integer" } } });
        let d = json!({ "type": "object", "properties": { "y": { "type": "string" } } });

        assert!(are_schemas_identical(&[&a, &b]));
        assert!(!are_schemas_identical(&[&a, &c]));
        assert!(!are_schemas_identical(&[&a, &d]));
        assert!(are_schemas_identical(&[]));
    }

    #[test]
    fn non_object_schema_is_rejected() {
        let error = convert_schema_to_typed_declarations(&json!("string"), "input").unwrap_err();
        assert_eq!(error, SchemaError::NotAnObject { found: "string" });
    }
}
