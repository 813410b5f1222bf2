//! Schema introspection and upstream variable resolution.

mod introspect;
mod variables;

pub use introspect::{
    are_schemas_identical, convert_schema_to_typed_declarations, scalar_type_name, RecordType,
    SchemaError, TypedDeclarations, VariableDeclaration, MAX_SCHEMA_DEPTH,
};
pub use variables::{
    extract_variables_from_schema, get_potential_input_schemas, get_union_of_variables,
    union_of_sources, variable_path_set, InputSource, TaggedVariableInfo, VariableInfo,
    VariableTag, TEXT_INPUT_DESCRIPTION,
};

pub(crate) use introspect::json_kind;
