use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::schema::TypedDeclarations;

/// Static type of a condition sub-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CelType {
    Int,
    Double,
    Bool,
    String,
    Null,
    List(Box<CelType>),
    Map(Box<CelType>, Box<CelType>),
    Record(String),
    Dyn,
}

impl CelType {
    /// Reads a declaration type name such as `int`, `list<string>` or `Input_user`.
    pub fn parse(name: &str) -> CelType {
        let name = name.trim();
        match name {
            "int" => CelType::Int,
            "double" => CelType::Double,
            "bool" => CelType::Bool,
            "string" => CelType::String,
            "null" | "null_type" => CelType::Null,
            "dyn" | "" => CelType::Dyn,
            "list" => CelType::List(Box::new(CelType::Dyn)),
            "map" => CelType::Map(Box::new(CelType::String), Box::new(CelType::Dyn)),
            other => match other
                .strip_prefix("list<")
                .and_then(|rest| rest.strip_suffix('>'))
            {
                Some(element) => CelType::List(Box::new(CelType::parse(element))),
                None => CelType::Record(other.to_string()),
            },
        }
    }

    pub fn is_dyn(&self) -> bool {
        matches!(self, CelType::Dyn)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CelType::Int | CelType::Double)
    }

    pub(crate) fn is_bool_like(&self) -> bool {
        matches!(self, CelType::Bool | CelType::Dyn)
    }

    /// Common type of two branches, widening to `dyn` when they disagree.
    pub(crate) fn join(&self, other: &CelType) -> CelType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (CelType::Null, b) => b.clone(),
            (a, CelType::Null) => a.clone(),
            _ => CelType::Dyn,
        }
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CelType::Int => f.write_str("int"),
            CelType::Double => f.write_str("double"),
            CelType::Bool => f.write_str("bool"),
            CelType::String => f.write_str("string"),
            CelType::Null => f.write_str("null_type"),
            CelType::List(element) => write!(f, "list<{element}>"),
            CelType::Map(key, value) => write!(f, "map<{key}, {value}>"),
            CelType::Record(name) => f.write_str(name),
            CelType::Dyn => f.write_str("dyn"),
        }
    }
}

/// Declared variables and record types a condition is checked against.
///
/// Built once per validation pass and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    variables: HashMap<String, CelType>,
    records: HashMap<String, BTreeMap<String, CelType>>,
    permissive: bool,
}

impl TypeEnv {
    /// Accepts any identifier as `dyn`; only syntax and literal misuse are reported.
    pub fn untyped() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    /// `input: string`, the environment of a text-producing upstream node.
    pub fn text_input() -> Self {
        Self::default().with_variable("input", CelType::String)
    }

    pub fn from_declarations(declarations: &TypedDeclarations) -> Self {
        let mut env = Self::default();
        for record in &declarations.type_definitions {
            let fields = record
                .fields
                .iter()
                .map(|(name, type_name)| (name.clone(), CelType::parse(type_name)))
                .collect();
            env.records.insert(record.name.clone(), fields);
        }
        let variable = &declarations.variable_declaration;
        env.with_variable(variable.name.clone(), CelType::parse(&variable.type_name))
    }

    pub fn with_variable(mut self, name: impl Into<String>, ty: CelType) -> Self {
        self.variables.insert(name.into(), ty);
        self
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    pub fn variable(&self, name: &str) -> Option<CelType> {
        match self.variables.get(name) {
            Some(ty) => Some(ty.clone()),
            None if self.permissive => Some(CelType::Dyn),
            None => None,
        }
    }

    pub fn record(&self, name: &str) -> Option<&BTreeMap<String, CelType>> {
        self.records.get(name)
    }

    /// Dotted paths of every declared variable and record field, e.g. `input.user.email`.
    pub fn variable_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        for (name, ty) in &self.variables {
            self.collect_paths(name.clone(), ty, &mut paths, 0);
        }
        paths
    }

    fn collect_paths(&self, path: String, ty: &CelType, out: &mut BTreeSet<String>, depth: usize) {
        if let CelType::Record(name) = ty {
            if let Some(fields) = self.records.get(name).filter(|_| depth < 32) {
                for (field, field_type) in fields {
                    self.collect_paths(format!("{path}.{field}"), field_type, out, depth + 1);
                }
            }
        }
        out.insert(path);
    }
}
