use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use stratus_core::domain::architecture::{GraphEdge, GraphNode};
use stratus_core::naming::is_valid_identifier;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Compute,
    Networking,
    Storage,
    Databases,
    Messaging,
    Security,
    Monitoring,
    Analytics,
    Application,
    Devops,
    Utility,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Networking => "networking",
            Self::Storage => "storage",
            Self::Databases => "databases",
            Self::Messaging => "messaging",
            Self::Security => "security",
            Self::Monitoring => "monitoring",
            Self::Analytics => "analytics",
            Self::Application => "application",
            Self::Devops => "devops",
            Self::Utility => "utility",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("parameters must be a JSON object")]
    NotAnObject,
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("parameter `{name}` must be {expected}")]
    InvalidType { name: &'static str, expected: &'static str },
    #[error("parameter `{name}` is not a valid resource identifier: `{value}`")]
    InvalidIdentifier { name: &'static str, value: String },
    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    StringList,
    ObjectList,
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::StringList | Self::ObjectList => "array",
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::StringList => "an array of strings",
            Self::ObjectList => "an array of objects",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamDefault {
    None,
    Str(&'static str),
    Int(i64),
    Num(f64),
    Bool(bool),
    StrList(&'static [&'static str]),
}

impl ParamDefault {
    fn to_value(self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Str(value) => Some(json!(value)),
            Self::Int(value) => Some(json!(value)),
            Self::Num(value) => Some(json!(value)),
            Self::Bool(value) => Some(json!(value)),
            Self::StrList(values) => Some(json!(values)),
        }
    }
}

/// Declared contract for one capability parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
    pub default: ParamDefault,
    /// Value is spliced into HCL labels, so it must be a plain identifier.
    pub identifier: bool,
}

impl ParamSpec {
    pub const fn id(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::String,
            description,
            required: true,
            default: ParamDefault::None,
            identifier: true,
        }
    }

    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::String,
            description,
            required: true,
            default: ParamDefault::None,
            identifier: false,
        }
    }

    pub const fn string(
        name: &'static str,
        description: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ParamKind::String,
            description,
            required: false,
            default: ParamDefault::Str(default),
            identifier: false,
        }
    }

    pub const fn integer(name: &'static str, description: &'static str, default: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Integer,
            description,
            required: false,
            default: ParamDefault::Int(default),
            identifier: false,
        }
    }

    pub const fn number(name: &'static str, description: &'static str, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Number,
            description,
            required: false,
            default: ParamDefault::Num(default),
            identifier: false,
        }
    }

    pub const fn boolean(name: &'static str, description: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Boolean,
            description,
            required: false,
            default: ParamDefault::Bool(default),
            identifier: false,
        }
    }

    pub const fn string_list(
        name: &'static str,
        description: &'static str,
        default: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind: ParamKind::StringList,
            description,
            required: false,
            default: ParamDefault::StrList(default),
            identifier: false,
        }
    }

    pub const fn object_list(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::ObjectList,
            description,
            required: false,
            default: ParamDefault::None,
            identifier: false,
        }
    }

    /// Marks a reference to another resource's identifier.
    pub const fn reference(mut self) -> Self {
        self.identifier = true;
        self
    }

    pub const fn mandatory(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Renders declared parameters as the JSON-Schema-like contract shown to the model.
pub fn parameter_schema(specs: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for spec in specs {
        let mut property = Map::new();
        property.insert("type".to_string(), json!(spec.kind.json_type()));
        if !spec.description.is_empty() {
            property.insert("description".to_string(), json!(spec.description));
        }
        match spec.kind {
            ParamKind::StringList => {
                property.insert("items".to_string(), json!({"type": "string"}));
            }
            ParamKind::ObjectList => {
                property.insert("items".to_string(), json!({"type": "object"}));
            }
            _ => {}
        }
        if let Some(default) = spec.default.to_value() {
            property.insert("default".to_string(), default);
        }
        properties.insert(spec.name.to_string(), Value::Object(property));
        if spec.required {
            required.push(json!(spec.name));
        }
    }

    json!({"type": "object", "properties": properties, "required": required})
}

/// Parameters checked against a capability's declared contract, with defaults filled in.
#[derive(Clone, Debug, PartialEq)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    pub fn parse(specs: &[ParamSpec], input: &Value) -> Result<Self, CapabilityError> {
        let raw = match input {
            Value::Object(map) => map,
            Value::Null => return Self::parse(specs, &Value::Object(Map::new())),
            _ => return Err(CapabilityError::NotAnObject),
        };

        let mut values = Map::new();
        for spec in specs {
            match raw.get(spec.name).filter(|value| !value.is_null()) {
                Some(value) => {
                    let checked = check_kind(spec, value)?;
                    if spec.identifier {
                        let text = checked.as_str().unwrap_or_default();
                        if !is_valid_identifier(text) {
                            return Err(CapabilityError::InvalidIdentifier {
                                name: spec.name,
                                value: text.to_string(),
                            });
                        }
                    }
                    values.insert(spec.name.to_string(), checked);
                }
                None if spec.required => return Err(CapabilityError::MissingParameter(spec.name)),
                None => {
                    if let Some(default) = spec.default.to_value() {
                        values.insert(spec.name.to_string(), default);
                    }
                }
            }
        }

        Ok(Self { values })
    }

    pub fn str(&self, name: &str) -> &str {
        self.values.get(name).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str).filter(|value| !value.is_empty())
    }

    pub fn int(&self, name: &str) -> i64 {
        self.values.get(name).and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn num(&self, name: &str) -> f64 {
        self.values.get(name).and_then(Value::as_f64).unwrap_or_default()
    }

    pub fn bool(&self, name: &str) -> bool {
        self.values.get(name).and_then(Value::as_bool).unwrap_or_default()
    }

    pub fn str_list(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn objects(&self, name: &str) -> Vec<Map<String, Value>> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).cloned().collect())
            .unwrap_or_default()
    }

    /// String value escaped for use inside an HCL quoted string.
    pub fn hcl(&self, name: &str) -> String {
        hcl_escape(self.str(name))
    }

    /// Label falls back to the resource id when the model leaves it blank.
    pub fn label_or(&self, id: &str) -> String {
        self.opt_str("label").unwrap_or(id).to_string()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Escapes quotes, backslashes and template sequences so free text stays a literal.
pub fn hcl_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "$${")
        .replace("%{", "%%{")
        .replace('\n', "\\n")
}

fn check_kind(spec: &ParamSpec, value: &Value) -> Result<Value, CapabilityError> {
    let mismatch = || CapabilityError::InvalidType { name: spec.name, expected: spec.kind.expected() };
    match spec.kind {
        ParamKind::String => value.as_str().map(|text| json!(text)).ok_or_else(mismatch),
        ParamKind::Integer => match value {
            Value::Number(number) if number.is_i64() || number.is_u64() => Ok(value.clone()),
            Value::Number(number) => number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .map(|float| json!(float as i64))
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        ParamKind::Number => value.as_f64().map(|number| json!(number)).ok_or_else(mismatch),
        ParamKind::Boolean => value.as_bool().map(|flag| json!(flag)).ok_or_else(mismatch),
        ParamKind::StringList => match value.as_array() {
            Some(items) if items.iter().all(Value::is_string) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        ParamKind::ObjectList => match value.as_array() {
            Some(items) if items.iter().all(Value::is_object) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
    }
}

/// Output of one capability invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityResult {
    pub node: GraphNode,
    pub files: BTreeMap<String, String>,
    pub edges: Vec<GraphEdge>,
    pub metadata: Map<String, Value>,
}

pub const EDGE_ONLY_KEY: &str = "is_edge_only";

impl CapabilityResult {
    pub fn resource(id: &str, node_type: &str, label: String) -> Self {
        Self {
            node: GraphNode {
                id: id.to_string(),
                node_type: node_type.to_string(),
                label,
                config: Map::new(),
            },
            files: BTreeMap::new(),
            edges: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// A connective result that contributes edges but no node.
    pub fn edge_only(edge: GraphEdge) -> Self {
        let mut result = Self::resource("_edge_", "_edge_", "connection".to_string());
        result.edges.push(edge);
        result.metadata.insert(EDGE_ONLY_KEY.to_string(), Value::Bool(true));
        result
    }

    pub fn with_config(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.node.config.insert(key.to_string(), value.into());
        self
    }

    pub fn with_file(mut self, filename: &str, code: String) -> Self {
        self.files.insert(filename.to_string(), code);
        self
    }

    pub fn with_edge(mut self, from: &str, to: &str, label: &str) -> Self {
        self.edges.push(GraphEdge::new(from, to, label));
        self
    }

    pub fn is_edge_only(&self) -> bool {
        self.metadata.get(EDGE_ONLY_KEY).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// A named, schema-described unit that turns parameters into a graph node, edges, and IaC text.
///
/// Implementations are pure: the same parameters always produce the same result.
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn category(&self) -> Category;
    /// Node type produced on success, `None` for connective capabilities.
    fn node_type(&self) -> Option<&'static str>;
    fn parameters(&self) -> &'static [ParamSpec];
    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError>;

    fn parameter_schema(&self) -> Value {
        parameter_schema(self.parameters())
    }
}
