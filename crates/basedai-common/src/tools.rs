//! Tool descriptors, argument validation and the wire types for tool calls.
//!
//! A tool publishes a [`ToolDescriptor`]: its name, a description for the model,
//! and the typed parameters it accepts. The descriptor renders to the JSON
//! schema sent to the model ([`Tool`]) and decodes raw model arguments into a
//! [`ToolInvocation`] or a [`ValidationError`].

use std::collections::HashMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// The JSON type a tool parameter is declared with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// A JSON string.
    String,
    /// A whole number. Integral floats such as `5.0` are accepted.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
}

impl ParameterType {
    /// Returns the JSON schema name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Returns `true` if `value` is acceptable for a parameter of this type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value
                        .as_f64()
                        .is_some_and(|f| f.is_finite() && f.fract() == 0.0)
            }
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single named, typed parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name as it appears in the argument object.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// Declared JSON type.
    pub param_type: ParameterType,
    /// Value used when an optional parameter is absent or null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    /// Creates a parameter descriptor without a default.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        param_type: ParameterType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            default: None,
        }
    }

    /// Creates a string parameter.
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParameterType::String)
    }

    /// Creates an integer parameter.
    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParameterType::Integer)
    }

    /// Sets the default value substituted when the parameter is omitted.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn to_property(&self) -> Property {
        let description = match &self.default {
            Some(default) => format!("{} (default: {default})", self.description),
            None => self.description.clone(),
        };
        Property::new(self.param_type, description)
    }
}

/// The public contract of a tool: what it is called and what it accepts.
///
/// ```
/// use basedai_common::tools::{ParameterDescriptor, ToolDescriptor};
///
/// let descriptor = ToolDescriptor::builder()
///     .name("search_the_web")
///     .description("Search the web for current information")
///     .required_parameters(vec![ParameterDescriptor::string("query", "Search terms")])
///     .optional_parameters(vec![
///         ParameterDescriptor::integer("num_results", "How many results").with_default(5),
///     ])
///     .build();
///
/// let invocation = descriptor.decode(r#"{"query": "rust"}"#).unwrap();
/// assert_eq!(invocation.get_i64("num_results"), Some(5));
/// assert!(descriptor.decode("{}").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct ToolDescriptor {
    /// Unique tool name the model uses to call it.
    #[builder(setter(into))]
    pub name: String,
    /// Description shown to the model.
    #[builder(setter(into))]
    pub description: String,
    /// Parameters that must be present and non-null.
    #[builder(default)]
    pub required_parameters: Vec<ParameterDescriptor>,
    /// Parameters that may be omitted.
    #[builder(default)]
    pub optional_parameters: Vec<ParameterDescriptor>,
}

impl ToolDescriptor {
    /// Renders this descriptor as the function-calling schema sent to the model.
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        let properties: HashMap<String, Property> = self
            .required_parameters
            .iter()
            .chain(&self.optional_parameters)
            .map(|p| (p.name.clone(), p.to_property()))
            .collect();
        let required = self
            .required_parameters
            .iter()
            .map(|p| p.name.clone())
            .collect();

        Tool::builder()
            .function(Function {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: Parameters::new(properties, required).into(),
            })
            .build()
    }

    /// Decodes raw model arguments against this descriptor.
    ///
    /// Empty or whitespace-only input, and a JSON `null`, are treated as an
    /// empty argument object. Parameters not declared here are kept but
    /// otherwise ignored. Absent or null optional parameters take their
    /// default when one is declared.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::MalformedArguments`] if the input is not a JSON object
    /// - [`ValidationError::MissingParameter`] if a required parameter is absent or null
    /// - [`ValidationError::TypeMismatch`] if a present parameter has the wrong type
    pub fn decode(&self, raw_arguments: &str) -> Result<ToolInvocation, ValidationError> {
        let mut arguments = parse_argument_object(raw_arguments)?;

        for param in &self.required_parameters {
            match arguments.get(&param.name) {
                None | Some(Value::Null) => {
                    return Err(ValidationError::MissingParameter {
                        name: param.name.clone(),
                        expected: param.param_type,
                    });
                }
                Some(value) => check_type(param, value)?,
            }
        }

        for param in &self.optional_parameters {
            match arguments.get(&param.name) {
                None | Some(Value::Null) => match &param.default {
                    Some(default) => {
                        arguments.insert(param.name.clone(), default.clone());
                    }
                    None => {
                        arguments.remove(&param.name);
                    }
                },
                Some(value) => check_type(param, value)?,
            }
        }

        Ok(ToolInvocation {
            tool_name: self.name.clone(),
            arguments,
        })
    }
}

impl From<&ToolDescriptor> for Tool {
    fn from(descriptor: &ToolDescriptor) -> Self {
        descriptor.to_tool()
    }
}

fn parse_argument_object(raw: &str) -> Result<Map<String, Value>, ValidationError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(ValidationError::MalformedArguments(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(ValidationError::MalformedArguments(e.to_string())),
    }
}

fn check_type(param: &ParameterDescriptor, value: &Value) -> Result<(), ValidationError> {
    if param.param_type.matches(value) {
        Ok(())
    } else {
        Err(ValidationError::TypeMismatch {
            name: param.name.clone(),
            expected: param.param_type,
            found: json_type_name(value).to_string(),
        })
    }
}

/// Why a tool call's arguments were rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The argument text was not a JSON object.
    #[error("malformed arguments: {0}")]
    MalformedArguments(String),

    /// A required parameter was absent or null.
    #[error("missing required parameter '{name}' (expected {expected})")]
    MissingParameter {
        name: String,
        expected: ParameterType,
    },

    /// A parameter was present with the wrong JSON type.
    #[error("parameter '{name}' must be of type {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ParameterType,
        found: String,
    },
}

impl ValidationError {
    /// Returns the offending parameter name, if the error concerns one.
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::MalformedArguments(_) => None,
            Self::MissingParameter { name, .. } | Self::TypeMismatch { name, .. } => Some(name),
        }
    }
}

/// A validated request to run one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Name of the tool being invoked.
    pub tool_name: String,
    /// Decoded arguments, with defaults applied.
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    /// Creates an invocation directly from an argument object.
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Returns the raw value of an argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Returns a string argument.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns a string argument, treating blank strings as absent.
    #[must_use]
    pub fn non_blank_str(&self, name: &str) -> Option<&str> {
        self.get_str(name).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Returns an integer argument, truncating integral floats.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        let value = self.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
    }
}

/// Describes a single property in a function parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Property {
    /// The JSON type (e.g., "string", "integer").
    #[serde(rename = "type")]
    pub prop_type: String,
    /// Human-readable description of this property.
    pub description: String,
}

impl Property {
    /// Creates a property of the given type.
    pub fn new(param_type: ParameterType, description: impl Into<String>) -> Self {
        Self {
            prop_type: param_type.as_str().to_string(),
            description: description.into(),
        }
    }

    /// Creates a string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParameterType::String, description)
    }

    /// Creates an integer property.
    #[must_use]
    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(ParameterType::Integer, description)
    }
}

/// Defines the parameter schema for a function using JSON Schema conventions.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Parameters {
    /// The JSON type, always "object".
    #[serde(rename = "type")]
    pub param_type: String,
    /// Map of parameter names to their property definitions.
    pub properties: HashMap<String, Property>,
    /// List of required parameter names.
    pub required: Vec<String>,
}

impl Parameters {
    /// Creates a new `Parameters` with type "object".
    #[must_use]
    pub fn new(properties: HashMap<String, Property>, required: Vec<String>) -> Self {
        Self {
            param_type: "object".to_string(),
            properties,
            required,
        }
    }
}

impl From<Parameters> for serde_json::Value {
    fn from(params: Parameters) -> Self {
        match serde_json::to_value(params) {
            Ok(value) => value,
            Err(e) => {
                warn!("Parameters serialization unexpectedly failed: {e}");
                Self::Null
            }
        }
    }
}

/// Describes a function that can be called by an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Function {
    /// The name of the function.
    pub name: String,
    /// Human-readable description of what the function does.
    pub description: String,
    /// JSON Schema definition of the function's parameters.
    pub parameters: serde_json::Value,
}

/// Represents a tool available to the LLM, typically wrapping a function.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Eq, PartialEq)]
pub struct Tool {
    /// The type of tool (defaults to "function").
    #[serde(rename = "type")]
    #[builder(default = "function".to_string())]
    pub r#type: String,
    /// The function definition.
    pub function: Function,
}

/// Represents an invocation of a function with arguments.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// The name of the function being called.
    pub name: String,
    /// The arguments as a single JSON string, exactly as the model produced them.
    pub arguments: String,
}

impl FunctionCall {
    /// Returns the arguments as a JSON string slice.
    ///
    /// Returns `"{}"` if the arguments string is empty.
    #[must_use]
    pub fn arguments_json(&self) -> &str {
        if self.arguments.is_empty() {
            "{}"
        } else {
            &self.arguments
        }
    }
}

/// A single tool call requested by the model.
///
/// Arguments in `function.arguments` are passed through as-is from API
/// responses and decoded by the tool's [`ToolDescriptor`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// The function being invoked.
    pub function: FunctionCall,
    /// The type of call, typically "function".
    pub call_type: String,
}

impl ToolCall {
    /// Creates a new tool call with a generated ID.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, arguments)
    }

    /// Creates a tool call with a caller-supplied ID.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            call_type: "function".to_string(),
        }
    }
}
