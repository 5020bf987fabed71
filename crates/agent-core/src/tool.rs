//! Tool System
//!
//! Tools are stateless capabilities with a declared parameter schema. They are
//! shared by reference (`Arc<dyn Tool>`) and each agent gets its own
//! [`ToolRegistry`] holding the subset it may invoke.
//!
//! [`ToolRegistry::dispatch`] is the only way a decision reaches a tool: it
//! validates parameters against the schema, runs the tool, and turns every
//! failure (including a panic) into a typed [`AgentError`].

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Tool call request, built from a validated `use_tool` decision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,

    /// Name of the agent making the call
    #[serde(skip)]
    pub caller: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: Some(uuid::Uuid::new_v4().to_string()),
            caller: None,
        }
    }

    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// String argument lookup
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Human-readable output
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn text(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            output: output.into(),
            data: None,
        }
    }

    pub fn json(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            id: None,
            output: String::new(),
            data: Some(data),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The value recorded in the action history
    pub fn value(&self) -> Value {
        self.data
            .clone()
            .unwrap_or_else(|| Value::String(self.output.clone()))
    }

    /// Text shown to the model
    pub fn render(&self) -> String {
        self.data.as_ref().map_or_else(
            || self.output.clone(),
            |data| serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()),
        )
    }
}

/// One schema violation found while validating tool parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterViolation {
    pub field: String,
    pub problem: String,
}

impl ParameterViolation {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl std::fmt::Display for ParameterViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}`: {}", self.field, self.problem)
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    /// Required parameter
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    /// Optional parameter
    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    fn type_matches(&self, value: &Value) -> bool {
        match self.param_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            _ => true,
        }
    }
}

/// Tool definition schema (rendered into the prompt)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// Check `arguments` against the schema and fill in defaults.
    ///
    /// Collects every violation instead of stopping at the first one so the
    /// model sees all of them in one observation.
    pub fn validate(
        &self,
        arguments: &Map<String, Value>,
    ) -> std::result::Result<Map<String, Value>, Vec<ParameterViolation>> {
        let mut violations = Vec::new();
        let mut normalized = Map::new();

        for key in arguments.keys() {
            if !self.parameters.iter().any(|p| &p.name == key) {
                violations.push(ParameterViolation::new(key, "unknown parameter"));
            }
        }

        for param in &self.parameters {
            match arguments.get(&param.name) {
                None | Some(Value::Null) => {
                    if let Some(default) = &param.default {
                        normalized.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        violations.push(ParameterViolation::new(
                            &param.name,
                            "missing required parameter",
                        ));
                    }
                }
                Some(value) => {
                    if !param.type_matches(value) {
                        violations.push(ParameterViolation::new(
                            &param.name,
                            format!("expected {}", param.param_type),
                        ));
                    } else if let Some(allowed) = param
                        .enum_values
                        .as_ref()
                        .filter(|allowed| !allowed.contains(value))
                    {
                        let allowed = allowed
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        violations.push(ParameterViolation::new(
                            &param.name,
                            format!("must be one of {allowed}"),
                        ));
                    }
                    normalized.insert(param.name.clone(), value.clone());
                }
            }
        }

        if violations.is_empty() {
            Ok(normalized)
        } else {
            Err(violations)
        }
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with validated arguments
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;

    /// Validate arguments before execution, returning the call with defaults
    /// filled in
    fn validate(&self, call: &ToolCall) -> Result<ToolCall> {
        let schema = self.schema();
        let arguments = schema
            .validate(&call.arguments)
            .map_err(|violations| AgentError::InvalidParameters {
                tool: schema.name.clone(),
                violations,
            })?;
        Ok(ToolCall {
            arguments,
            ..call.clone()
        })
    }
}

/// Registry for available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_shared(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.schema().name;
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Build a registry holding only `names`, sharing the same tool instances
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut subset = Self::new();
        for name in names {
            let tool = self
                .get(name.as_ref())
                .ok_or_else(|| AgentError::ToolNotFound(name.as_ref().to_string()))?;
            subset.register_shared(tool)?;
        }
        Ok(subset)
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Validate and execute a tool call.
    ///
    /// Errors are always one of `ToolNotFound`, `InvalidParameters` or
    /// `ToolExecution`; nothing raised by the tool escapes unwrapped.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolResult> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let call = tool.validate(call)?;

        let outcome = AssertUnwindSafe(tool.execute(&call)).catch_unwind().await;
        match outcome {
            Ok(Ok(mut result)) => {
                result.id.clone_from(&call.id);
                Ok(result)
            }
            Ok(Err(err @ AgentError::ToolExecution { .. })) => Err(err),
            Ok(Err(err)) => Err(AgentError::ToolExecution {
                tool_name: call.name.clone(),
                message: err.to_string(),
            }),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                Err(AgentError::ToolExecution {
                    tool_name: call.name.clone(),
                    message: format!("tool panicked: {message}"),
                })
            }
        }
    }

    /// Get all tool schemas, ordered by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names, ordered
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn generate_prompt_section(&self) -> String {
        use std::fmt::Write as _;

        if self.tools.is_empty() {
            return "No tools available.\n".into();
        }

        let mut prompt = String::new();
        for schema in self.schemas() {
            let _ = writeln!(prompt, "### {}", schema.name);
            let _ = writeln!(prompt, "{}", schema.description);

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    let _ = write!(
                        prompt,
                        "- `{}` ({}){}: {}",
                        param.name, param.param_type, required, param.description
                    );
                    if let Some(default) = &param.default {
                        let _ = write!(prompt, " [default: {default}]");
                    }
                    if let Some(values) = &param.enum_values {
                        let values = values
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        let _ = write!(prompt, " [one of: {values}]");
                    }
                    prompt.push('\n');
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}
