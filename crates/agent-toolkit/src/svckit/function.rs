//! Closure-backed tools
//!
//! Wrap a plain function as a [`Tool`] without writing a struct per tool.
//!
//! ```
//! use agent_core::tool::ParameterSchema;
//! use agent_toolkit::tools::FunctionTool;
//! use serde_json::json;
//!
//! let word_count = FunctionTool::new(
//!     "word_count",
//!     "Count the words in a text",
//!     vec![ParameterSchema::required("text", "string", "Text to count")],
//!     |args| {
//!         let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
//!         Ok(json!(text.split_whitespace().count()))
//!     },
//! );
//! # let _ = word_count;
//! ```

use agent_core::{
    AgentError, Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema, tool::ParameterSchema,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

type Handler = dyn Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync;

/// A tool whose behavior is a closure over the validated arguments
pub struct FunctionTool {
    schema: ToolSchema,
    handler: Box<Handler>,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.schema.name)
            .finish_non_exhaustive()
    }
}

impl FunctionTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSchema>,
        handler: F,
    ) -> Self
    where
        F: Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            schema: ToolSchema {
                name: name.into(),
                description: description.into(),
                parameters,
                category: Some("function".into()),
                has_side_effects: false,
            },
            handler: Box::new(handler),
        }
    }

    #[must_use]
    pub const fn with_side_effects(mut self) -> Self {
        self.schema.has_side_effects = true;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let result = (self.handler)(&call.arguments).map_err(|e| AgentError::ToolExecution {
            tool_name: self.schema.name.clone(),
            message: format!("Function execution failed: {e}"),
        })?;
        Ok(ToolResult::json(
            &self.schema.name,
            json!({ "status": "success", "result": result }),
        ))
    }
}
