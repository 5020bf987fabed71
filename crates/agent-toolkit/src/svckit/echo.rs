//! Echo Tool

use agent_core::{Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema, tool::ParameterSchema};
use async_trait::async_trait;

/// Returns its input unchanged; handy for smoke-testing a team
#[derive(Debug, Default)]
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".into(),
            description: "Return the given text unchanged.".into(),
            parameters: vec![ParameterSchema::required("text", "string", "Text to echo back")],
            category: Some("utility".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        Ok(ToolResult::text("echo", call.str_arg("text").unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::ToolRegistry;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let call = ToolCall::new("echo", json!({"text": "hello"}).as_object().cloned().unwrap());
        let result = registry.dispatch(&call).await.unwrap();
        assert_eq!(result.render(), "hello");
    }
}
