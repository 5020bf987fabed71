//! Date/Time Tool
//!
//! Models have no clock. This gives them today's date (for due dates) and
//! date arithmetic in whole days.

use std::fmt::Write as _;

use agent_core::{Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema, tool::ParameterSchema};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};

use crate::error::{Result, ToolkitError};

#[derive(Debug, Default)]
pub struct DateTimeTool;

impl DateTimeTool {
    fn describe(now: DateTime<Utc>, call: &ToolCall) -> Result<Value> {
        let offset = call
            .arguments
            .get("days_from_now")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let target = TimeDelta::try_days(offset)
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or(ToolkitError::DateOutOfRange(offset))?;

        let mut formatted = String::new();
        if let Some(format) = call.str_arg("format") {
            write!(formatted, "{}", target.format(format))
                .map_err(|_| ToolkitError::InvalidFormat(format.to_string()))?;
        }

        Ok(json!({
            "now": now.to_rfc3339(),
            "date": target.format("%Y-%m-%d").to_string(),
            "weekday": target.format("%A").to_string(),
            "days_from_now": offset,
            "formatted": (!formatted.is_empty()).then_some(formatted),
        }))
    }
}

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "datetime".into(),
            description: "Get the current UTC date and time, optionally shifted by a number of days."
                .into(),
            parameters: vec![
                ParameterSchema::optional("days_from_now", "integer", "Days to add (negative for the past)")
                    .with_default(json!(0)),
                ParameterSchema::optional("format", "string", "strftime format for an extra `formatted` field"),
            ],
            category: Some("utility".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let data = Self::describe(Utc::now(), call)?;
        Ok(ToolResult::json("datetime", data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn call(arguments: Value) -> ToolCall {
        ToolCall::new("datetime", arguments.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_offset_and_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap();
        let data = DateTimeTool::describe(now, &call(json!({"days_from_now": 15, "format": "%d/%m"}))).unwrap();

        assert_eq!(data["date"], "2026-11-01");
        assert_eq!(data["weekday"], "Sunday");
        assert_eq!(data["formatted"], "01/11");
    }

    #[test]
    fn test_no_format_means_null() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        let data = DateTimeTool::describe(now, &call(json!({}))).unwrap();
        assert_eq!(data["date"], "2026-10-17");
        assert!(data["formatted"].is_null());
    }

    #[test]
    fn test_huge_offset_is_an_error() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        let err = DateTimeTool::describe(now, &call(json!({"days_from_now": i64::MAX}))).unwrap_err();
        assert!(matches!(err, ToolkitError::DateOutOfRange(_)));
    }

    #[test]
    fn test_bad_format_is_an_error() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        let err = DateTimeTool::describe(now, &call(json!({"format": "%Q"}))).unwrap_err();
        assert!(matches!(err, ToolkitError::InvalidFormat(_)));
    }
}
