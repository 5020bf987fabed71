//! Decisions
//!
//! The closed set of things an agent can decide to do in one step, and the
//! strict parser that turns raw model output into one of them. Nothing
//! unvalidated gets past [`Decision::parse`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tool::ToolRegistry;

/// The parsed output of one reasoning call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// Invoke a registered tool
    UseTool {
        tool: String,
        parameters: Map<String, Value>,
        reasoning: String,
    },
    /// Record findings or analysis
    Document { content: String, reasoning: String },
    /// Send a message to another agent
    SendMessage {
        to: String,
        #[serde(rename = "message")]
        content: String,
    },
    /// The goal is achieved
    GoalComplete { summary: String, next_steps: String },
}

impl Decision {
    /// Wire name of the decision's action
    pub const fn action(&self) -> &'static str {
        match self {
            Self::UseTool { .. } => "use_tool",
            Self::Document { .. } => "document",
            Self::SendMessage { .. } => "send_message",
            Self::GoalComplete { .. } => "goal_complete",
        }
    }

    /// Rationale given by the model, if the variant carries one
    pub fn reasoning(&self) -> Option<&str> {
        match self {
            Self::UseTool { reasoning, .. } | Self::Document { reasoning, .. } => {
                Some(reasoning.as_str()).filter(|r| !r.is_empty())
            }
            _ => None,
        }
    }

    /// Serialize to the JSON object the model is asked to produce
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse raw model output.
    ///
    /// Accepts a fenced JSON block, a bare object, or an object surrounded by
    /// prose. Any structural problem is reported as a human-readable reason
    /// that is fed back to the model.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let json = extract_json(raw)?;
        let value: Value =
            serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;
        let Value::Object(object) = value else {
            return Err("expected a JSON object".into());
        };
        Self::from_object(&object)
    }

    /// Parse and check that a `use_tool` decision names a tool in `tools`
    pub fn parse_for(raw: &str, tools: &ToolRegistry) -> Result<Self, String> {
        let decision = Self::parse(raw)?;
        let unknown = match &decision {
            Self::UseTool { tool, .. } if !tools.contains(tool) => Some(tool),
            _ => None,
        };
        if let Some(tool) = unknown {
            let available = if tools.is_empty() {
                "none".to_string()
            } else {
                tools.names().join(", ")
            };
            return Err(format!(
                "tool '{tool}' is not available to you (available tools: {available})"
            ));
        }
        Ok(decision)
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, String> {
        let action = match object.get("action") {
            Some(Value::String(action)) => action.as_str(),
            Some(_) => return Err("field `action` must be a string".into()),
            None => return Err("missing field `action`".into()),
        };

        let fields = Fields { object, action };

        match action {
            "use_tool" => {
                fields.allow(&["tool", "parameters", "reasoning", "rationale"])?;
                let tool = fields.required_str("tool")?;
                let parameters = match object.get("parameters") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(map)) => map.clone(),
                    Some(_) => return Err("field `parameters` must be an object".into()),
                };
                Ok(Self::UseTool {
                    tool,
                    parameters,
                    reasoning: fields.either_str("reasoning", "rationale")?,
                })
            }
            "document" => {
                fields.allow(&["content", "reasoning", "rationale"])?;
                Ok(Self::Document {
                    content: fields.required_str("content")?,
                    reasoning: fields.either_str("reasoning", "rationale")?,
                })
            }
            "send_message" => {
                fields.allow(&["to", "message", "content"])?;
                let to = fields.required_str("to")?;
                let content = match fields.either_str("message", "content")? {
                    content if content.is_empty() => {
                        return Err("missing field `message` for action `send_message`".into());
                    }
                    content => content,
                };
                Ok(Self::SendMessage { to, content })
            }
            "goal_complete" => {
                fields.allow(&["summary", "next_steps"])?;
                Ok(Self::GoalComplete {
                    summary: fields.required_str("summary")?,
                    next_steps: fields.optional_str("next_steps")?.unwrap_or_default(),
                })
            }
            other => Err(format!(
                "unknown action `{other}` (expected use_tool, document, send_message or goal_complete)"
            )),
        }
    }
}

struct Fields<'a> {
    object: &'a Map<String, Value>,
    action: &'a str,
}

impl Fields<'_> {
    fn allow(&self, allowed: &[&str]) -> Result<(), String> {
        match self
            .object
            .keys()
            .find(|key| key.as_str() != "action" && !allowed.contains(&key.as_str()))
        {
            Some(key) => Err(format!(
                "unknown field `{key}` for action `{}`",
                self.action
            )),
            None => Ok(()),
        }
    }

    fn optional_str(&self, key: &str) -> Result<Option<String>, String> {
        match self.object.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(format!("field `{key}` must be a string")),
        }
    }

    fn required_str(&self, key: &str) -> Result<String, String> {
        match self.optional_str(key)? {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(format!(
                "missing field `{key}` for action `{}`",
                self.action
            )),
        }
    }

    fn either_str(&self, key: &str, alias: &str) -> Result<String, String> {
        Ok(match self.optional_str(key)? {
            Some(s) => s,
            None => self.optional_str(alias)?.unwrap_or_default(),
        })
    }
}

/// Locate the JSON object inside a model response
fn extract_json(raw: &str) -> Result<&str, String> {
    let content = raw.trim();

    // A bare object may carry fences inside its strings.
    if content.starts_with('{') && serde_json::from_str::<Value>(content).is_ok() {
        return Ok(content);
    }

    if let Some(start) = content.find("```json") {
        let body = &content[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Ok(body[..end].trim());
    }

    if let Some(start) = content.find("```") {
        let body = &content[start + 3..];
        if let Some(end) = body.find("```") {
            return Ok(body[..end].trim());
        }
    }

    if content.starts_with('{') {
        return Ok(content);
    }

    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&content[start..=end]),
        _ => Err("no JSON object found in response".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn samples() -> Vec<Decision> {
        vec![
            Decision::UseTool {
                tool: "echo".into(),
                parameters: json!({"x": "hello", "n": 2}).as_object().cloned().unwrap(),
                reasoning: "need the input back".into(),
            },
            Decision::Document {
                content: "Found 3 users without MFA".into(),
                reasoning: String::new(),
            },
            Decision::SendMessage {
                to: "Maurice".into(),
                content: "Plan ready for review".into(),
            },
            Decision::GoalComplete {
                summary: "hello".into(),
                next_steps: String::new(),
            },
        ]
    }

    #[test]
    fn test_round_trip_all_variants() {
        for decision in samples() {
            assert_eq!(Decision::parse(&decision.to_json()), Ok(decision));
        }
    }

    #[test]
    fn test_round_trip_with_fences_in_strings() {
        let decisions = [
            Decision::Document {
                content: "Use a ```json block``` when exporting".into(),
                reasoning: String::new(),
            },
            Decision::UseTool {
                tool: "echo".into(),
                parameters: json!({"text": "```rust\nfn main() {}\n```"})
                    .as_object()
                    .cloned()
                    .unwrap(),
                reasoning: "show the snippet".into(),
            },
        ];
        for decision in decisions {
            assert_eq!(Decision::parse(&decision.to_json()), Ok(decision));
        }
    }

    #[test]
    fn test_parse_fenced_and_embedded() {
        let fenced = "Sure.\n```json\n{\"action\": \"goal_complete\", \"summary\": \"done\"}\n```";
        let bare_fence = "```\n{\"action\": \"goal_complete\", \"summary\": \"done\"}\n```";
        let prose = "I am finished {\"action\": \"goal_complete\", \"summary\": \"done\"} thanks";

        for raw in [fenced, bare_fence, prose] {
            assert!(matches!(
                Decision::parse(raw),
                Ok(Decision::GoalComplete { summary, .. }) if summary == "done"
            ));
        }
    }

    #[test]
    fn test_parse_accepts_aliases() {
        let raw = r#"{"action": "use_tool", "tool": "echo", "rationale": "why not"}"#;
        let decision = Decision::parse(raw).unwrap();
        assert_eq!(decision.reasoning(), Some("why not"));

        let raw = r#"{"action": "send_message", "to": "B", "content": "hi"}"#;
        assert!(matches!(
            Decision::parse(raw),
            Ok(Decision::SendMessage { content, .. }) if content == "hi"
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let cases = [
            ("no json here", "no JSON object"),
            ("{not json}", "invalid JSON"),
            (r#"{"summary": "x"}"#, "missing field `action`"),
            (r#"{"action": "dance"}"#, "unknown action `dance`"),
            (r#"{"action": "goal_complete", "summary": "x", "mood": 1}"#, "unknown field `mood`"),
            (r#"{"action": "goal_complete"}"#, "missing field `summary`"),
            (r#"{"action": "use_tool", "tool": "echo", "parameters": [1]}"#, "must be an object"),
            (r#"{"action": "send_message", "to": "B"}"#, "missing field `message`"),
            (r#"{"action": "document", "content": 7}"#, "must be a string"),
        ];
        for (raw, expected) in cases {
            let reason = Decision::parse(raw).unwrap_err();
            assert!(reason.contains(expected), "{raw}: {reason}");
        }
    }

    #[test]
    fn test_parse_for_rejects_undeclared_tool() {
        let raw = r#"{"action": "use_tool", "tool": "rm_rf", "parameters": {}}"#;
        let reason = Decision::parse_for(raw, &ToolRegistry::new()).unwrap_err();
        assert!(reason.contains("'rm_rf' is not available"));
        assert!(reason.contains("available tools: none"));
    }
}
