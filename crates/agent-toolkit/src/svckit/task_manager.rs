//! Task Management Tool
//!
//! Exposes the shared [`TaskMailbox`] to the model so agents can read their
//! queue, create work for themselves and delegate work to teammates. The
//! acting agent is always the caller recorded on the [`ToolCall`], never a
//! name the model supplies.

use std::str::FromStr;
use std::sync::Arc;

use agent_core::{
    Priority, Result as CoreResult, Task, TaskId, TaskMailbox, Tool, ToolCall, ToolResult,
    ToolSchema, mailbox::NewTask, tool::ParameterSchema,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::error::{Result, ToolkitError};

const ACTIONS: [&str; 7] = [
    "read_my_tasks",
    "create_task",
    "assign_task",
    "start_task",
    "complete_task",
    "reassign_task",
    "list_all_tasks",
];

/// Tool for reading and delegating tasks through the mailbox
pub struct TaskManagerTool {
    mailbox: Arc<TaskMailbox>,
}

impl TaskManagerTool {
    pub const fn new(mailbox: Arc<TaskMailbox>) -> Self {
        Self { mailbox }
    }

    fn run(&self, caller: &str, call: &ToolCall) -> Result<Value> {
        let action = call.str_arg("action").unwrap_or_default();
        match action {
            "read_my_tasks" => self.read_my_tasks(caller),
            "create_task" => {
                let task = self.mailbox.submit(caller, caller, new_task(call, "create_task")?)?;
                Ok(json!({ "status": "created", "task": task }))
            }
            "assign_task" => {
                let assignee = required(call, "assign_task", "assignee")?;
                let task = self
                    .mailbox
                    .submit(caller, assignee, new_task(call, "assign_task")?)?;
                Ok(json!({ "status": "assigned", "task": task }))
            }
            "start_task" => {
                let id = task_id(call, "start_task")?;
                let task = self.mailbox.start_task(caller, &id)?;
                Ok(json!({ "status": "started", "task": task }))
            }
            "complete_task" => {
                let id = task_id(call, "complete_task")?;
                let task = self.mailbox.complete_task(caller, &id)?;
                Ok(json!({ "status": "completed", "task": task }))
            }
            "reassign_task" => {
                let id = task_id(call, "reassign_task")?;
                let assignee = required(call, "reassign_task", "assignee")?;
                let task = self.mailbox.reassign_task(caller, &id, assignee)?;
                Ok(json!({ "status": "reassigned", "task": task }))
            }
            "list_all_tasks" => Ok(json!({ "agents": self.mailbox.overview()? })),
            other => Err(ToolkitError::UnknownAction(other.to_string())),
        }
    }

    fn read_my_tasks(&self, caller: &str) -> Result<Value> {
        let (completed, current): (Vec<Task>, Vec<Task>) = self
            .mailbox
            .list_tasks(caller)?
            .into_iter()
            .partition(Task::is_complete);
        let delegated: Vec<Task> = self
            .mailbox
            .delegated_by(caller)?
            .into_iter()
            .filter(Task::is_delegated)
            .collect();

        Ok(json!({
            "agent": caller,
            "current_tasks": current,
            "completed_tasks": completed,
            "delegated_tasks": delegated,
        }))
    }
}

fn required<'a>(call: &'a ToolCall, action: &'static str, argument: &'static str) -> Result<&'a str> {
    call.str_arg(argument)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ToolkitError::MissingArgument { action, argument })
}

fn task_id(call: &ToolCall, action: &'static str) -> Result<TaskId> {
    let raw = required(call, action, "task_id")?;
    Ok(TaskId::from_str(raw)?)
}

fn new_task(call: &ToolCall, action: &'static str) -> Result<NewTask> {
    let description = required(call, action, "task_description")?;
    let priority = call
        .str_arg("priority")
        .map_or(Ok(Priority::default()), Priority::from_str)?;

    let mut request = NewTask::new(description).priority(priority);
    if let Some(raw) = call.str_arg("due_date").filter(|s| !s.trim().is_empty()) {
        let due = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| ToolkitError::InvalidDate(raw.to_string()))?;
        request = request.due(due);
    }
    Ok(request)
}

#[async_trait]
impl Tool for TaskManagerTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "manage_tasks".into(),
            description: "Read, create, assign, start, complete and reassign tasks. \
                          Enables task delegation and tracking across the team."
                .into(),
            parameters: vec![
                ParameterSchema::required("action", "string", "Action to perform")
                    .with_enum(ACTIONS.iter().map(|a| json!(a)).collect()),
                ParameterSchema::optional(
                    "task_description",
                    "string",
                    "Description of the task (create_task, assign_task)",
                ),
                ParameterSchema::optional(
                    "assignee",
                    "string",
                    "Agent to hand the task to (assign_task, reassign_task)",
                ),
                ParameterSchema::optional("priority", "string", "Task priority")
                    .with_default(json!("medium"))
                    .with_enum(vec![json!("high"), json!("medium"), json!("low")]),
                ParameterSchema::optional(
                    "task_id",
                    "string",
                    "Id of an existing task (start_task, complete_task, reassign_task)",
                ),
                ParameterSchema::optional("due_date", "string", "Due date in YYYY-MM-DD format"),
            ],
            category: Some("coordination".into()),
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let caller = call.caller.as_deref().ok_or(ToolkitError::NoCaller)?;
        tracing::debug!(caller, action = ?call.str_arg("action"), "Managing tasks");

        let data = self.run(caller, call)?;
        Ok(ToolResult::json("manage_tasks", data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{AgentError, TaskStatus, ToolRegistry};
    use serde_json::Map;

    fn registry(mailbox: &Arc<TaskMailbox>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(TaskManagerTool::new(Arc::clone(mailbox)))
            .unwrap();
        registry
    }

    fn call(caller: &str, arguments: Value) -> ToolCall {
        let arguments: Map<String, Value> = arguments.as_object().cloned().unwrap_or_default();
        ToolCall::new("manage_tasks", arguments).with_caller(caller)
    }

    #[tokio::test]
    async fn test_assign_then_read_and_complete() {
        let mailbox = Arc::new(TaskMailbox::in_memory());
        let tools = registry(&mailbox);

        let assigned = tools
            .dispatch(&call(
                "Esther",
                json!({
                    "action": "assign_task",
                    "assignee": "Maurice",
                    "task_description": "Collect IAM evidence",
                    "priority": "high",
                    "due_date": "2026-11-01"
                }),
            ))
            .await
            .unwrap();
        let id = assigned.value()["task"]["id"].as_str().unwrap().to_string();

        let mine = tools
            .dispatch(&call("Maurice", json!({"action": "read_my_tasks"})))
            .await
            .unwrap()
            .value();
        assert_eq!(mine["current_tasks"][0]["assigned_by"], "Esther");
        assert_eq!(mine["current_tasks"][0]["due"], "2026-11-01");

        tools
            .dispatch(&call("Maurice", json!({"action": "complete_task", "task_id": id})))
            .await
            .unwrap();
        let task = mailbox.get_task(&id.parse().unwrap()).unwrap();
        assert_eq!(task.status, TaskStatus::Complete);

        let esther = tools
            .dispatch(&call("Esther", json!({"action": "read_my_tasks"})))
            .await
            .unwrap()
            .value();
        assert_eq!(esther["delegated_tasks"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completing_someone_elses_task_fails() {
        let mailbox = Arc::new(TaskMailbox::in_memory());
        let task = mailbox
            .assign_task("Esther", "Maurice", "Review policies", Priority::Medium)
            .unwrap();

        let err = registry(&mailbox)
            .dispatch(&call(
                "Esther",
                json!({"action": "complete_task", "task_id": task.id.to_string()}),
            ))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, AgentError::ToolExecution { message, .. } if message.contains("does not own"))
        );
    }

    #[tokio::test]
    async fn test_missing_arguments_are_named() {
        let mailbox = Arc::new(TaskMailbox::in_memory());
        let err = registry(&mailbox)
            .dispatch(&call("Esther", json!({"action": "assign_task", "task_description": "x"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("`assignee`"));

        let err = registry(&mailbox)
            .dispatch(&call(
                "Esther",
                json!({"action": "create_task", "task_description": "x", "due_date": "soon"}),
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid due date"));
    }

    #[tokio::test]
    async fn test_unknown_action_rejected_by_schema() {
        let mailbox = Arc::new(TaskMailbox::in_memory());
        let err = registry(&mailbox)
            .dispatch(&call("Esther", json!({"action": "delete_task"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn test_requires_caller() {
        let mailbox = Arc::new(TaskMailbox::in_memory());
        let anonymous = ToolCall::new(
            "manage_tasks",
            json!({"action": "list_all_tasks"}).as_object().cloned().unwrap(),
        );
        let err = registry(&mailbox).dispatch(&anonymous).await.unwrap_err();
        assert!(err.to_string().contains("no calling agent"));
    }

    #[tokio::test]
    async fn test_list_all_tasks_counts() {
        let mailbox = Arc::new(TaskMailbox::in_memory());
        mailbox
            .assign_task("Esther", "Maurice", "a", Priority::Low)
            .unwrap();
        mailbox.create_task("Maurice", "b", Priority::Low).unwrap();

        let overview = registry(&mailbox)
            .dispatch(&call("Neil", json!({"action": "list_all_tasks"})))
            .await
            .unwrap()
            .value();
        assert_eq!(overview["agents"]["Maurice"]["current"], 2);
        assert_eq!(overview["agents"]["Esther"]["delegated"], 1);
    }
}
