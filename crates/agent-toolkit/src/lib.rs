//! # agent-toolkit
//!
//! Ready-made tools for agent teams built on agent-core.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Shared ToolRegistry (one Arc per tool)                    │
//! ├────────────────────────────────────────────────────────────┤
//! │  manage_tasks  → TaskMailbox (read / assign / complete)    │
//! │  datetime      → today's date, date arithmetic             │
//! │  echo          → smoke tests                               │
//! │  <custom>      → FunctionTool wrapping a closure           │
//! └────────────────────────────────────────────────────────────┘
//!          │ subset(["manage_tasks", "datetime"])
//!          ▼
//!   per-agent registry
//! ```

pub mod error;
pub mod svckit;

use std::sync::Arc;

use agent_core::{TaskMailbox, ToolRegistry};

pub use error::{Result, ToolkitError};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{DateTimeTool, EchoTool, FunctionTool, TaskManagerTool};
}

/// Registry with every built-in tool, sharing one mailbox
pub fn standard_registry(mailbox: Arc<TaskMailbox>) -> agent_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(tools::TaskManagerTool::new(mailbox))?;
    registry.register(tools::DateTimeTool)?;
    registry.register(tools::EchoTool)?;
    Ok(registry)
}

/// Knowledge text teaching agents how to coordinate through `manage_tasks`
pub const TEAMWORK_KNOWLEDGE: &str = r"## Working as a Team

You are one member of a team. Coordinate through the `manage_tasks` tool:

1. Start by reading your queue with `read_my_tasks`.
2. Mark a task as started with `start_task` before working on it, and finish it with `complete_task` once it is done.
3. Delegate work that belongs to a teammate with `assign_task`, naming the `assignee` and a clear `task_description`.
4. If you handed a task to the wrong person, move it with `reassign_task`.
5. Use `datetime` to work out due dates; pass them as `due_date` in YYYY-MM-DD format.

Only the assignee may complete a task. Tasks are never deleted.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry() {
        let registry = standard_registry(Arc::new(TaskMailbox::in_memory())).unwrap();
        assert_eq!(registry.names(), vec!["datetime", "echo", "manage_tasks"]);
        assert!(
            registry
                .generate_prompt_section()
                .contains(r#"[one of: "read_my_tasks""#)
        );
    }
}
