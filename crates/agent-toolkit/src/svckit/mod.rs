//! Service Kit - Agent Tools
//!
//! Concrete tools that implement `agent_core::Tool`.

mod datetime;
mod echo;
mod function;
mod task_manager;

pub use datetime::DateTimeTool;
pub use echo::EchoTool;
pub use function::FunctionTool;
pub use task_manager::TaskManagerTool;
