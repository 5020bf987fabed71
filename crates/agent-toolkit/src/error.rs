//! Error Types for the Toolkit

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolkitError>;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action '{action}' needs the `{argument}` parameter")]
    MissingArgument {
        action: &'static str,
        argument: &'static str,
    },

    #[error("Invalid due date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Date {0} days from now is out of range")]
    DateOutOfRange(i64),

    #[error("Invalid time format '{0}'")]
    InvalidFormat(String),

    #[error("Tool call has no calling agent")]
    NoCaller,

    #[error(transparent)]
    Mailbox(#[from] AgentError),
}

impl From<ToolkitError> for AgentError {
    fn from(err: ToolkitError) -> Self {
        match err {
            ToolkitError::Mailbox(inner) => inner,
            other => Self::Other(other.to_string()),
        }
    }
}
