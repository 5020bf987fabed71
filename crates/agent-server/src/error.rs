//! HTTP error mapping

use agent_core::AgentError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Error returned by every handler
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub AgentError);

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AgentError::AgentNotFound(_) => (StatusCode::NOT_FOUND, "AGENT_NOT_FOUND"),
            AgentError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
            AgentError::NotOwner { .. } => (StatusCode::FORBIDDEN, "NOT_OWNER"),
            AgentError::TaskState { .. } => (StatusCode::CONFLICT, "TASK_STATE"),
            AgentError::InvalidTransition { .. } | AgentError::NoGoal => {
                (StatusCode::CONFLICT, "AGENT_BUSY")
            }
            AgentError::Cancelled => (StatusCode::CONFLICT, "CANCELLED"),
            AgentError::RateLimitTimeout(_) | AgentError::RateLimited(_) => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED")
            }
            AgentError::ProviderUnavailable(_) | AgentError::LimiterClosed => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE")
            }
            AgentError::StepTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "STEP_TIMEOUT"),
            AgentError::Provider(_) | AgentError::Auth(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            AgentError::DecisionParse { .. }
            | AgentError::MaxSteps(_)
            | AgentError::PhaseRejected { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "RUN_FAILED"),
            AgentError::Other(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(error = %self.0, "Request rejected");
        }

        // Caller-facing errors carry their own detail; the rest get the
        // friendly text only
        let error = match &self.0 {
            AgentError::Other(detail) => detail.clone(),
            AgentError::NotOwner { .. } | AgentError::TaskState { .. } => self.0.to_string(),
            other => other.user_message(),
        };
        (status, Json(ErrorResponse { error, code })).into_response()
    }
}
