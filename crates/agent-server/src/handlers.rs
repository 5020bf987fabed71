//! HTTP Handlers

use agent_core::{
    AgentSnapshot, AgentStatus, CostSummary, Priority, RunReport, Task, TaskId,
    mailbox::NewTask, orchestrator::DelegatedRun,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub agents: usize,
    pub run_in_progress: bool,
}

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub role: String,
    pub status: AgentStatus,
    pub goal: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub goal: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub from: String,
    pub to: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due: Option<NaiveDate>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.gateway.provider();
    let provider_connected = provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: if state.gateway.is_shutdown() { "shutting_down" } else { "healthy" },
        version: env!("CARGO_PKG_VERSION"),
        provider: provider.name().to_string(),
        provider_connected,
        agents: state.agent_count,
        run_in_progress: state.team.try_read().is_err(),
    })
}

/// LLM calls, tokens and cost so far
pub async fn usage(State(state): State<AppState>) -> Json<CostSummary> {
    Json(state.gateway.usage())
}

pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentSummary>> {
    let team = state.team.read().await;
    Json(
        team.agents()
            .map(|agent| AgentSummary {
                name: agent.name().to_string(),
                role: agent.role().to_string(),
                status: agent.status(),
                goal: agent.goal().map(str::to_string),
            })
            .collect(),
    )
}

pub async fn agent_snapshot(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<AgentSnapshot> {
    let team = state.team.read().await;
    Ok(Json(team.agent(&name)?.snapshot()))
}

/// Run one agent on a goal until it completes or fails
pub async fn run_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<RunRequest>,
) -> ApiResult<RunReport> {
    tracing::info!(agent = %name, goal = %payload.goal, "Run requested");
    let mut team = state.team.write().await;
    Ok(Json(team.run_agent(&name, &payload.goal).await?))
}

/// Drain the agent's queue of not-started tasks
pub async fn run_delegated(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<DelegatedRun>> {
    let mut team = state.team.write().await;
    Ok(Json(team.run_delegated(&name).await?))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(agent): Path<String>,
) -> ApiResult<Vec<Task>> {
    Ok(Json(state.mailbox.list_tasks(&agent)?))
}

pub async fn assign_task(
    State(state): State<AppState>,
    Json(payload): Json<AssignRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let mut request = NewTask::new(payload.description).priority(payload.priority);
    if let Some(due) = payload.due {
        request = request.due(due);
    }
    let task = state.mailbox.submit(&payload.from, &payload.to, request)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn complete_task(
    State(state): State<AppState>,
    Path((agent, id)): Path<(String, TaskId)>,
) -> ApiResult<Task> {
    Ok(Json(state.mailbox.complete_task(&agent, &id)?))
}
