//! agent-team HTTP Server
//!
//! Axum-based server exposing one orchestrated agent team: run agents on
//! goals, read and write the shared task mailbox, and watch the LLM budget.

mod config;
mod error;
mod handlers;
mod state;

use std::sync::Arc;

use agent_core::{
    AgentConfig, EngineConfig, LlmGateway, PriceTable, RateLimitConfig, TaskMailbox,
    mailbox::JsonFileTaskStore,
};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::handlers::{
    agent_snapshot, assign_task, complete_task, health_check, list_agents, list_tasks, run_agent,
    run_delegated, usage,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize LLM provider behind the shared gateway
    let provider = agent_runtime::provider_from_env(&config.provider)?;
    if provider.health_check().await.unwrap_or(false) {
        tracing::info!("✓ Connected to {}", provider.name());
    } else {
        tracing::warn!("⚠ {} not available - agent runs will fail", provider.name());
    }
    let gateway = LlmGateway::init(provider, RateLimitConfig::from_env(), PriceTable::with_defaults());

    // Task mailbox
    let mailbox = match &config.tasks_dir {
        Some(dir) => {
            let store = JsonFileTaskStore::open(dir)?;
            tracing::info!("Tasks stored in {}", store.path().display());
            Arc::new(TaskMailbox::new(Arc::new(store))?)
        }
        None => {
            tracing::warn!("TASKS_DIR not set - tasks are kept in memory only");
            Arc::new(TaskMailbox::in_memory())
        }
    };

    let state = AppState::assemble(
        Arc::clone(&gateway),
        mailbox,
        &config.team,
        EngineConfig::from_env(),
        AgentConfig::from_env(),
    )?;
    for member in &config.team {
        tracing::info!("  • {} ({})", member.name, member.role);
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("🚀 agent-team server running on http://{}", config.bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.shutdown();
    let summary = gateway.usage();
    tracing::info!(calls = summary.calls, cost = %summary.cost, "Server stopped");
    Ok(())
}

fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & budget
        .route("/health", get(health_check))
        .route("/api/usage", get(usage))
        // Agents
        .route("/api/agents", get(list_agents))
        .route("/api/agents/{name}", get(agent_snapshot))
        .route("/api/agents/{name}/run", post(run_agent))
        .route("/api/agents/{name}/delegated", post(run_delegated))
        // Mailbox
        .route("/api/tasks", post(assign_task))
        .route("/api/tasks/{agent}", get(list_tasks))
        .route("/api/tasks/{agent}/{id}/complete", post(complete_task))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::testing::ScriptedProvider;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(responses: &[&str]) -> (Router, AppState) {
        let provider = Arc::new(ScriptedProvider::new(responses.iter().copied()));
        let gateway = LlmGateway::with_provider(provider);
        let team = config::parse_team("Esther=Senior Auditor;Hillel=Staff Auditor").unwrap();
        let state = AppState::assemble(
            gateway,
            Arc::new(TaskMailbox::in_memory()),
            &team,
            EngineConfig::default(),
            AgentConfig::default(),
        )
        .unwrap();
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_run_agent_and_usage() {
        let (app, _) = app(&[r#"{"action": "goal_complete", "summary": "policies reviewed"}"#]);

        let (status, report) = send(
            &app,
            "POST",
            "/api/agents/Esther/run",
            Some(json!({"goal": "review IAM policies"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["status"], "complete");
        assert_eq!(report["completion"]["summary"], "policies reviewed");

        let (_, usage) = send(&app, "GET", "/api/usage", None).await;
        assert_eq!(usage["calls"], 1);

        let (_, snapshot) = send(&app, "GET", "/api/agents/Esther", None).await;
        assert_eq!(snapshot["actions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_answers_during_a_run() {
        let (app, state) = app(&[]);
        let _running = state.team.write().await;

        let (status, health) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            send(&app, "GET", "/health", None),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["agents"], 2);
        assert_eq!(health["run_in_progress"], true);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_404() {
        let (app, _) = app(&[]);
        let (status, body) = send(&app, "GET", "/api/agents/Nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "AGENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_mailbox_endpoints() {
        let (app, _) = app(&[]);

        let (status, task) = send(
            &app,
            "POST",
            "/api/tasks",
            Some(json!({
                "from": "Esther",
                "to": "Hillel",
                "description": "Pull the access review evidence",
                "priority": "high"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = task["id"].as_str().unwrap().to_string();

        let (_, tasks) = send(&app, "GET", "/api/tasks/Hillel", None).await;
        assert_eq!(tasks[0]["assigned_by"], "Esther");

        let (status, body) =
            send(&app, "POST", &format!("/api/tasks/Esther/{id}/complete"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "NOT_OWNER");

        let (status, done) =
            send(&app, "POST", &format!("/api/tasks/Hillel/{id}/complete"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["status"], "complete");
    }

    #[tokio::test]
    async fn test_delegated_run_completes_tasks() {
        let (app, state) = app(&[r#"{"action": "goal_complete", "summary": "evidence pulled"}"#]);
        state
            .mailbox
            .assign_task("Esther", "Hillel", "Pull evidence", agent_core::Priority::Medium)
            .unwrap();

        let (status, runs) = send(&app, "POST", "/api/agents/Hillel/delegated", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(runs.as_array().unwrap().len(), 1);
        assert_eq!(runs[0]["output"]["summary"], "evidence pulled");

        let tasks = state.mailbox.list_tasks("Hillel").unwrap();
        assert!(tasks[0].is_complete());
    }
}
