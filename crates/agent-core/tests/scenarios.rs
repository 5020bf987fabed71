//! End-to-end agent scenarios driven by a scripted provider.

use std::sync::Arc;
use std::time::Duration;

use agent_core::testing::ScriptedProvider;
use agent_core::tool::{ParameterSchema, ToolSchema};
use agent_core::{
    ActionKind, Agent, AgentError, AgentStatus, Decision, EngineConfig, LlmGateway, Priority,
    RateLimitConfig, Result, TaskMailbox, TaskStatus, Tool, ToolCall, ToolResult, TurnRole,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".into(),
            description: "Return the input unchanged".into(),
            parameters: vec![ParameterSchema::required("x", "string", "Text to echo")],
            category: None,
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        Ok(ToolResult::json("echo", json!(call.str_arg("x").unwrap_or_default())))
    }
}

fn echo_agent(provider: Arc<ScriptedProvider>, max_retries: usize) -> Agent {
    Agent::builder("Summarizer")
        .role("summarizer")
        .gateway(LlmGateway::with_provider(provider))
        .engine_config(EngineConfig::default().with_max_retries(max_retries))
        .tool(EchoTool)
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn echo_then_complete() {
    let provider = Arc::new(ScriptedProvider::new([
        r#"{"action": "use_tool", "tool": "echo", "parameters": {"x": "hello"}, "reasoning": "read the input"}"#,
        r#"{"action": "goal_complete", "summary": "hello", "next_steps": ""}"#,
    ]));
    let mut agent = echo_agent(Arc::clone(&provider), 3);

    agent.set_goal("summarize input X").unwrap();
    let report = agent.run_until_done().await.unwrap();

    assert_eq!(agent.status(), AgentStatus::Complete);
    assert_eq!(report.completion.summary, "hello");

    let actions = agent.history().entries();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].kind, ActionKind::ToolCall);
    assert_eq!(actions[1].kind, ActionKind::GoalComplete);

    let roles: Vec<TurnRole> = agent.memory().snapshot().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        [TurnRole::Goal, TurnRole::Decision, TurnRole::Observation, TurnRole::Decision]
    );
    assert!(
        agent.memory().snapshot()[2]
            .content
            .starts_with("Tool 'echo' executed successfully.")
    );

    // the tool schema reached the model
    assert!(provider.prompts()[0][0].content.contains("### echo"));
}

#[tokio::test]
async fn malformed_output_exhausts_retries() {
    let provider = Arc::new(ScriptedProvider::new([
        "not json",
        r#"{"action": "fly"}"#,
        r#"{"action": "use_tool", "tool": "rm", "parameters": {}}"#,
        r#"{"action": "goal_complete", "summary": "x", "extra": true}"#,
    ]));
    let mut agent = echo_agent(Arc::clone(&provider), 3);
    agent.set_goal("summarize input X").unwrap();

    let err = agent.run_until_done().await.unwrap_err();
    assert!(matches!(err, AgentError::DecisionParse { attempts: 4, .. }));
    assert_eq!(agent.status(), AgentStatus::Blocked);
    assert!(agent.history().is_empty());
    assert_eq!(provider.remaining(), 0);
}

#[tokio::test]
async fn invalid_parameters_are_recoverable() {
    let provider = Arc::new(ScriptedProvider::new([
        r#"{"action": "use_tool", "tool": "echo", "parameters": {"y": 1}}"#,
        r#"{"action": "use_tool", "tool": "echo", "parameters": {"x": "fixed"}}"#,
        r#"{"action": "goal_complete", "summary": "fixed"}"#,
    ]));
    let mut agent = echo_agent(provider, 3);
    agent.set_goal("echo something").unwrap();
    agent.run_until_done().await.unwrap();

    let actions = agent.history().entries();
    assert!(actions[0].is_error());
    assert!(!actions[1].is_error());
    let observation = &agent.memory().snapshot()[2].content;
    assert!(observation.contains("`x`: missing required parameter"));
    assert!(observation.contains("`y`: unknown parameter"));
}

#[test]
fn mailbox_delegation() {
    let mailbox = TaskMailbox::in_memory();
    let task = mailbox
        .assign_task("A", "B", "collect evidence", Priority::High)
        .unwrap();

    let tasks = mailbox.list_tasks("B").unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].assignee, "B");
    assert_eq!(tasks[0].assigned_by, "A");
    assert_eq!(tasks[0].status, TaskStatus::NotStarted);

    let done = mailbox.complete_task("B", &task.id).unwrap();
    assert_eq!(done.status, TaskStatus::Complete);

    let err = mailbox.complete_task("A", &task.id).unwrap_err();
    assert!(matches!(err, AgentError::NotOwner { .. }));
}

#[tokio::test(start_paused = true)]
async fn shared_rate_limit_delays_extra_call() {
    let complete = r#"{"action": "goal_complete", "summary": "ok"}"#;
    let provider = Arc::new(ScriptedProvider::new([complete; 3]));
    let gateway = LlmGateway::init(
        provider,
        RateLimitConfig {
            max_calls: 2,
            window: Duration::from_secs(60),
            acquire_timeout: None,
        },
        agent_core::PriceTable::default(),
    );

    let mut agents: Vec<Agent> = ["A", "B", "C"]
        .into_iter()
        .map(|name| {
            Agent::builder(name)
                .gateway(Arc::clone(&gateway))
                .build()
                .unwrap()
        })
        .collect();

    let start = tokio::time::Instant::now();
    for agent in &mut agents[..2] {
        agent.set_goal("quick").unwrap();
        agent.run_until_done().await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(1));

    let third = &mut agents[2];
    third.set_goal("quick").unwrap();
    let pending = tokio::time::timeout(Duration::from_secs(30), third.run_until_done()).await;
    assert!(pending.is_err(), "third call must wait for the window");

    // the timed-out attempt left the agent working; the permit is free again later
    third.run_until_done().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert_eq!(gateway.usage().calls, 3);
}

#[tokio::test]
async fn memory_and_history_only_grow() {
    let provider = Arc::new(ScriptedProvider::new([
        r#"{"action": "document", "content": "first note"}"#,
        "oops",
        r#"{"action": "use_tool", "tool": "echo", "parameters": {"x": "a"}}"#,
        r#"{"action": "send_message", "to": "B", "message": "fyi"}"#,
        r#"{"action": "goal_complete", "summary": "done"}"#,
    ]));
    let mut agent = echo_agent(provider, 3);
    agent.set_goal("take notes").unwrap();

    let mut turns = agent.memory().len();
    let mut actions = agent.history().len();
    while agent.status() == AgentStatus::Working {
        agent.step().await.unwrap();
        assert!(agent.memory().len() >= turns);
        assert!(agent.history().len() >= actions);
        turns = agent.memory().len();
        actions = agent.history().len();
    }
    assert_eq!(agent.status(), AgentStatus::Complete);
    assert_eq!(actions, 4);
}

#[test]
fn every_decision_survives_serialization() {
    let mut parameters = Map::new();
    parameters.insert("x".into(), Value::from("hello"));
    let decisions = [
        Decision::UseTool {
            tool: "echo".into(),
            parameters,
            reasoning: "check".into(),
        },
        Decision::Document {
            content: "notes".into(),
            reasoning: "record".into(),
        },
        Decision::SendMessage {
            to: "B".into(),
            content: "hi".into(),
        },
        Decision::GoalComplete {
            summary: "done".into(),
            next_steps: "none".into(),
        },
    ];
    for decision in decisions {
        assert_eq!(Decision::parse(&decision.to_json()).unwrap(), decision);
    }
}
