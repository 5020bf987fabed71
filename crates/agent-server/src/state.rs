//! Application State

use std::sync::Arc;

use agent_core::{
    Agent, AgentConfig, EngineConfig, LlmGateway, Orchestrator, OrchestratorConfig,
    ReasoningEngine, Result, StaticKnowledge, TaskMailbox,
};
use agent_toolkit::TEAMWORK_KNOWLEDGE;
use tokio::sync::RwLock;

use crate::config::TeamMember;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Rate-limited, metered access to the LLM provider
    pub gateway: Arc<LlmGateway>,

    /// Task queues shared by the team and the HTTP API
    pub mailbox: Arc<TaskMailbox>,

    /// The team; runs take the write lock
    pub team: Arc<RwLock<Orchestrator>>,

    /// Team size, fixed once assembled
    pub agent_count: usize,
}

impl AppState {
    /// Build the team: every member shares one engine and the delegation
    /// tools
    pub fn assemble(
        gateway: Arc<LlmGateway>,
        mailbox: Arc<TaskMailbox>,
        members: &[TeamMember],
        engine_config: EngineConfig,
        agent_config: AgentConfig,
    ) -> Result<Self> {
        let engine = Arc::new(
            ReasoningEngine::new(Arc::clone(&gateway), engine_config)
                .with_knowledge(Arc::new(StaticKnowledge::new().shared(TEAMWORK_KNOWLEDGE))),
        );
        let tools = agent_toolkit::standard_registry(Arc::clone(&mailbox))?
            .subset(&["manage_tasks", "datetime"])?;

        let mut team = Orchestrator::new(Arc::clone(&mailbox), OrchestratorConfig::from_env()?);
        for member in members {
            let agent = Agent::builder(&member.name)
                .role(&member.role)
                .engine(Arc::clone(&engine))
                .tools(tools.clone())
                .config(agent_config.clone())
                .build()?;
            team.add_agent(agent)?;
        }

        Ok(Self {
            gateway,
            mailbox,
            agent_count: members.len(),
            team: Arc::new(RwLock::new(team)),
        })
    }
}
