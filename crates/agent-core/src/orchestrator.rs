//! Orchestrator
//!
//! Drives a team of agents through phases. Each phase runs its agents to
//! completion, then a [`PhaseGate`] approves the outputs or sends some of the
//! agents back with the rejection reason as feedback. A phase ends only when
//! approved (or when the attempt budget runs out).
//!
//! Between runs the orchestrator delivers queued agent messages and can
//! drain an agent's delegated tasks from the shared [`TaskMailbox`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::agent::{Agent, AgentStatus, RunReport};
use crate::error::{AgentError, Result};
use crate::mailbox::{TaskId, TaskMailbox};

/// What to do when an agent run fails fatally
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop and surface the error
    #[default]
    Abort,
    /// Record the failure and carry on with the next agent
    Skip,
    /// Re-run the agent from scratch up to n more times, then abort
    Retry(usize),
}

impl std::str::FromStr for FailurePolicy {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => s
                .strip_prefix("retry:")
                .and_then(|n| n.parse().ok())
                .map(Self::Retry)
                .ok_or_else(|| {
                    AgentError::Config(format!(
                        "unknown failure policy '{s}' (expected abort, skip or retry:N)"
                    ))
                }),
        }
    }
}

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Runs of a phase before giving up on approval
    pub max_attempts: usize,

    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let max_attempts = std::env::var("PHASE_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let failure_policy = match std::env::var("PHASE_FAILURE_POLICY") {
            Ok(policy) => policy.parse()?,
            Err(_) => defaults.failure_policy,
        };
        Ok(Self {
            max_attempts: max_attempts.max(1),
            failure_policy,
        })
    }
}

/// One stage of a workflow: which agents work on what
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    /// (agent, goal) in run order
    pub assignments: Vec<(String, String)>,
    /// Run the agents concurrently instead of one after another
    #[serde(default)]
    pub concurrent: bool,
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assignments: Vec::new(),
            concurrent: false,
        }
    }

    #[must_use]
    pub fn assign(mut self, agent: impl Into<String>, goal: impl Into<String>) -> Self {
        self.assignments.push((agent.into(), goal.into()));
        self
    }

    #[must_use]
    pub const fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(agent, _)| agent.as_str())
    }
}

/// What one agent produced in a phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub agent: String,
    pub status: AgentStatus,
    pub summary: String,
    pub next_steps: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseOutput {
    fn from_run(agent: &Agent, run: std::result::Result<RunReport, AgentError>) -> Self {
        match run {
            Ok(report) => Self {
                agent: report.agent,
                status: report.status,
                summary: report.completion.summary,
                next_steps: report.completion.next_steps,
                error: None,
            },
            Err(err) => Self {
                agent: agent.name().to_string(),
                status: agent.status(),
                summary: String::new(),
                next_steps: String::new(),
                error: Some(err.to_string()),
            },
        }
    }
}

/// Gate decision on a phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GateVerdict {
    Approved,
    Rejected {
        reason: String,
        /// Agents that must redo their work; empty means everyone
        #[serde(default)]
        agents: Vec<String>,
    },
}

impl GateVerdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
            agents: Vec::new(),
        }
    }
}

/// Approval signal between phases
#[async_trait]
pub trait PhaseGate: Send + Sync {
    async fn review(&self, phase: &str, outputs: &[PhaseOutput]) -> Result<GateVerdict>;
}

/// Approves everything
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproveAll;

#[async_trait]
impl PhaseGate for ApproveAll {
    async fn review(&self, _phase: &str, _outputs: &[PhaseOutput]) -> Result<GateVerdict> {
        Ok(GateVerdict::Approved)
    }
}

/// Gate backed by a closure (scripted or human approval)
pub struct FnGate<F>(pub F);

#[async_trait]
impl<F> PhaseGate for FnGate<F>
where
    F: Fn(&str, &[PhaseOutput]) -> GateVerdict + Send + Sync,
{
    async fn review(&self, phase: &str, outputs: &[PhaseOutput]) -> Result<GateVerdict> {
        Ok((self.0)(phase, outputs))
    }
}

/// Gate run by a reviewer agent.
///
/// The reviewer gets the phase outputs as its goal and must finish with a
/// summary that starts with `APPROVED` or `REJECTED: <reason>`. An optional
/// line `Agents: A, B` names who has to redo their work.
pub struct ReviewerGate {
    reviewer: Mutex<Agent>,
}

impl ReviewerGate {
    pub fn new(reviewer: Agent) -> Self {
        Self {
            reviewer: Mutex::new(reviewer),
        }
    }

    pub async fn snapshot(&self) -> crate::agent::AgentSnapshot {
        self.reviewer.lock().await.snapshot()
    }

    fn review_goal(phase: &str, outputs: &[PhaseOutput]) -> String {
        let mut goal = format!("Review the results of the '{phase}' phase.\n");
        for output in outputs {
            goal.push_str(&format!("\n### {} ({})\n", output.agent, output.status));
            if let Some(error) = &output.error {
                goal.push_str(&format!("Failed: {error}\n"));
            } else {
                goal.push_str(&format!("Summary: {}\n", output.summary));
                if !output.next_steps.is_empty() {
                    goal.push_str(&format!("Next steps: {}\n", output.next_steps));
                }
            }
        }
        goal.push_str(
            "\nFinish with goal_complete. Start the summary with APPROVED if the work is \
             acceptable, or with REJECTED: followed by the reason. To send back only some \
             agents, add a line `Agents: name, name`.",
        );
        goal
    }

    /// Read a verdict out of the reviewer's summary
    pub fn parse_verdict(summary: &str) -> GateVerdict {
        let text = summary.trim();
        if text.to_ascii_uppercase().starts_with("APPROVED") {
            return GateVerdict::Approved;
        }

        let mut agents = Vec::new();
        let mut reason_lines = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.to_ascii_lowercase().starts_with("agents:") {
                agents.extend(
                    trimmed["agents:".len()..]
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(String::from),
                );
            } else {
                reason_lines.push(line);
            }
        }

        let reason = reason_lines.join("\n");
        let reason = match reason.get(.."REJECTED".len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case("REJECTED") => reason["REJECTED".len()..]
                .trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
                .trim_end()
                .to_string(),
            _ => format!("reviewer gave no clear verdict: {}", reason.trim()),
        };
        GateVerdict::Rejected { reason, agents }
    }
}

#[async_trait]
impl PhaseGate for ReviewerGate {
    async fn review(&self, phase: &str, outputs: &[PhaseOutput]) -> Result<GateVerdict> {
        let mut reviewer = self.reviewer.lock().await;
        reviewer.reset();
        reviewer.set_goal(Self::review_goal(phase, outputs))?;
        let report = reviewer.run_until_done().await?;
        let verdict = Self::parse_verdict(&report.completion.summary);
        tracing::info!(phase, reviewer = %reviewer.name(), ?verdict, "Phase reviewed");
        Ok(verdict)
    }
}

/// An approved phase
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: String,
    pub attempts: usize,
    pub outputs: Vec<PhaseOutput>,
}

/// Outcome of one delegated task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegatedRun {
    pub task_id: TaskId,
    pub description: String,
    pub output: PhaseOutput,
}

/// Runs a team of agents
pub struct Orchestrator {
    agents: BTreeMap<String, Agent>,
    mailbox: Arc<TaskMailbox>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(mailbox: Arc<TaskMailbox>, config: OrchestratorConfig) -> Self {
        Self {
            agents: BTreeMap::new(),
            mailbox,
            config,
        }
    }

    pub fn add_agent(&mut self, agent: Agent) -> Result<()> {
        if self.agents.contains_key(agent.name()) {
            return Err(AgentError::Config(format!(
                "agent '{}' is already part of the team",
                agent.name()
            )));
        }
        tracing::debug!(agent = %agent.name(), role = %agent.role(), "Agent joined team");
        self.agents.insert(agent.name().to_string(), agent);
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Result<&Agent> {
        self.agents
            .get(name)
            .ok_or_else(|| AgentError::AgentNotFound(name.to_string()))
    }

    pub fn agent_mut(&mut self, name: &str) -> Result<&mut Agent> {
        self.agents
            .get_mut(name)
            .ok_or_else(|| AgentError::AgentNotFound(name.to_string()))
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn mailbox(&self) -> &Arc<TaskMailbox> {
        &self.mailbox
    }

    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Give one agent a fresh goal and run it to the end
    pub async fn run_agent(&mut self, name: &str, goal: &str) -> Result<RunReport> {
        let agent = self.agent_mut(name)?;
        agent.reset();
        agent.set_goal(goal)?;
        let report = agent.run_until_done().await;
        self.route_messages();
        report
    }

    /// Run a phase until its gate approves it
    pub async fn run_phase(&mut self, phase: &Phase, gate: &dyn PhaseGate) -> Result<PhaseReport> {
        for name in phase.agents() {
            self.agent(name)?;
        }
        tracing::info!(phase = %phase.name, agents = phase.assignments.len(), "Phase started");

        let mut outputs: BTreeMap<String, PhaseOutput> = BTreeMap::new();
        let mut rerun: Vec<String> = phase.agents().map(String::from).collect();
        let mut feedback: Option<String> = None;
        let mut last_reason = String::new();

        for attempt in 1..=self.config.max_attempts.max(1) {
            let round: Vec<(String, String)> = phase
                .assignments
                .iter()
                .filter(|(agent, _)| rerun.contains(agent))
                .cloned()
                .collect();

            for output in self
                .run_round(&round, phase.concurrent, feedback.as_deref(), &outputs)
                .await?
            {
                outputs.insert(output.agent.clone(), output);
            }
            self.route_messages();

            let ordered: Vec<PhaseOutput> = phase
                .agents()
                .filter_map(|agent| outputs.get(agent).cloned())
                .collect();

            match gate.review(&phase.name, &ordered).await? {
                GateVerdict::Approved => {
                    tracing::info!(phase = %phase.name, attempt, "Phase approved");
                    return Ok(PhaseReport {
                        phase: phase.name.clone(),
                        attempts: attempt,
                        outputs: ordered,
                    });
                }
                GateVerdict::Rejected { reason, agents } => {
                    tracing::warn!(phase = %phase.name, attempt, %reason, ?agents, "Phase rejected");
                    let named: Vec<String> = agents
                        .into_iter()
                        .filter(|agent| phase.agents().any(|a| a == agent))
                        .collect();
                    rerun = if named.is_empty() {
                        phase.agents().map(String::from).collect()
                    } else {
                        named
                    };
                    feedback = Some(reason.clone());
                    last_reason = reason;
                }
            }
        }

        Err(AgentError::PhaseRejected {
            phase: phase.name.clone(),
            attempts: self.config.max_attempts.max(1),
            reason: last_reason,
        })
    }

    /// Run phases in order, each behind the gate
    pub async fn run_workflow(
        &mut self,
        phases: &[Phase],
        gate: &dyn PhaseGate,
    ) -> Result<Vec<PhaseReport>> {
        let mut reports = Vec::with_capacity(phases.len());
        for phase in phases {
            reports.push(self.run_phase(phase, gate).await?);
        }
        tracing::info!(phases = reports.len(), "Workflow complete");
        Ok(reports)
    }

    /// Work through an agent's not-started tasks in queue order. A task whose
    /// run fails goes back to not started for the next drain.
    pub async fn run_delegated(&mut self, name: &str) -> Result<Vec<DelegatedRun>> {
        self.agent(name)?;
        let policy = self.config.failure_policy;
        let mailbox = Arc::clone(&self.mailbox);
        let pending = mailbox.pending(name)?;
        let mut runs = Vec::with_capacity(pending.len());

        for task in pending {
            mailbox.start_task(name, &task.id)?;
            let goal = format!(
                "Task from {} (priority {}): {}",
                task.assigned_by, task.priority, task.description
            );

            let agent = self.agent_mut(name)?;
            let output = match run_with_policy(agent, &goal, None, policy).await {
                Ok(output) => output,
                Err(err) => {
                    if let Err(release) = mailbox.release_task(name, &task.id) {
                        tracing::warn!(task_id = %task.id, error = %release, "Could not release task");
                    }
                    return Err(err);
                }
            };
            if output.error.is_none() {
                mailbox.complete_task(name, &task.id)?;
            } else {
                mailbox.release_task(name, &task.id)?;
            }
            runs.push(DelegatedRun {
                task_id: task.id,
                description: task.description,
                output,
            });
            self.route_messages();
        }
        Ok(runs)
    }

    /// Deliver every queued agent message; returns how many were delivered
    pub fn route_messages(&mut self) -> usize {
        let messages: Vec<_> = self
            .agents
            .values_mut()
            .flat_map(Agent::take_outbox)
            .collect();

        let mut delivered = 0;
        for message in messages {
            match self.agents.get_mut(&message.to) {
                Some(recipient) => {
                    tracing::debug!(from = %message.from, to = %message.to, "Message delivered");
                    recipient.deliver(message);
                    delivered += 1;
                }
                None => {
                    tracing::warn!(from = %message.from, to = %message.to, "Dropping message to unknown agent");
                }
            }
        }
        delivered
    }

    async fn run_round(
        &mut self,
        round: &[(String, String)],
        concurrent: bool,
        feedback: Option<&str>,
        previous: &BTreeMap<String, PhaseOutput>,
    ) -> Result<Vec<PhaseOutput>> {
        let policy = self.config.failure_policy;
        let notes: BTreeMap<&str, Option<String>> = round
            .iter()
            .map(|(agent, _)| {
                let note = feedback.map(|reason| {
                    rejection_note(reason, previous.get(agent).map(|o| o.summary.as_str()))
                });
                (agent.as_str(), note)
            })
            .collect();

        if concurrent {
            let goals: BTreeMap<&str, &str> = round
                .iter()
                .map(|(agent, goal)| (agent.as_str(), goal.as_str()))
                .collect();
            let runs = self
                .agents
                .iter_mut()
                .filter_map(|(name, agent)| {
                    let goal = goals.get(name.as_str())?;
                    let note = notes.get(name.as_str()).cloned().flatten();
                    Some(async move { run_with_policy(agent, goal, note.as_deref(), policy).await })
                });
            join_all(runs).await.into_iter().collect()
        } else {
            let mut outputs = Vec::with_capacity(round.len());
            for (name, goal) in round {
                let note = notes.get(name.as_str()).cloned().flatten();
                let agent = self.agent_mut(name)?;
                outputs.push(run_with_policy(agent, goal, note.as_deref(), policy).await?);
            }
            Ok(outputs)
        }
    }
}

fn rejection_note(reason: &str, previous: Option<&str>) -> String {
    let mut note = format!("Your previous result for this phase was rejected: {reason}");
    if let Some(summary) = previous.filter(|s| !s.is_empty()) {
        note.push_str(&format!("\n\nYour previous summary:\n{summary}"));
    }
    note.push_str("\n\nAddress the feedback and complete the goal again.");
    note
}

/// Run one agent from a clean slate, applying the failure policy.
///
/// `Err` means the policy says abort; a skipped failure comes back as an
/// output carrying the error.
async fn run_with_policy(
    agent: &mut Agent,
    goal: &str,
    note: Option<&str>,
    policy: FailurePolicy,
) -> Result<PhaseOutput> {
    let mut retries = 0;
    loop {
        agent.reset();
        agent.set_goal(goal)?;
        if let Some(note) = note {
            agent.observe(note);
        }

        let run = agent.run_until_done().await;
        let err = match run {
            Ok(report) => return Ok(PhaseOutput::from_run(agent, Ok(report))),
            Err(err) => err,
        };

        match policy {
            FailurePolicy::Abort => return Err(err),
            FailurePolicy::Skip => {
                tracing::warn!(agent = %agent.name(), error = %err, "Agent failed, skipping");
                return Ok(PhaseOutput::from_run(agent, Err(err)));
            }
            FailurePolicy::Retry(max) if retries < max => {
                retries += 1;
                tracing::warn!(agent = %agent.name(), error = %err, retry = retries, "Agent failed, retrying");
            }
            FailurePolicy::Retry(_) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LlmGateway;
    use crate::mailbox::{Priority, TaskStatus};
    use crate::testing::ScriptedProvider;

    fn complete(summary: &str) -> String {
        format!(r#"{{"action": "goal_complete", "summary": "{summary}"}}"#)
    }

    fn agent(name: &str, responses: Vec<String>) -> Agent {
        Agent::builder(name)
            .gateway(LlmGateway::with_provider(Arc::new(ScriptedProvider::new(responses))))
            .build()
            .unwrap()
    }

    fn team(agents: Vec<Agent>, config: OrchestratorConfig) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(Arc::new(TaskMailbox::in_memory()), config);
        for agent in agents {
            orchestrator.add_agent(agent).unwrap();
        }
        orchestrator
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(ReviewerGate::parse_verdict("APPROVED - solid"), GateVerdict::Approved);
        assert_eq!(
            ReviewerGate::parse_verdict("REJECTED: missing MFA evidence\nAgents: Greg"),
            GateVerdict::Rejected {
                reason: "missing MFA evidence".into(),
                agents: vec!["Greg".into()],
            }
        );
        assert!(matches!(
            ReviewerGate::parse_verdict("looks fine"),
            GateVerdict::Rejected { reason, .. } if reason.contains("no clear verdict")
        ));
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("skip".parse::<FailurePolicy>().unwrap(), FailurePolicy::Skip);
        assert_eq!("Retry:2".parse::<FailurePolicy>().unwrap(), FailurePolicy::Retry(2));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_rejection_reruns_only_named_agent_with_feedback() {
        let mut orchestrator = team(
            vec![
                agent("Greg", vec![complete("tested 5 controls")]),
                agent("Esther", vec![complete("v1"), complete("v2")]),
            ],
            OrchestratorConfig::default(),
        );
        let phase = Phase::new("testing")
            .assign("Greg", "test controls")
            .assign("Esther", "write findings");

        let gate = FnGate(|_: &str, outputs: &[PhaseOutput]| {
            let esther = outputs.iter().find(|o| o.agent == "Esther").unwrap();
            if esther.summary == "v1" {
                GateVerdict::Rejected {
                    reason: "cite evidence".into(),
                    agents: vec!["Esther".into()],
                }
            } else {
                GateVerdict::Approved
            }
        });

        let report = orchestrator.run_phase(&phase, &gate).await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.outputs[0].summary, "tested 5 controls");
        assert_eq!(report.outputs[1].summary, "v2");

        let esther = orchestrator.agent("Esther").unwrap();
        let feedback = &esther.memory().snapshot()[1].content;
        assert!(feedback.contains("rejected: cite evidence"));
        assert!(feedback.contains("Your previous summary:\nv1"));
        // Greg ran once
        assert_eq!(orchestrator.agent("Greg").unwrap().history().len(), 1);
    }

    #[tokio::test]
    async fn test_phase_gives_up_after_max_attempts() {
        let responses = (0..3).map(|i| complete(&format!("draft {i}"))).collect();
        let mut orchestrator = team(vec![agent("A", responses)], OrchestratorConfig::default());
        let phase = Phase::new("plan").assign("A", "draft plan");
        let gate = FnGate(|_: &str, _: &[PhaseOutput]| GateVerdict::rejected("not yet"));

        let err = orchestrator.run_phase(&phase, &gate).await.unwrap_err();
        assert!(matches!(err, AgentError::PhaseRejected { attempts: 3, ref reason, .. } if reason == "not yet"));
    }

    #[tokio::test]
    async fn test_reviewer_gate_drives_approval() {
        let reviewer = agent(
            "Maurice",
            vec![complete("REJECTED: too vague"), complete("APPROVED")],
        );
        let gate = ReviewerGate::new(reviewer);
        let mut orchestrator = team(
            vec![agent("A", vec![complete("draft"), complete("detailed draft")])],
            OrchestratorConfig::default(),
        );

        let report = orchestrator
            .run_phase(&Phase::new("plan").assign("A", "plan"), &gate)
            .await
            .unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.outputs[0].summary, "detailed draft");

        let snapshot = gate.snapshot().await;
        assert!(snapshot.turns[0].content.contains("### A (complete)"));
    }

    #[tokio::test]
    async fn test_failure_policies() {
        let bad = || vec!["garbage".to_string(); 4];

        let mut abort = team(vec![agent("A", bad())], OrchestratorConfig::default());
        let phase = Phase::new("p").assign("A", "g");
        assert!(matches!(
            abort.run_phase(&phase, &ApproveAll).await,
            Err(AgentError::DecisionParse { .. })
        ));

        let skip_config = OrchestratorConfig {
            failure_policy: FailurePolicy::Skip,
            ..Default::default()
        };
        let mut skip = team(vec![agent("A", bad())], skip_config);
        let report = skip.run_phase(&phase, &ApproveAll).await.unwrap();
        assert_eq!(report.outputs[0].status, AgentStatus::Blocked);
        assert!(report.outputs[0].error.is_some());

        let retry_config = OrchestratorConfig {
            failure_policy: FailurePolicy::Retry(1),
            ..Default::default()
        };
        let mut responses = bad();
        responses.push(complete("second time lucky"));
        let mut retry = team(vec![agent("A", responses)], retry_config);
        let report = retry.run_phase(&phase, &ApproveAll).await.unwrap();
        assert_eq!(report.outputs[0].summary, "second time lucky");
    }

    #[tokio::test]
    async fn test_messages_routed_between_agents() {
        let mut orchestrator = team(
            vec![
                agent(
                    "A",
                    vec![
                        r#"{"action": "send_message", "to": "B", "message": "ready"}"#.into(),
                        r#"{"action": "send_message", "to": "Nobody", "message": "hello?"}"#.into(),
                        complete("sent"),
                    ],
                ),
                agent("B", vec![complete("got it")]),
            ],
            OrchestratorConfig::default(),
        );

        orchestrator.run_agent("A", "tell B").await.unwrap();
        orchestrator.run_agent("B", "wait for A").await.unwrap();

        let b = orchestrator.agent("B").unwrap();
        assert!(b.memory().snapshot().iter().any(|t| t.content == "Message from A: ready"));
    }

    #[tokio::test]
    async fn test_run_delegated_drains_queue() {
        let mut orchestrator = team(
            vec![agent("B", vec![complete("evidence collected"), complete("report drafted")])],
            OrchestratorConfig::default(),
        );
        let mailbox = Arc::clone(orchestrator.mailbox());
        mailbox.assign_task("A", "B", "collect evidence", Priority::High).unwrap();
        mailbox.assign_task("A", "B", "draft report", Priority::Low).unwrap();

        let runs = orchestrator.run_delegated("B").await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].description, "collect evidence");
        assert!(
            mailbox
                .list_tasks("B")
                .unwrap()
                .iter()
                .all(|t| t.status == TaskStatus::Complete)
        );

        let b = orchestrator.agent("B").unwrap();
        assert_eq!(
            b.goal(),
            Some("Task from A (priority low): draft report")
        );
    }

    #[tokio::test]
    async fn test_failed_delegated_run_is_picked_up_again() {
        let mut responses = vec!["garbage".to_string(); 4];
        responses.push(complete("evidence collected"));
        let config = OrchestratorConfig {
            failure_policy: FailurePolicy::Skip,
            ..Default::default()
        };
        let mut orchestrator = team(vec![agent("B", responses)], config);
        let mailbox = Arc::clone(orchestrator.mailbox());
        let task = mailbox.assign_task("A", "B", "collect evidence", Priority::High).unwrap();

        let runs = orchestrator.run_delegated("B").await.unwrap();
        assert!(runs[0].output.error.is_some());
        assert_eq!(mailbox.get_task(&task.id).unwrap().status, TaskStatus::NotStarted);

        let runs = orchestrator.run_delegated("B").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].output.error.is_none());
        assert!(mailbox.get_task(&task.id).unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_aborted_delegated_run_releases_task() {
        let mut orchestrator = team(
            vec![agent("B", vec!["garbage".to_string(); 4])],
            OrchestratorConfig::default(),
        );
        let mailbox = Arc::clone(orchestrator.mailbox());
        mailbox.assign_task("A", "B", "collect evidence", Priority::High).unwrap();

        assert!(matches!(
            orchestrator.run_delegated("B").await,
            Err(AgentError::DecisionParse { .. })
        ));
        assert_eq!(mailbox.pending("B").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_phase_runs_everyone() {
        let mut orchestrator = team(
            vec![agent("A", vec![complete("a")]), agent("B", vec![complete("b")])],
            OrchestratorConfig::default(),
        );
        let phase = Phase::new("p").assign("B", "g").assign("A", "g").concurrent();
        let report = orchestrator.run_phase(&phase, &ApproveAll).await.unwrap();
        let summaries: Vec<_> = report.outputs.iter().map(|o| o.summary.as_str()).collect();
        assert_eq!(summaries, ["b", "a"]);
    }
}
