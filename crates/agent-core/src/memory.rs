//! Agent Memory
//!
//! An append-only transcript of turns owned by one agent. The store itself
//! imposes no bound; a [`TrimPolicy`] decides what the model actually sees
//! when the transcript grows past a budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, Role, estimate_tokens};

/// Who produced a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Framing text (also used for trim summaries)
    System,
    /// The goal the agent is working on
    Goal,
    /// Raw model output
    Decision,
    /// Tool results, errors, feedback and messages from others
    Observation,
}

impl TurnRole {
    /// Chat role used when rendering the turn into a prompt
    pub const fn prompt_role(self) -> Role {
        match self {
            Self::System => Role::System,
            Self::Goal | Self::Observation => Role::User,
            Self::Decision => Role::Assistant,
        }
    }

    const fn is_pinned(self) -> bool {
        matches!(self, Self::System | Self::Goal)
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Goal => write!(f, "goal"),
            Self::Decision => write!(f, "decision"),
            Self::Observation => write!(f, "observation"),
        }
    }
}

/// One entry of an agent's transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn goal(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Goal, content)
    }

    pub fn decision(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Decision, content)
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Observation, content)
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.role.prompt_role(), self.content.clone())
    }

    fn estimate_tokens(&self) -> u32 {
        estimate_tokens(&self.content) + 4
    }
}

/// Ordered transcript of turns
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    turns: Vec<Turn>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns, oldest first
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Clear everything (between runs)
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Estimate total tokens in the transcript
    pub fn estimate_tokens(&self) -> u32 {
        self.turns
            .iter()
            .map(Turn::estimate_tokens)
            .fold(0, u32::saturating_add)
    }
}

/// Decides which turns the model sees
pub trait TrimPolicy: Send + Sync {
    fn trim(&self, turns: &[Turn]) -> Vec<Turn>;
}

/// Show the full transcript
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepAll;

impl TrimPolicy for KeepAll {
    fn trim(&self, turns: &[Turn]) -> Vec<Turn> {
        turns.to_vec()
    }
}

/// Keep system and goal turns permanently and fold the oldest remaining turns
/// into one summary turn once the transcript exceeds a turn or token budget.
#[derive(Clone, Copy, Debug)]
pub struct CompressOldest {
    /// Maximum number of turns shown, summary included
    pub max_turns: usize,
    /// Optional token budget for the shown turns
    pub max_tokens: Option<u32>,
    /// Characters kept from each compressed turn
    pub excerpt_chars: usize,
}

impl Default for CompressOldest {
    fn default() -> Self {
        Self {
            max_turns: 40,
            max_tokens: None,
            excerpt_chars: 120,
        }
    }
}

impl CompressOldest {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn over_budget(&self, turns: &[&Turn]) -> bool {
        self.max_tokens.is_some_and(|max| {
            turns
                .iter()
                .map(|t| t.estimate_tokens())
                .fold(0, u32::saturating_add)
                > max
        })
    }

    fn summarize(&self, folded: &[&Turn]) -> Turn {
        let mut summary = format!("Summary of {} earlier turn(s):", folded.len());
        for turn in folded {
            let line = turn.content.lines().next().unwrap_or_default();
            let excerpt: String = line.chars().take(self.excerpt_chars).collect();
            let ellipsis = if line.chars().count() > self.excerpt_chars || turn.content.lines().nth(1).is_some() {
                "..."
            } else {
                ""
            };
            summary.push_str(&format!("\n- {}: {excerpt}{ellipsis}", turn.role));
        }
        Turn::new(TurnRole::System, summary)
    }
}

impl TrimPolicy for CompressOldest {
    fn trim(&self, turns: &[Turn]) -> Vec<Turn> {
        let all: Vec<&Turn> = turns.iter().collect();
        if all.len() <= self.max_turns && !self.over_budget(&all) {
            return turns.to_vec();
        }

        let pinned: Vec<&Turn> = turns.iter().filter(|t| t.role.is_pinned()).collect();
        let rest: Vec<&Turn> = turns.iter().filter(|t| !t.role.is_pinned()).collect();

        // pinned + summary + recent must fit; always keep the latest turn
        let room = self.max_turns.saturating_sub(pinned.len() + 1).max(1);
        let mut split = rest.len().saturating_sub(room);
        while split + 1 < rest.len() {
            let shown: Vec<&Turn> = pinned.iter().chain(&rest[split..]).copied().collect();
            if !self.over_budget(&shown) {
                break;
            }
            split += 1;
        }

        if split == 0 {
            return turns.to_vec();
        }

        let mut trimmed: Vec<Turn> = pinned.into_iter().cloned().collect();
        trimmed.push(self.summarize(&rest[..split]));
        trimmed.extend(rest[split..].iter().map(|t| (*t).clone()));

        tracing::debug!(
            folded = split,
            shown = trimmed.len(),
            "Compressed transcript for prompt"
        );
        trimmed
    }
}
