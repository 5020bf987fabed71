//! Knowledge Provider
//!
//! Read-only reference text appended to an agent's system framing. Where the
//! text comes from (files, a database, nothing at all) is up to the caller.

use std::collections::HashMap;

/// Source of per-agent reference text
pub trait KnowledgeProvider: Send + Sync {
    /// Knowledge for the named agent, if any
    fn get(&self, agent: &str) -> Option<String>;
}

/// No knowledge for anyone
#[derive(Clone, Copy, Debug, Default)]
pub struct NoKnowledge;

impl KnowledgeProvider for NoKnowledge {
    fn get(&self, _agent: &str) -> Option<String> {
        None
    }
}

/// Knowledge held in memory, keyed by agent name, with optional text shared by
/// every agent
#[derive(Clone, Debug, Default)]
pub struct StaticKnowledge {
    shared: Option<String>,
    per_agent: HashMap<String, String>,
}

impl StaticKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared(mut self, text: impl Into<String>) -> Self {
        self.shared = Some(text.into());
        self
    }

    #[must_use]
    pub fn for_agent(mut self, agent: impl Into<String>, text: impl Into<String>) -> Self {
        self.per_agent.insert(agent.into(), text.into());
        self
    }
}

impl KnowledgeProvider for StaticKnowledge {
    fn get(&self, agent: &str) -> Option<String> {
        match (&self.shared, self.per_agent.get(agent)) {
            (None, None) => None,
            (Some(shared), None) => Some(shared.clone()),
            (None, Some(own)) => Some(own.clone()),
            (Some(shared), Some(own)) => Some(format!("{shared}\n\n{own}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_knowledge_combines_shared_and_own() {
        let knowledge = StaticKnowledge::new()
            .shared("Company: Acme")
            .for_agent("Maurice", "You review IAM");

        assert_eq!(
            knowledge.get("Maurice").as_deref(),
            Some("Company: Acme\n\nYou review IAM")
        );
        assert_eq!(knowledge.get("Greg").as_deref(), Some("Company: Acme"));
        assert_eq!(NoKnowledge.get("Greg"), None);
    }
}
