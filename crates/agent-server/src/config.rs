//! Server Configuration

use std::path::PathBuf;

use agent_core::{AgentError, Result};

const DEFAULT_TEAM: &str = "Maurice=Audit Manager;Esther=Senior Auditor;Hillel=Staff Auditor";

/// One agent of the served team
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamMember {
    pub name: String,
    pub role: String,
}

/// Everything the binary reads from the environment
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// `ollama` or `openai`
    pub provider: String,

    /// Directory for the task file; `None` keeps tasks in memory
    pub tasks_dir: Option<PathBuf>,

    pub team: Vec<TeamMember>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            provider: std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".into()),
            tasks_dir: std::env::var("TASKS_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            team: parse_team(
                &std::env::var("AGENT_TEAM").unwrap_or_else(|_| DEFAULT_TEAM.into()),
            )?,
        })
    }
}

/// Parse `Name=Role;Name=Role`
pub fn parse_team(raw: &str) -> Result<Vec<TeamMember>> {
    let mut team: Vec<TeamMember> = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, role) = entry.split_once('=').ok_or_else(|| {
            AgentError::Config(format!("AGENT_TEAM entry '{entry}' is not Name=Role"))
        })?;
        let (name, role) = (name.trim(), role.trim());
        if name.is_empty() || role.is_empty() {
            return Err(AgentError::Config(format!(
                "AGENT_TEAM entry '{entry}' has an empty name or role"
            )));
        }
        if team.iter().any(|m| m.name == name) {
            return Err(AgentError::Config(format!("agent '{name}' listed twice in AGENT_TEAM")));
        }
        team.push(TeamMember {
            name: name.into(),
            role: role.into(),
        });
    }

    if team.is_empty() {
        return Err(AgentError::Config("AGENT_TEAM names no agents".into()));
    }
    Ok(team)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_team() {
        let team = parse_team(DEFAULT_TEAM).unwrap();
        assert_eq!(team.len(), 3);
        assert_eq!(team[0].name, "Maurice");
        assert_eq!(team[2].role, "Staff Auditor");
    }

    #[test]
    fn test_bad_team_entries() {
        assert!(parse_team("Maurice").is_err());
        assert!(parse_team("=Auditor").is_err());
        assert!(parse_team("A=x; A=y").is_err());
        assert!(parse_team(" ; ").is_err());
    }
}
