//! Agent profiles: HOW an agent runs
//!
//! A profile names the runner, the model and the limits every run created
//! from it inherits (tools, paths, sandboxing, approval).

use crate::error::ValidationError;
use crate::ids::ProfileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Runner implementation backing a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunnerType {
    #[serde(rename = "claude-code")]
    ClaudeCode,
    #[serde(rename = "codex")]
    Codex,
    #[serde(rename = "opencode")]
    OpenCode,
}

impl RunnerType {
    /// All supported runners
    pub const ALL: [RunnerType; 3] = [Self::ClaudeCode, Self::Codex, Self::OpenCode];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::Codex => "codex",
            Self::OpenCode => "opencode",
        }
    }
}

impl fmt::Display for RunnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new("runnerType", format!("unknown runner type '{s}'"))
                    .with_hint("expected one of: claude-code, codex, opencode")
            })
    }
}

/// Reusable agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: ProfileId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub runner_type: RunnerType,
    #[serde(default)]
    pub model: String,
    /// Maximum agent turns; zero means runner default
    pub max_turns: u32,
    /// Wall-time bound for a run, in seconds
    pub timeout_secs: u64,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_tools: Vec<String>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub denied_paths: Vec<String>,
    pub requires_sandbox: bool,
    pub requires_approval: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentProfile {
    /// Build a profile from a (validated) create request
    #[must_use]
    pub fn from_request(id: ProfileId, request: CreateProfileRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: request.name,
            description: request.description,
            runner_type: request.runner_type,
            model: request.model,
            max_turns: request.max_turns,
            timeout_secs: request.timeout_secs,
            allowed_tools: request.allowed_tools,
            denied_tools: request.denied_tools,
            allowed_paths: request.allowed_paths,
            denied_paths: request.denied_paths,
            requires_sandbox: request.requires_sandbox,
            requires_approval: request.requires_approval,
            created_at: now,
            updated_at: now,
        }
    }

    /// Wall-time bound as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Apply a partial update; fields left `None` are kept
    pub fn apply_update(&mut self, update: UpdateProfileRequest, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(runner_type) = update.runner_type {
            self.runner_type = runner_type;
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(max_turns) = update.max_turns {
            self.max_turns = max_turns;
        }
        if let Some(timeout_secs) = update.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(tools) = update.allowed_tools {
            self.allowed_tools = tools;
        }
        if let Some(tools) = update.denied_tools {
            self.denied_tools = tools;
        }
        if let Some(paths) = update.allowed_paths {
            self.allowed_paths = paths;
        }
        if let Some(paths) = update.denied_paths {
            self.denied_paths = paths;
        }
        if let Some(flag) = update.requires_sandbox {
            self.requires_sandbox = flag;
        }
        if let Some(flag) = update.requires_approval {
            self.requires_approval = flag;
        }
        self.updated_at = now;
    }
}

/// Request to create a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub runner_type: RunnerType,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub max_turns: u32,
    pub timeout_secs: u64,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_tools: Vec<String>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub denied_paths: Vec<String>,
    #[serde(default)]
    pub requires_sandbox: bool,
    #[serde(default)]
    pub requires_approval: bool,
}

impl CreateProfileRequest {
    /// Minimal request with defaults for everything optional
    #[must_use]
    pub fn new(name: impl Into<String>, runner_type: RunnerType, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            runner_type,
            model: String::new(),
            max_turns: 0,
            timeout_secs,
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
            allowed_paths: Vec::new(),
            denied_paths: Vec::new(),
            requires_sandbox: false,
            requires_approval: false,
        }
    }

    /// Require a sandbox for runs
    #[inline]
    #[must_use]
    pub fn sandboxed(mut self) -> Self {
        self.requires_sandbox = true;
        self
    }

    /// Require human approval for runs that produce changes
    #[inline]
    #[must_use]
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// With model
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Partial profile update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub runner_type: Option<RunnerType>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub allowed_tools: Option<Vec<String>>,
    pub denied_tools: Option<Vec<String>>,
    pub allowed_paths: Option<Vec<String>>,
    pub denied_paths: Option<Vec<String>>,
    pub requires_sandbox: Option<bool>,
    pub requires_approval: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunnerType::ClaudeCode).unwrap(),
            "\"claude-code\""
        );
        assert_eq!("opencode".parse::<RunnerType>().unwrap(), RunnerType::OpenCode);
        assert!("gpt-cli".parse::<RunnerType>().is_err());
    }

    #[test]
    fn update_keeps_unset_fields() {
        let now = Utc::now();
        let mut profile = AgentProfile::from_request(
            ProfileId::new_v4(),
            CreateProfileRequest::new("reviewer", RunnerType::Codex, 60).with_model("o3"),
            now,
        );
        profile.apply_update(
            UpdateProfileRequest {
                timeout_secs: Some(120),
                ..Default::default()
            },
            now,
        );
        assert_eq!(profile.timeout(), Duration::from_secs(120));
        assert_eq!(profile.model, "o3");
        assert_eq!(profile.name, "reviewer");
    }
}
