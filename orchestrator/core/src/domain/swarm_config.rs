// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Swarm Configuration Types
//
// Defines the configuration schema for a Mysis swarm host, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - LLM provider configuration with model alias mapping
// - Agent turn settings, nudge policy and event bus sizing
// - Agents to create at startup

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "SwarmConfig";

/// Top-level Kubernetes-style swarm configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SwarmConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: SwarmConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Swarm configuration body (content under `spec:`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfigSpec {
    /// Upper bound on registered agents
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,

    #[serde(default)]
    pub agent: AgentRuntimeConfig,

    #[serde(default)]
    pub nudge: NudgeConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    /// Agents created at startup when no agent with the same name exists
    #[serde(default)]
    pub agents: Vec<AgentSpec>,

    /// Game account usernames leased to agents while they run
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// Provider type
    #[serde(rename = "type")]
    pub provider_type: String, // "ollama", "openai", "openai-compatible"

    /// API endpoint URL
    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Available models on this provider
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Model alias used in agent specs (e.g., "default", "fast", "smart")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LLMSelection {
    /// Provider used when an agent spec names none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
}

/// Per-turn settings shared by every agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRuntimeConfig {
    /// Number of recent records sent to the provider (system prompt excluded)
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Upper bound on a single provider call
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_seconds: u64,

    /// How long stop waits for an in-flight turn before giving up on it
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,

    /// Keep paired tool calls and results in the provider window
    #[serde(default)]
    pub include_tool_history: bool,
}

impl AgentRuntimeConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_seconds)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            turn_timeout_seconds: default_turn_timeout(),
            stop_timeout_seconds: default_stop_timeout(),
            include_tool_history: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NudgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often the scheduler looks at the swarm
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    /// Quiet time before a Running agent is nudged
    #[serde(default = "default_nudge_interval")]
    pub interval_seconds: u64,

    /// Quiet time before an Idle agent is nudged back to life
    #[serde(default = "default_idle_interval")]
    pub idle_interval_seconds: u64,

    /// Consecutive unanswered nudges before a Running agent goes Idle
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl NudgeConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_seconds)
    }
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: default_check_interval(),
            interval_seconds: default_nudge_interval(),
            idle_interval_seconds: default_idle_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventBusConfig {
    /// Per-subscriber queue capacity
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub name: String,

    /// Provider name; falls back to llm_selection.default_provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model alias or identifier; empty selects the provider's first model
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub system_prompt: String,

    #[serde(default)]
    pub autostart: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_agents() -> usize {
    16
}

fn default_context_window() -> usize {
    20
}

fn default_turn_timeout() -> u64 {
    60
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_check_interval() -> u64 {
    5
}

fn default_nudge_interval() -> u64 {
    30
}

fn default_idle_interval() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_buffer_size() -> usize {
    256
}

impl Default for SwarmConfigSpec {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            llm_providers: vec![],
            llm_selection: LLMSelection::default(),
            agent: AgentRuntimeConfig::default(),
            nudge: NudgeConfig::default(),
            event_bus: EventBusConfig::default(),
            agents: vec![],
            accounts: vec![],
        }
    }
}

impl Default for SwarmConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "mysis-swarm".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: SwarmConfigSpec::default(),
        }
    }
}

impl SwarmConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Well-known locations, highest precedence first. An explicit `--config`
    /// path is handled by [`Self::load_or_default`] before any of these.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(4);
        if let Ok(path) = std::env::var("MYSIS_CONFIG_PATH") {
            candidates.push(PathBuf::from(path));
        }
        candidates.push(PathBuf::from("./mysis-config.yaml"));
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".mysis").join("config.yaml"));
        }
        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/mysis/config.yaml"));
        #[cfg(windows)]
        candidates.push(PathBuf::from("C:\\ProgramData\\Mysis\\config.yaml"));
        candidates
    }

    /// First existing file among the well-known locations
    pub fn discover_config() -> Option<PathBuf> {
        Self::candidate_paths().into_iter().find(|path| path.exists())
    }

    /// Load from `cli_path` (which must exist), else the first discovered
    /// file, else built-in defaults. Environment overrides apply to all three.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut manifest = match cli_path.or_else(Self::discover_config) {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading swarm configuration");
                Self::from_yaml_file(&path).with_context(|| {
                    format!("Failed to read swarm configuration at {}", path.display())
                })?
            }
            None => {
                tracing::warn!("No swarm configuration found, running with defaults");
                Self::default()
            }
        };
        manifest.apply_env_overrides();
        Ok(manifest)
    }

    /// `MYSIS_MAX_AGENTS` and `MYSIS_NUDGE_ENABLED`; unparsable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("MYSIS_MAX_AGENTS") {
            match raw.parse::<usize>() {
                Ok(max) => {
                    tracing::info!(max_agents = max, "MYSIS_MAX_AGENTS override");
                    self.spec.max_agents = max;
                }
                Err(_) => tracing::warn!(value = %raw, "Ignoring non-numeric MYSIS_MAX_AGENTS"),
            }
        }

        if let Ok(raw) = std::env::var("MYSIS_NUDGE_ENABLED") {
            match parse_flag(&raw) {
                Some(enabled) => self.spec.nudge.enabled = enabled,
                None => tracing::warn!(value = %raw, "Ignoring non-boolean MYSIS_NUDGE_ENABLED"),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            bail!("apiVersion is '{}', expected '{}'", self.api_version, API_VERSION);
        }
        if self.kind != KIND {
            bail!("kind is '{}', expected '{}'", self.kind, KIND);
        }
        if self.metadata.name.is_empty() {
            bail!("metadata.name is required");
        }
        self.spec.validate()
    }
}

impl SwarmConfigSpec {
    fn validate(&self) -> anyhow::Result<()> {
        let positive = [
            ("spec.max_agents", self.max_agents as u64),
            ("spec.agent.context_window", self.agent.context_window as u64),
            ("spec.agent.turn_timeout_seconds", self.agent.turn_timeout_seconds),
            ("spec.event_bus.buffer_size", self.event_bus.buffer_size as u64),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            bail!("{} must be at least 1", field);
        }
        if self.nudge.enabled && self.nudge.check_interval_seconds == 0 {
            bail!("spec.nudge.check_interval_seconds must be at least 1 while nudging is enabled");
        }

        self.validate_providers()?;
        self.validate_agents()
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        for (index, provider) in self.llm_providers.iter().enumerate() {
            if provider.name.is_empty() {
                bail!("spec.llm_providers[{}] has no name", index);
            }
            if provider.endpoint.is_empty() {
                bail!("Provider '{}' has no endpoint", provider.name);
            }
            if provider.models.is_empty() {
                bail!("Provider '{}' declares no models", provider.name);
            }
            if let Some(model) = provider
                .models
                .iter()
                .find(|m| m.alias.is_empty() || m.model.is_empty())
            {
                bail!(
                    "Provider '{}' has a model entry missing its alias or identifier (alias '{}')",
                    provider.name,
                    model.alias
                );
            }
        }

        if let Some(name) = &self.llm_selection.default_provider {
            if self.provider(name).is_none() {
                bail!("Default provider '{}' is not among spec.llm_providers", name);
            }
        }
        Ok(())
    }

    fn validate_agents(&self) -> anyhow::Result<()> {
        if self.agents.len() > self.max_agents {
            bail!(
                "spec.agents lists {} agents but max_agents is {}",
                self.agents.len(),
                self.max_agents
            );
        }

        for agent in &self.agents {
            if agent.name.is_empty() {
                bail!("Every entry in spec.agents needs a name");
            }
            match agent.provider.as_ref().or(self.llm_selection.default_provider.as_ref()) {
                Some(name) if self.provider(name).is_some() => {}
                Some(name) => bail!("Agent '{}' references unknown provider '{}'", agent.name, name),
                None => bail!(
                    "Agent '{}' names no provider and no default provider is configured",
                    agent.name
                ),
            }
        }
        Ok(())
    }

    fn provider(&self, name: &str) -> Option<&LLMProviderConfig> {
        self.llm_providers.iter().find(|p| p.name == name)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: SwarmConfig
metadata:
  name: belt-miners
spec:
  max_agents: 4
  llm_providers:
    - name: local
      type: ollama
      endpoint: http://localhost:11434
      models:
        - alias: default
          model: llama3.2
  llm_selection:
    default_provider: local
  agent:
    context_window: 12
    include_tool_history: true
  nudge:
    interval_seconds: 15
    max_attempts: 2
  agents:
    - name: miner-1
      system_prompt: You mine asteroids.
      autostart: true
"#;

    #[test]
    fn test_default_manifest() {
        let manifest = SwarmConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.agent.context_window, 20);
        assert_eq!(manifest.spec.agent.turn_timeout(), Duration::from_secs(60));
        assert!(manifest.spec.llm_providers.is_empty());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let manifest = SwarmConfigManifest::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(manifest.metadata.name, "belt-miners");
        assert_eq!(manifest.spec.max_agents, 4);
        assert_eq!(manifest.spec.agent.context_window, 12);
        assert!(manifest.spec.agent.include_tool_history);
        // Unset fields keep their defaults
        assert_eq!(manifest.spec.agent.turn_timeout_seconds, 60);
        assert_eq!(manifest.spec.nudge.interval_seconds, 15);
        assert_eq!(manifest.spec.nudge.idle_interval_seconds, 300);
        assert_eq!(manifest.spec.agents.len(), 1);
        assert!(manifest.spec.agents[0].autostart);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let manifest = SwarmConfigManifest::from_yaml_file(file.path()).unwrap();
        assert_eq!(manifest.spec.llm_providers[0].name, "local");
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = SwarmConfigManifest::load_or_default(Some(PathBuf::from(
            "/nonexistent/mysis-config.yaml",
        )));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let mut manifest = SwarmConfigManifest::default();
        manifest.kind = "AgentManifest".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_agent_provider() {
        let mut manifest = SwarmConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.spec.agents[0].provider = Some("missing".to_string());
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_validate_rejects_too_many_agents() {
        let mut manifest = SwarmConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.spec.max_agents = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
