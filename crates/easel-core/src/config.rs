//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Easel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<AgentsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Language-model providers ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<ProviderConfig>>,
}

/// Configuration for a single chat-model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

// --- Agents ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<AgentDefaults>,

    /// Agent the swarm starts with when the history names none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,

    /// Swarm agent definitions. The built-in planner/designer pair is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm: Option<Vec<AgentConfig>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_iterations: Option<u32>,
}

/// One swarm agent: its tools (by name) and outgoing hand-off edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub handoffs: Vec<HandoffConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// --- Image generation ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub providers: Vec<ImageProviderConfig>,

    /// Provider and model used when the caller does not select one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ImageModelSelection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollConfig>,
}

/// Credentials and endpoint for one image-generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageProviderConfig {
    /// Registry key: "replicate", "wavespeed", or "openai".
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Overrides the global poll policy for this provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollConfig>,
}

impl ImageProviderConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// The image provider and model chosen for a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageModelSelection {
    pub provider: String,
    pub model: String,
}

/// Fixed-interval polling policy for asynchronous providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_poll_attempts(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_attempts() -> u32 {
    60
}

// --- Storage & logging ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for messages, canvases and files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "easel_imagegen=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::EaselError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        json5::from_str(&substituted).map_err(|e| crate::error::EaselError::Config(e.to_string()))
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    fn agent_defaults(&self) -> Option<&AgentDefaults> {
        self.agents.as_ref().and_then(|a| a.defaults.as_ref())
    }

    /// Chat model: agent default, then the first provider's default.
    pub fn default_model(&self) -> String {
        self.agent_defaults()
            .and_then(|d| d.model.clone())
            .or_else(|| self.first_provider().and_then(|p| p.default_model.clone()))
            .unwrap_or_else(|| "gpt-4o-mini".to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.agent_defaults()
            .and_then(|d| d.max_tokens)
            .unwrap_or(4096)
    }

    pub fn max_tool_iterations(&self) -> u32 {
        self.agent_defaults()
            .and_then(|d| d.max_tool_iterations)
            .unwrap_or(25)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.agent_defaults()
            .and_then(|d| d.temperature)
            .or(Some(0.0))
    }

    /// Find a chat provider config by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.models
            .as_ref()
            .and_then(|m| m.providers.as_ref())
            .and_then(|p| p.iter().find(|pc| pc.id == id))
    }

    pub fn first_provider(&self) -> Option<&ProviderConfig> {
        self.models
            .as_ref()
            .and_then(|m| m.providers.as_ref())
            .and_then(|p| p.first())
    }

    pub fn image_provider(&self, id: &str) -> Option<&ImageProviderConfig> {
        self.image
            .as_ref()
            .and_then(|i| i.providers.iter().find(|p| p.id == id))
    }

    pub fn default_image_model(&self) -> Option<&ImageModelSelection> {
        self.image.as_ref().and_then(|i| i.default.as_ref())
    }

    /// Poll policy for a provider: its own override, then the global policy.
    pub fn poll_policy(&self, provider_id: &str) -> PollConfig {
        self.image_provider(provider_id)
            .and_then(|p| p.poll)
            .or_else(|| self.image.as_ref().and_then(|i| i.poll))
            .unwrap_or_default()
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.dir.as_ref())
            .map(|d| PathBuf::from(shellexpand::tilde(d).as_ref()))
            .unwrap_or_else(|| data_dir().join("data"))
    }

    pub fn swarm_agents(&self) -> Option<&[AgentConfig]> {
        self.agents.as_ref().and_then(|a| a.swarm.as_deref())
    }

    pub fn default_agent(&self) -> Option<&str> {
        self.agents.as_ref().and_then(|a| a.default_agent.as_deref())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(providers) = self.models.as_ref().and_then(|m| m.providers.as_ref()) {
            for p in providers {
                if p.id != "ollama" && p.resolve_api_key().is_none() {
                    warnings.push(format!("Provider '{}' has no API key configured", p.id));
                }
            }
        }

        if let Some(image) = &self.image {
            for p in &image.providers {
                if p.resolve_api_key().is_none() {
                    warnings.push(format!("Image provider '{}' has no API key configured", p.id));
                }
            }
            let polls = image
                .poll
                .iter()
                .chain(image.providers.iter().filter_map(|p| p.poll.as_ref()));
            for poll in polls {
                if poll.max_attempts == 0 {
                    errors.push("Image poll max_attempts must be at least 1".to_string());
                }
            }
            if let Some(selection) = &image.default {
                if self.image_provider(&selection.provider).is_none() {
                    warnings.push(format!(
                        "Default image provider '{}' is not configured",
                        selection.provider
                    ));
                }
            }
        }

        if let Some(agents) = self.swarm_agents() {
            let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
            for agent in agents {
                for handoff in &agent.handoffs {
                    if !names.contains(&handoff.agent_name.as_str()) {
                        errors.push(format!(
                            "Agent '{}' hands off to unknown agent '{}'",
                            agent.name, handoff.agent_name
                        ));
                    }
                }
            }
            if let Some(default) = self.default_agent() {
                if !names.contains(&default) {
                    errors.push(format!("Default agent '{default}' is not defined"));
                }
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Easel data: `~/.easel/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".easel")
}
