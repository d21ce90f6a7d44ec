use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use workforce_core::{AgentKind, AgentProfile, ModelParameters, OrchestratorConfig, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkforceConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub model: ModelParameters,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub fixtures: FixturesConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// Per-agent overrides of the built-in profiles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub leasing: Option<AgentProfile>,
    #[serde(default)]
    pub marketing: Option<AgentProfile>,
    #[serde(default)]
    pub property: Option<AgentProfile>,
}

impl AgentsConfig {
    pub fn profiles(&self) -> Vec<(AgentKind, AgentProfile)> {
        [
            (AgentKind::Leasing, &self.leasing),
            (AgentKind::Marketing, &self.marketing),
            (AgentKind::Property, &self.property),
        ]
        .into_iter()
        .filter_map(|(kind, profile)| profile.clone().map(|p| (kind, p)))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub name: ProviderKind,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Defaults to the provider's public endpoint
    #[serde(default)]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Openai
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_call_timeout_secs() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tours_per_slot")]
    pub max_tours_per_slot: usize,
    #[serde(default = "default_tour_horizon_days")]
    pub tour_horizon_days: i64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_max_tours_per_slot() -> usize {
    3
}
fn default_tour_horizon_days() -> i64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            max_tours_per_slot: default_max_tours_per_slot(),
            tour_horizon_days: default_tour_horizon_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.workforce/activities.db".to_string()
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixturesConfig {
    /// JSON file seeding the in-memory lead, campaign, document and property stores
    #[serde(default)]
    pub path: Option<String>,
}

/// Mask a secret for display: first 3 and last 4 chars of longer keys, otherwise "***"
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".workforce")
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(s: &str) -> PathBuf {
    match (s.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(s),
    }
}

impl WorkforceConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `workforce init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let hardcoded = looks_hardcoded(content);
        let config: Self = toml::from_str(&expand_env_vars(content))?;

        for (kind, profile) in config.agents.profiles() {
            if profile.max_loop_iterations == Some(0) {
                bail!("agents.{}.max_loop_iterations must be at least 1", kind);
            }
        }

        if hardcoded {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENAI_API_KEY}}\""
            );
        }
        Ok(config)
    }

    /// Copy safe to print: secrets masked
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.provider.api_key = mask_secret(&self.provider.api_key);
        masked
    }
}

/// Whether the raw file sets a literal key rather than a `${VAR}` reference
fn looks_hardcoded(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        line.starts_with("api_key")
            && line
                .split_once('=')
                .map(|(_, value)| {
                    let value = value.trim().trim_matches('"');
                    !value.is_empty() && !value.contains("${")
                })
                .unwrap_or(false)
    })
}

/// Environment variables that may be expanded in config files
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "WORKFORCE_MODEL",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}
