use serde::{Deserialize, Serialize};

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "qwen3:latest".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_transport_retries() -> u32 {
    2
}

/// Model endpoint settings. The defaults point at a local Ollama daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Hard per-completion timeout. A breach is fatal for the turn.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Transient-transport retries inside the provider.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            transport_retries: default_transport_retries(),
        }
    }
}

fn default_history_cap() -> usize {
    24
}

fn default_parse_retries() -> usize {
    2
}

fn default_validation_retries() -> usize {
    2
}

fn default_max_tool_rounds() -> usize {
    4
}

fn default_session_ttl_secs() -> i64 {
    6 * 3600
}

/// Bounds for the dispatch loop and the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Session length cap; oldest turns are evicted past this.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Correction re-prompts after a parse failure, per user turn.
    #[serde(default = "default_parse_retries")]
    pub parse_retries: usize,
    /// Correction re-prompts after a validation failure, per user turn.
    #[serde(default = "default_validation_retries")]
    pub validation_retries: usize,
    /// Tool executions per user turn before forced finalization.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Advisory idle expiry for sessions.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            parse_retries: default_parse_retries(),
            validation_retries: default_validation_retries(),
            max_tool_rounds: default_max_tool_rounds(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.history_cap == 0 {
            anyhow::bail!("limits.history_cap must be at least 1");
        }
        if self.max_tool_rounds == 0 {
            anyhow::bail!("limits.max_tool_rounds must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl CoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.limits.validate()
    }
}
