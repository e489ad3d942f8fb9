use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use taskwren_backend::GoogleConfig;
use taskwren_channels::TelegramConfig;
use taskwren_core::{CoreConfig, LimitsConfig, ModelConfig};
use taskwren_scheduler::ProactiveConfig;

/// Full application configuration, one YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    pub telegram: TelegramConfig,
    pub google: GoogleConfig,
    #[serde(default)]
    pub proactive: ProactiveConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        if self.telegram.token.trim().is_empty() {
            anyhow::bail!("telegram.token must be set");
        }
        if self.google.access_token.trim().is_empty() {
            anyhow::bail!("google.access_token must be set");
        }
        Ok(())
    }

    pub fn core(&self) -> CoreConfig {
        CoreConfig {
            model: self.model.clone(),
            limits: self.limits.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = "\
telegram:
  token: \"123:abc\"
google:
  access_token: \"ya29.token\"
";

    #[test]
    fn minimal_config_loads_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.model.model, "qwen3:latest");
        assert_eq!(config.limits.max_tool_rounds, 4);
        assert!(config.proactive.enabled);
    }

    #[test]
    fn missing_tokens_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"telegram:\n  token: \"\"\ngoogle:\n  access_token: \"x\"\n")
            .unwrap();
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_a_contextual_error() {
        let err = AppConfig::load(Path::new("/nonexistent/taskwren.yaml")).unwrap_err();
        assert!(err.to_string().contains("taskwren.yaml"));
    }
}
