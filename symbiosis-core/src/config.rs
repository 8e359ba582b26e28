//! Configuration loading.
//!
//! Settings come from a TOML file (every section optional) and are then
//! overridden by environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

pub const ENV_MEMORY_URL: &str = "SYMBIOSIS_MEMORY_URL";
pub const ENV_HIGH_MODEL: &str = "SYMBIOSIS_HIGH_MODEL";
pub const ENV_LOW_MODEL: &str = "SYMBIOSIS_LOW_MODEL";
pub const ENV_IDENTITY: &str = "SYMBIOSIS_IDENTITY";
/// Credential for the generation service.
pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbiosisConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The text-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    /// Model for analysis, clarifying questions and replies.
    pub high_model: String,
    /// Model for relationship expansion.
    pub low_model: String,
    pub app_title: String,
    /// Deadline for a single model call.
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            high_model: "google/gemini-2.5-flash".to_string(),
            low_model: "google/gemini-2.5-flash-lite".to_string(),
            app_title: "Symbiosis".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// The memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Who "I" and "me" refer to.
    pub identity: String,
    pub question_mode: bool,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            identity: "Arvin".to_string(),
            question_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SymbiosisConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SymbiosisConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get(ENV_MEMORY_URL) {
            self.memory.endpoint = Some(url);
        }
        if let Some(model) = get(ENV_HIGH_MODEL) {
            self.generation.high_model = model;
        }
        if let Some(model) = get(ENV_LOW_MODEL) {
            self.generation.low_model = model;
        }
        if let Some(identity) = get(ENV_IDENTITY) {
            self.persona.identity = identity;
        }
    }

    /// The memory store endpoint, which has no default.
    pub fn memory_endpoint(&self) -> Result<&str, ConfigError> {
        self.memory
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("memory.endpoint"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = SymbiosisConfig::default();
        assert_eq!(config.generation.high_model, "google/gemini-2.5-flash");
        assert_eq!(config.generation.low_model, "google/gemini-2.5-flash-lite");
        assert_eq!(config.generation.request_timeout_secs, 60);
        assert_eq!(config.memory.request_timeout_secs, 30);
        assert_eq!(config.persona.identity, "Arvin");
        assert_eq!(config.logging.level, "info");
        assert!(config.memory_endpoint().is_err());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config(
            r#"
[memory]
endpoint = "https://script.example.com/exec"

[persona]
identity = "Nadia"
question_mode = true
"#,
        );

        let config = SymbiosisConfig::load(file.path()).unwrap();
        assert_eq!(config.memory_endpoint().unwrap(), "https://script.example.com/exec");
        assert_eq!(config.memory.request_timeout_secs, 30);
        assert_eq!(config.persona.identity, "Nadia");
        assert!(config.persona.question_mode);
        assert_eq!(config.generation, GenerationConfig::default());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(matches!(SymbiosisConfig::load(file.path()), Err(ConfigError::Parse(_))));
        assert_eq!(SymbiosisConfig::load_or_default(file.path()), SymbiosisConfig::default());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = SymbiosisConfig::load_or_default(Path::new("/does/not/exist/symbiosis.toml"));
        assert_eq!(config, SymbiosisConfig::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MEMORY_URL, "https://store.example.com"),
            (ENV_HIGH_MODEL, "openai/gpt-4o"),
            (ENV_IDENTITY, "  "),
        ]);

        let mut config = SymbiosisConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.memory_endpoint().unwrap(), "https://store.example.com");
        assert_eq!(config.generation.high_model, "openai/gpt-4o");
        assert_eq!(config.generation.low_model, "google/gemini-2.5-flash-lite");
        assert_eq!(config.persona.identity, "Arvin");
    }
}
