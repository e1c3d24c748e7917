//! Configuration
//!
//! Loaded from YAML or JSON (chosen by extension), then overridden by
//! environment variables. A missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::analysis::DEFAULT_MAX_INPUT_CHARS;
use crate::backend::{BackendId, BackendRegistry, LLMProvider, LlmBackend, OllamaProvider, OpenAICompatibleProvider};
use crate::ledger::CostPolicy;
use crate::orchestrator::DEFAULT_MAX_ATTEMPTS;
use crate::validation::CheckerConfig;

pub const CONFIG_PATH_ENV: &str = "VERDICT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "verdict.yaml";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    Openai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: BackendId,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl BackendConfig {
    fn ollama(id: BackendId, model: &str) -> Self {
        Self {
            id,
            provider: ProviderKind::Ollama,
            model: model.to_string(),
            base_url: default_ollama_url(),
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub initial_credits: u64,
    pub cost: CostPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_credits: 100,
            cost: CostPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub bind_addr: String,
    pub max_attempts: usize,
    pub max_input_chars: usize,
    /// Enables a daily rolling log file in this directory
    pub log_dir: Option<PathBuf>,
    pub backends: Vec<BackendConfig>,
    pub checker: CheckerConfig,
    pub ledger: LedgerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8002".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            log_dir: None,
            backends: vec![
                BackendConfig::ollama(BackendId::A, "llama3.2:3b"),
                BackendConfig::ollama(BackendId::B, "qwen3:8b"),
                BackendConfig::ollama(BackendId::C, "deepseek-r1:8b"),
            ],
            checker: CheckerConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Reads `$VERDICT_CONFIG` (or `verdict.yaml`) and applies env overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?,
        };
        Ok(config)
    }

    /// `VERDICT_BIND_ADDR`, `VERDICT_MAX_ATTEMPTS`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("VERDICT_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(raw) = lookup("VERDICT_MAX_ATTEMPTS") {
            self.max_attempts = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("VERDICT_MAX_ATTEMPTS is not a number: {:?}", raw)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }
        if self.backends.is_empty() {
            return Err(ConfigError::Invalid("at least one backend must be configured".to_string()));
        }
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.id) {
                return Err(ConfigError::Invalid(format!("backend {} configured twice", backend.id)));
            }
            if backend.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!("backend {} timeout_secs must be at least 1", backend.id)));
            }
        }
        Ok(())
    }

    pub fn build_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        for backend in &self.backends {
            let timeout = Duration::from_secs(backend.timeout_secs);
            let provider: Arc<dyn LLMProvider> = match backend.provider {
                ProviderKind::Ollama => Arc::new(OllamaProvider::from_url(&backend.base_url)?),
                ProviderKind::Openai => {
                    let api_key = match &backend.api_key_env {
                        Some(var) => Some(std::env::var(var).with_context(|| {
                            format!("Backend {} expects its API key in ${}", backend.id, var)
                        })?),
                        None => None,
                    };
                    Arc::new(OpenAICompatibleProvider::new(backend.base_url.clone(), api_key).with_timeout(timeout)?)
                }
            };
            info!("Registered backend {} ({:?}, model {})", backend.id, backend.provider, backend.model);
            registry.register_instance(LlmBackend::new(backend.id, provider, backend.model.clone()).with_timeout(timeout));
        }
        Ok(registry)
    }
}
