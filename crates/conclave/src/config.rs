//! Configuration management for conclave.
//!
//! Read from `$CONCLAVE_CONFIG`, or `config.toml` in the data directory.
//! Missing files fall back to defaults with a single echo provider.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use conclave_core::provider::{EchoProvider, OpenAiProvider};
use conclave_core::{CoreConfig, MemoryConfig, OrchestratorConfig, Provider, ProviderRegistry};

use crate::error::CliError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Provider adapters available to sequences
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Provider used to derive insights from experiences
    #[serde(default)]
    pub insight_provider: Option<String>,

    /// Root directory that `selected_folders` resolve against
    #[serde(default)]
    pub documents_dir: Option<PathBuf>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

/// One configured provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,

    #[serde(default)]
    pub kind: ProviderKind,

    /// Base URL of an OpenAI-compatible API (e.g. https://api.openai.com/v1)
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

/// Adapter implementation for a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Offline adapter that echoes the prompt
    #[default]
    Echo,
    /// OpenAI-compatible chat completions endpoint
    Openai,
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "conclave", "conclave") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".conclave")
    }
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("conclave.db")
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        id: "echo".to_string(),
        kind: ProviderKind::Echo,
        base_url: None,
        model: None,
        api_key_env: None,
        cost_per_1k_tokens: 0.0,
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            providers: default_providers(),
            insight_provider: None,
            documents_dir: None,
            orchestrator: OrchestratorConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;

        if let Ok(path) = std::env::var("CONCLAVE_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Load configuration from `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        };

        config.core().validate().map_err(CliError::from)?;
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CONCLAVE_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Core library view of this configuration.
    pub fn core(&self) -> CoreConfig {
        CoreConfig::new(&self.database_path)
            .with_orchestrator(self.orchestrator.clone())
            .with_memory(self.memory.clone())
    }

    /// Build the provider registry from `[[providers]]`.
    pub fn provider_registry(&self) -> Result<ProviderRegistry, CliError> {
        let mut seen = HashSet::new();
        let mut registry = ProviderRegistry::new();

        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(CliError::DuplicateProvider(provider.id.clone()));
            }
            registry.register(provider.build()?);
        }

        if let Some(id) = &self.insight_provider {
            if !registry.contains(id) {
                return Err(CliError::UnknownInsightProvider(id.clone()));
            }
        }

        Ok(registry)
    }
}

impl ProviderConfig {
    fn build(&self) -> Result<Arc<dyn Provider>, CliError> {
        match self.kind {
            ProviderKind::Echo => {
                Ok(Arc::new(EchoProvider::new(&self.id).with_cost(self.cost_per_1k_tokens)))
            }
            ProviderKind::Openai => {
                let base_url = self.base_url.as_deref().ok_or_else(|| CliError::MissingField {
                    provider: self.id.clone(),
                    field: "base_url",
                })?;
                let model = self.model.as_deref().ok_or_else(|| CliError::MissingField {
                    provider: self.id.clone(),
                    field: "model",
                })?;
                let api_key = match &self.api_key_env {
                    Some(var) => Some(std::env::var(var).map_err(|_| CliError::MissingApiKey {
                        provider: self.id.clone(),
                        var: var.clone(),
                    })?),
                    None => None,
                };

                Ok(Arc::new(
                    OpenAiProvider::new(&self.id, base_url, model, api_key)
                        .with_cost(self.cost_per_1k_tokens),
                ))
            }
        }
    }
}
