use anyhow::{Context, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::error::InsightError;
use crate::provider::ProviderId;

pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_METADATA_PATH: &str = "data/cities.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const ENV_LLM_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_LLM_MODEL: &str = "OPENAI_MODEL";
pub const ENV_LLM_BASE_URL: &str = "OPENAI_BASE_URL";

/// Configuration for a single weather provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides the provider's public endpoint, e.g. for a proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Language-model settings used by the classifier.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Local file locations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    /// CSV table with city metadata.
    pub metadata: Option<PathBuf>,
    /// SQLite file holding the insight history.
    pub database: Option<PathBuf>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Optional default provider id, e.g. "openweather" or "weatherapi".
    pub default_provider: Option<String>,

    /// Timeout applied to every outbound request, in seconds.
    pub timeout_secs: Option<u64>,

    /// Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId, InsightError> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            InsightError::Configuration(
                "No default provider configured.\n\
                 Hint: run `weather-insight configure <provider>` (e.g. `weather-insight configure openweather`) \
                 or set OPENWEATHER_API_KEY."
                    .to_string(),
            )
        })?;

        ProviderId::try_from(s.as_str())
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> anyhow::Result<ProjectDirs> {
        ProjectDirs::from("dev", "weather-insight", "weather-insight")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> anyhow::Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Set/replace a provider API key; the first configured provider becomes the default.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig { api_key, base_url: None });

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .map(|cfg| cfg.api_key.as_str())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn llm_model(&self) -> &str {
        self.llm.model.as_deref().unwrap_or(DEFAULT_LLM_MODEL)
    }

    pub fn llm_base_url(&self) -> &str {
        self.llm.base_url.as_deref().unwrap_or(DEFAULT_LLM_BASE_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.paths.metadata.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_PATH))
    }

    /// Configured database path, or `insights.db` in the platform data directory.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.paths.database {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("insights.db")),
        }
    }

    /// Apply process-level overrides. `lookup` is usually `std::env::var(..).ok()`;
    /// taking it as a closure keeps this testable without touching the environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for id in ProviderId::all() {
            if let Some(key) = lookup(id.env_var()).filter(|k| !k.trim().is_empty()) {
                self.upsert_provider_api_key(*id, key);
            }
        }

        if let Some(key) = lookup(ENV_LLM_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_LLM_MODEL).filter(|m| !m.trim().is_empty()) {
            self.llm.model = Some(model);
        }
        if let Some(url) = lookup(ENV_LLM_BASE_URL).filter(|u| !u.trim().is_empty()) {
            self.llm.base_url = Some(url);
        }
    }

    /// Check that both credentials a run needs are present.
    pub fn validate(&self) -> Result<(), InsightError> {
        let id = self.default_provider_id()?;

        if !self.is_provider_configured(id) {
            return Err(InsightError::Configuration(format!(
                "No API key configured for provider '{id}'.\n\
                 Hint: run `weather-insight configure {id}` or set {}.",
                id.env_var()
            )));
        }

        if self.llm_api_key().is_none() {
            return Err(InsightError::Configuration(format!(
                "No language-model API key configured.\n\
                 Hint: run `weather-insight configure {id}` or set {ENV_LLM_API_KEY}."
            )));
        }

        Ok(())
    }
}
