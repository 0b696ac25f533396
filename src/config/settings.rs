use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{SecretStore, SecretString};
use crate::llm::ModelPricing;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub validation: ValidationSettings,

    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,

    #[serde(default)]
    pub usage: UsageSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(alias = "openai_compatible")]
    Openai,
    Anthropic,
    HttpJson,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Openai => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::HttpJson => write!(f, "http_json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Request path appended to `base_url` (http_json only)
    pub path: Option<String>,

    /// JSON pointers into the reply (http_json only)
    #[serde(default)]
    pub response: ResponseShape,
}

/// Where the generic HTTP adapter finds each field in a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseShape {
    #[serde(default = "default_content_pointer")]
    pub content: String,
    #[serde(default = "default_model_pointer")]
    pub model: String,
    #[serde(default = "default_prompt_tokens_pointer")]
    pub prompt_tokens: String,
    #[serde(default = "default_completion_tokens_pointer")]
    pub completion_tokens: String,
    #[serde(default = "default_total_tokens_pointer")]
    pub total_tokens: String,
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self {
            content: default_content_pointer(),
            model: default_model_pointer(),
            prompt_tokens: default_prompt_tokens_pointer(),
            completion_tokens: default_completion_tokens_pointer(),
            total_tokens: default_total_tokens_pointer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: BackoffKind,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffKind::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

/// Delay growth between retry attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

impl std::fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffKind::Fixed => write!(f, "fixed"),
            BackoffKind::Exponential => write!(f, "exponential"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Regular expressions; a prompt matching any of them is rejected
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            blocked_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSettings {
    /// Append usage records as JSON lines to this file
    pub log_file: Option<PathBuf>,
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_max_entries() -> usize {
    1000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_prompt_chars() -> usize {
    32_000
}
fn default_content_pointer() -> String {
    "/choices/0/message/content".to_string()
}
fn default_model_pointer() -> String {
    "/model".to_string()
}
fn default_prompt_tokens_pointer() -> String {
    "/usage/prompt_tokens".to_string()
}
fn default_completion_tokens_pointer() -> String {
    "/usage/completion_tokens".to_string()
}
fn default_total_tokens_pointer() -> String {
    "/usage/total_tokens".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                kind: ProviderKind::Openai,
                api_key: None,
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                base_url: None,
                model: "gpt-4o".to_string(),
                max_tokens: default_max_tokens(),
                timeout_secs: default_timeout_secs(),
                path: None,
                response: ResponseShape::default(),
            },
        );
        let anthropic = ProviderConfig {
            kind: ProviderKind::Anthropic,
            api_key: None,
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            base_url: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            path: None,
            response: ResponseShape::default(),
        };
        // "claude" is the id older callers route to
        providers.insert("claude".to_string(), anthropic.clone());
        providers.insert("anthropic".to_string(), anthropic);
        providers.insert(
            "deepseek".to_string(),
            ProviderConfig {
                kind: ProviderKind::HttpJson,
                api_key: None,
                api_key_env: Some("DEEPSEEK_API_KEY".to_string()),
                base_url: Some("https://api.deepseek.com/v1".to_string()),
                model: "deepseek-chat".to_string(),
                max_tokens: default_max_tokens(),
                timeout_secs: default_timeout_secs(),
                path: Some("/chat/completions".to_string()),
                response: ResponseShape::default(),
            },
        );

        let mut pricing = HashMap::new();
        pricing.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                prompt_per_1k: 0.0025,
                completion_per_1k: 0.01,
            },
        );
        pricing.insert(
            "claude-sonnet-4".to_string(),
            ModelPricing {
                prompt_per_1k: 0.003,
                completion_per_1k: 0.015,
            },
        );
        pricing.insert(
            "deepseek-chat".to_string(),
            ModelPricing {
                prompt_per_1k: 0.00027,
                completion_per_1k: 0.0011,
            },
        );

        Self {
            providers,
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            validation: ValidationSettings::default(),
            pricing,
            usage: UsageSettings::default(),
        }
    }
}

impl Settings {
    /// Load from the platform config file, writing defaults on first run
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let settings = Settings::default();
            settings.save_to(&config_path)?;
            Ok(settings)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let settings: Settings = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("dev", "promptgate", "promptgate")
            .context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn get_provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.get(id)
    }

    /// Inline key first, then the named secret from the store
    pub fn get_api_key(
        &self,
        provider: &ProviderConfig,
        secrets: &dyn SecretStore,
    ) -> Option<SecretString> {
        if let Some(key) = &provider.api_key {
            return Some(SecretString::new(key.clone()));
        }
        provider
            .api_key_env
            .as_deref()
            .and_then(|name| secrets.resolve(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StaticSecretStore;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_register_builtin_providers() {
        let settings = Settings::default();
        assert_eq!(settings.providers.len(), 4);
        assert_eq!(settings.providers["deepseek"].kind, ProviderKind::HttpJson);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Settings::default().save_to(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();

        assert_eq!(loaded.providers["openai"].model, "gpt-4o");
        assert_eq!(loaded.pricing.len(), 3);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_src = r#"
[providers.local]
kind = "openai_compatible"
base_url = "http://localhost:8080/v1"
model = "qwen2"

[retry]
max_attempts = 5
backoff = "fixed"
"#;
        let settings: Settings = toml::from_str(toml_src).unwrap();
        let local = &settings.providers["local"];
        assert_eq!(local.kind, ProviderKind::Openai);
        assert_eq!(local.max_tokens, 4096);
        assert_eq!(local.response, ResponseShape::default());
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.backoff, BackoffKind::Fixed);
        assert_eq!(settings.retry.initial_delay_ms, 500);
        assert!(settings.cache.enabled);
        assert_eq!(settings.validation.max_prompt_chars, 32_000);
    }

    #[test]
    fn test_claude_is_registered_alongside_anthropic() {
        let settings = Settings::default();
        let secrets = StaticSecretStore::new().with("ANTHROPIC_API_KEY", "sk-ant-test");

        let claude = settings.get_provider("claude").unwrap();
        assert_eq!(claude.kind, ProviderKind::Anthropic);
        assert_eq!(claude.model, settings.providers["anthropic"].model);
        assert_eq!(
            settings.get_api_key(claude, &secrets).unwrap().expose(),
            "sk-ant-test"
        );
    }

    #[test]
    fn test_api_key_resolution() {
        let settings = Settings::default();
        let secrets = StaticSecretStore::new().with("OPENAI_API_KEY", "sk-from-store");

        let key = settings
            .get_api_key(&settings.providers["openai"], &secrets)
            .unwrap();
        assert_eq!(key.expose(), "sk-from-store");
        assert!(settings
            .get_api_key(&settings.providers["anthropic"], &secrets)
            .is_none());

        let mut inline = settings.providers["anthropic"].clone();
        inline.api_key = Some("inline-key".into());
        assert_eq!(
            settings.get_api_key(&inline, &secrets).unwrap().expose(),
            "inline-key"
        );
    }
}
