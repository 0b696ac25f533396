// ============================================
// PROMPTGATE - Configuration Tests
// ============================================

use async_trait::async_trait;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use promptgate::config::{BackoffKind, ProviderKind, Settings};
use promptgate::core::StaticSecretStore;
use promptgate::llm::{
    Backoff, DispatcherBuilder, NormalizedResponse, Options, ProviderAdapter, ProviderError, Request,
    RetryPolicy, TokenUsage, UsageRecord,
};

const FULL_CONFIG: &str = r#"
[providers.openai]
kind = "openai"
api_key_env = "OPENAI_API_KEY"
model = "gpt-4o"

[providers.local]
kind = "http_json"
base_url = "http://localhost:8080/"
path = "/v1/generate"
model = "llama3"
timeout_secs = 120

[providers.local.response]
content = "/output/text"

[providers.groq]
kind = "openai_compatible"
api_key = "gsk-inline"
base_url = "https://api.groq.com/openai/v1"
model = "llama-3.1-70b"

[cache]
enabled = false

[retry]
max_attempts = 5
backoff = "fixed"
initial_delay_ms = 250

[validation]
max_prompt_chars = 1000
blocked_patterns = ["(?i)drop table"]

[pricing.llama3]
prompt_per_1k = 0.0
completion_per_1k = 0.0
"#;

struct StubAdapter;

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn id(&self) -> &str {
        "stub"
    }

    async fn send(&self, _request: &Request) -> Result<NormalizedResponse, ProviderError> {
        Ok(NormalizedResponse {
            provider_id: "stub".into(),
            model: "stub-1".into(),
            content: "ok".into(),
            token_usage: TokenUsage::new(2, 3, None),
            raw: serde_json::Value::Null,
        })
    }
}

#[test]
fn test_full_config_parses() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let settings = Settings::load_from(&path).unwrap();

    assert_eq!(settings.providers.len(), 4);
    let local = settings.get_provider("local").unwrap();
    assert_eq!(local.kind, ProviderKind::HttpJson);
    assert_eq!(local.timeout_secs, 120);
    assert_eq!(local.response.content, "/output/text");
    // Unset pointers keep their defaults
    assert_eq!(local.response.prompt_tokens, "/usage/prompt_tokens");

    assert_eq!(settings.get_provider("groq").unwrap().kind, ProviderKind::Openai);
    assert!(!settings.cache.enabled);
    assert_eq!(settings.retry.max_attempts, 5);
    assert_eq!(settings.retry.backoff, BackoffKind::Fixed);
    assert_eq!(
        RetryPolicy::from_settings(&settings.retry).backoff,
        Backoff::Fixed(std::time::Duration::from_millis(250))
    );
    assert_eq!(settings.validation.blocked_patterns.len(), 1);
    assert!(settings.usage.log_file.is_none());
}

#[test]
fn test_unknown_provider_kind_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "[providers.x]\nkind = \"carrier_pigeon\"\nmodel = \"coo\"\n",
    )
    .unwrap();

    assert!(Settings::load_from(&path).is_err());
}

#[test]
fn test_misspelled_backoff_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "[retry]\nbackoff = \"fixd\"\ninitial_delay_ms = 250\n",
    )
    .unwrap();

    let err = Settings::load_from(&path).unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("Failed to parse config file"), "{}", chain);
    assert!(chain.contains("fixd"), "{}", chain);
}

#[test]
fn test_builder_from_config_registers_usable_providers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, FULL_CONFIG).unwrap();
    let settings = Settings::load_from(&path).unwrap();

    // No OPENAI_API_KEY: openai is skipped, local needs none, groq has an inline key
    let dispatcher = DispatcherBuilder::from_settings(&settings, &StaticSecretStore::new())
        .unwrap()
        .build();

    assert_eq!(dispatcher.providers(), vec!["groq", "local"]);
    assert!(dispatcher.cache_stats().is_none(), "cache disabled in config");
}

#[test]
fn test_invalid_blocked_pattern_fails_setup() {
    let mut settings = Settings::default();
    settings.validation.blocked_patterns = vec!["([unclosed".to_string()];

    let result = DispatcherBuilder::from_settings(&settings, &StaticSecretStore::new());
    assert!(result.is_err());
}

#[tokio::test]
async fn test_blocked_pattern_from_config_rejects_prompt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, FULL_CONFIG).unwrap();
    let settings = Settings::load_from(&path).unwrap();

    let dispatcher = DispatcherBuilder::from_settings(&settings, &StaticSecretStore::new())
        .unwrap()
        .register(Arc::new(StubAdapter))
        .build();

    let err = dispatcher
        .dispatch("stub", "please DROP TABLE users", Options::new())
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("invalid input"));

    let too_long = "x".repeat(1001);
    assert!(dispatcher.dispatch("stub", &too_long, Options::new()).await.is_err());
}

#[tokio::test]
async fn test_usage_log_file_receives_jsonl() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("logs").join("usage.jsonl");

    let mut settings = Settings::default();
    settings.usage.log_file = Some(log.clone());

    let dispatcher = DispatcherBuilder::from_settings(&settings, &StaticSecretStore::new())
        .unwrap()
        .register(Arc::new(StubAdapter))
        .build();

    dispatcher.dispatch("stub", "one", Options::new()).await.unwrap();
    dispatcher.dispatch("stub", "two", Options::new()).await.unwrap();
    dispatcher.flush_usage();

    let content = fs::read_to_string(&log).unwrap();
    let records: Vec<UsageRecord> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].provider_id, "stub");
    assert_eq!(records[0].tokens.total_tokens, 5);
    assert_eq!(records[1].attempts, 1);
}

#[test]
fn test_save_then_load_keeps_providers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let settings = Settings::default();
    settings.save_to(&path).unwrap();
    let loaded = Settings::load_from(&path).unwrap();

    let mut ids: Vec<_> = loaded.providers.keys().cloned().collect();
    ids.sort();
    assert_eq!(ids, vec!["anthropic", "claude", "deepseek", "openai"]);
    assert_eq!(loaded.pricing.len(), settings.pricing.len());
}
