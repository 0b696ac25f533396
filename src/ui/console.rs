use colored::Colorize;

use crate::config::Settings;
use crate::core::{MetricsSummary, SecretStore};
use crate::llm::{NormalizedResponse, UsageSummary};

pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", "[INFO]".blue(), message);
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", "[WARN]".yellow(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "[ERROR]".red(), message);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "[OK]".green(), message);
    }

    pub fn response(&self, response: &NormalizedResponse) {
        println!(
            "\n{} {}\n{}",
            format!("[{}:{}]", response.provider_id, response.model)
                .green()
                .bold(),
            "━".repeat(50).dimmed(),
            response.content
        );
        println!(
            "{}",
            format!(
                "tokens: {} prompt + {} completion = {}",
                response.token_usage.prompt_tokens,
                response.token_usage.completion_tokens,
                response.token_usage.total_tokens
            )
            .dimmed()
        );
    }

    pub fn stats(&self, usage: &UsageSummary, metrics: &MetricsSummary) {
        println!("\n{}", "USAGE".bold().underline());
        println!("  {}", usage);
        println!("\n{}", metrics.to_string().dimmed());
    }

    pub fn list_providers(&self, settings: &Settings, secrets: &dyn SecretStore) {
        println!("\n{}", "PROVIDERS".bold().underline());
        println!("{}", "─".repeat(50));

        let mut ids: Vec<_> = settings.providers.keys().collect();
        ids.sort();

        for id in ids {
            let provider = &settings.providers[id];
            let key = if settings.get_api_key(provider, secrets).is_some() {
                "key found".green()
            } else {
                "no key".red()
            };
            println!(
                "  {} {} {} {}",
                "•".cyan(),
                id.cyan().bold(),
                format!("({}, {})", provider.kind, provider.model).dimmed(),
                key
            );
        }
        println!();
    }

    pub fn show_config(&self, settings: &Settings) {
        println!("\n{}", "CONFIGURATION".bold().underline());
        println!("{}", "─".repeat(50));

        println!("\n  {}", "Providers:".yellow());
        let mut ids: Vec<_> = settings.providers.keys().collect();
        ids.sort();
        for id in ids {
            let provider = &settings.providers[id];
            println!(
                "    {} {} {}",
                id.cyan().bold(),
                format!("({})", provider.kind).dimmed(),
                provider
                    .base_url
                    .as_deref()
                    .unwrap_or("default endpoint")
                    .dimmed()
            );
        }

        println!("\n  {}", "Cache:".yellow());
        println!(
            "    enabled: {}, ttl: {}s, max entries: {}",
            if settings.cache.enabled {
                "yes".green()
            } else {
                "no".red()
            },
            settings.cache.ttl_secs,
            settings.cache.max_entries
        );

        println!("\n  {}", "Retry:".yellow());
        println!(
            "    max attempts: {}, backoff: {} from {}ms",
            settings.retry.max_attempts, settings.retry.backoff, settings.retry.initial_delay_ms
        );

        println!("\n  {}", "Validation:".yellow());
        println!(
            "    max prompt chars: {}, blocked patterns: {}",
            settings.validation.max_prompt_chars,
            settings.validation.blocked_patterns.len()
        );

        if let Some(path) = &settings.usage.log_file {
            println!(
                "\n  {} {}",
                "Usage log:".yellow(),
                path.display().to_string().dimmed()
            );
        }

        if let Ok(path) = Settings::config_path() {
            println!(
                "\n  {} {}",
                "Config file:".yellow(),
                path.display().to_string().dimmed()
            );
        }
        println!();
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
