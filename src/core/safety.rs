// ============================================
// PROMPTGATE - Prompt Validation & Redaction
// ============================================

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::ValidationSettings;

/// Pluggable prompt check run before any provider call
pub trait PromptValidator: Send + Sync {
    /// `Err` carries a human readable reason
    fn validate(&self, prompt: &str) -> std::result::Result<(), String>;
}

/// Default validator: non-empty, bounded length, no blocked content
pub struct InputSanitizer {
    max_prompt_chars: usize,
    blocked_patterns: Vec<Regex>,
}

impl Default for InputSanitizer {
    fn default() -> Self {
        Self {
            max_prompt_chars: 32_000,
            blocked_patterns: Vec::new(),
        }
    }
}

impl InputSanitizer {
    pub fn new(max_prompt_chars: usize) -> Self {
        Self {
            max_prompt_chars,
            blocked_patterns: Vec::new(),
        }
    }

    /// Add a blocked-content regex
    pub fn block(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .with_context(|| format!("Invalid blocked pattern: {}", pattern))?;
        self.blocked_patterns.push(re);
        Ok(self)
    }

    pub fn from_settings(settings: &ValidationSettings) -> Result<Self> {
        settings
            .blocked_patterns
            .iter()
            .try_fold(Self::new(settings.max_prompt_chars), |v, p| v.block(p))
    }
}

impl PromptValidator for InputSanitizer {
    fn validate(&self, prompt: &str) -> std::result::Result<(), String> {
        if prompt.trim().is_empty() {
            return Err("prompt is empty".to_string());
        }

        let len = prompt.chars().count();
        if len > self.max_prompt_chars {
            return Err(format!(
                "prompt is {} characters, maximum is {}",
                len, self.max_prompt_chars
            ));
        }

        for pattern in &self.blocked_patterns {
            if pattern.is_match(prompt) {
                return Err(format!("prompt matches blocked pattern '{}'", pattern));
            }
        }

        Ok(())
    }
}

/// Redact credentials that providers sometimes echo back in error bodies
pub fn redact_secrets(text: &str) -> String {
    let mut sanitized = text.to_string();

    let redact_patterns = [
        (r"sk-ant-[a-zA-Z0-9\-_]{8,}", "[REDACTED_API_KEY]"),
        (r"sk-[a-zA-Z0-9\-_]{16,}", "[REDACTED_API_KEY]"),
        (r"(?i)bearer\s+[a-zA-Z0-9\-_.]{8,}", "Bearer [REDACTED]"),
        (r"(?i)api[_-]?key[=:][\s]*[\w-]+", "[REDACTED_API_KEY]"),
    ];

    for (pattern, replacement) in redact_patterns {
        if let Ok(re) = Regex::new(pattern) {
            sanitized = re.replace_all(&sanitized, replacement).to_string();
        }
    }

    sanitized
}
