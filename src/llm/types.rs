// ============================================
// PROMPTGATE - Canonical Request / Response Types
// ============================================

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Option key that selects the model instead of being forwarded as-is.
pub const MODEL_OPTION: &str = "model";

/// Scalar request option (temperature, model name, max tokens...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl OptionValue {
    /// Parse a CLI-style `value` string into the narrowest scalar it fits.
    pub fn parse(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return OptionValue::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return OptionValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return OptionValue::Float(f);
        }
        OptionValue::Str(raw.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            OptionValue::Int(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OptionValue::Bool(b) => serde_json::Value::Bool(*b),
            OptionValue::Int(i) => serde_json::Value::from(*i),
            OptionValue::Float(f) => serde_json::Value::from(*f),
            OptionValue::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Float(x) => write!(f, "{}", x),
            OptionValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

/// Ordered so that serialization, and therefore fingerprints, are deterministic.
pub type Options = BTreeMap<String, OptionValue>;

/// A single prompt addressed to one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    provider_id: String,
    prompt: String,
    options: Options,
}

impl Request {
    pub fn new(provider_id: impl Into<String>, prompt: impl Into<String>, options: Options) -> Self {
        Self {
            provider_id: provider_id.into(),
            prompt: prompt.into(),
            options,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Model requested through the `model` option, if any
    pub fn model(&self) -> Option<&str> {
        self.options.get(MODEL_OPTION).and_then(OptionValue::as_str)
    }

    /// Options forwarded verbatim into the provider payload
    pub fn passthrough_options(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.options.iter().filter(|(k, _)| k.as_str() != MODEL_OPTION)
    }

    /// Stable SHA-256 digest of provider, prompt and options, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.prompt.as_bytes());
        hasher.update([0u8]);
        // BTreeMap of scalars always serializes
        let options = serde_json::to_string(&self.options).unwrap_or_default();
        hasher.update(options.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build from prompt/completion counts, deriving the total when the
    /// provider does not report one.
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: Option<u64>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total_tokens.unwrap_or(prompt_tokens + completion_tokens),
        }
    }
}

/// Provider-agnostic completion result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub provider_id: String,
    pub model: String,
    pub content: String,
    pub token_usage: TokenUsage,
    /// Untouched provider payload
    pub raw: serde_json::Value,
}
