use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::TokenUsage;

/// USD price per thousand tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

/// Per-model pricing keyed by model name prefix.
///
/// `gpt-4o` prices `gpt-4o-2024-08-06` too; the longest matching prefix
/// wins so that `gpt-4o-mini` can be priced separately.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new(models: HashMap<String, ModelPricing>) -> Self {
        Self { models }
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelPricing> {
        self.models
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| pricing)
    }

    /// Cost of a completion; unpriced models cost nothing
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        match self.lookup(model) {
            Some(p) => {
                usage.prompt_tokens as f64 / 1000.0 * p.prompt_per_1k
                    + usage.completion_tokens as f64 / 1000.0 * p.completion_per_1k
            }
            None => {
                tracing::debug!("No pricing configured for model {}", model);
                0.0
            }
        }
    }
}
