//! Multi-provider LLM request dispatcher.
//!
//! A [`Dispatcher`](llm::Dispatcher) validates a prompt, serves repeated
//! requests from a TTL cache, routes misses to a registered
//! [`ProviderAdapter`](llm::ProviderAdapter) under a retry policy, and
//! records token usage and cost for every successful call.

pub mod cli;
pub mod config;
pub mod core;
pub mod llm;
pub mod ui;
