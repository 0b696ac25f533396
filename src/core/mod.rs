pub mod metrics;
mod safety;
mod secrets;
pub mod telemetry;

pub use metrics::{Counter, LatencyStats, Metrics, MetricsSummary};
pub use safety::{redact_secrets, InputSanitizer, PromptValidator};
pub use secrets::{EnvSecretStore, SecretStore, SecretString, StaticSecretStore};
