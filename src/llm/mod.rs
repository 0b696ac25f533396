mod cache;
mod dispatcher;
mod error;
mod pricing;
mod providers;
mod retry;
mod types;
mod usage;

pub use cache::{CacheBackend, CacheStats, ResponseCache};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, DispatchResult, ProviderError};
pub use pricing::{ModelPricing, PricingTable};
pub use providers::{
    build_adapter, classify_status, AnthropicAdapter, HttpJsonAdapter, OpenAiAdapter,
    ProviderAdapter,
};
pub use retry::{Backoff, RetryFailure, RetryPolicy};
pub use types::{NormalizedResponse, OptionValue, Options, Request, TokenUsage, MODEL_OPTION};
pub use usage::{
    JsonlUsageSink, MemoryUsageSink, TracingUsageSink, UsageRecord, UsageRecorder, UsageSink,
    UsageSummary,
};
