use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::cache::{CacheBackend, CacheStats, ResponseCache};
use super::error::{DispatchError, DispatchResult, ProviderError};
use super::pricing::PricingTable;
use super::providers::{build_adapter, ProviderAdapter};
use super::retry::{RetryFailure, RetryPolicy};
use super::types::{NormalizedResponse, Options, Request};
use super::usage::{JsonlUsageSink, TracingUsageSink, UsageRecorder, UsageSink};
use crate::config::Settings;
use crate::core::{Counter, InputSanitizer, Metrics, PromptValidator, SecretStore};

/// Routes prompts to registered provider adapters, with validation,
/// caching, retries and usage accounting around each call.
pub struct Dispatcher {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    cache: Option<Arc<dyn CacheBackend>>,
    cache_ttl: Duration,
    retry: RetryPolicy,
    validator: Arc<dyn PromptValidator>,
    usage: UsageRecorder,
    pricing: PricingTable,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Wire a dispatcher from configuration
    pub fn from_settings(
        settings: &Settings,
        secrets: &dyn SecretStore,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        Ok(DispatcherBuilder::from_settings(settings, secrets)?
            .metrics(metrics)
            .build())
    }

    /// Registered provider ids, sorted
    pub fn providers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Flush buffered usage sinks; call before the process exits
    pub fn flush_usage(&self) {
        self.usage.flush();
    }

    pub async fn dispatch(
        &self,
        provider_id: &str,
        prompt: &str,
        options: Options,
    ) -> DispatchResult<NormalizedResponse> {
        let request = Request::new(provider_id, prompt, options);
        self.dispatch_with_cancel(&request, &CancellationToken::new())
            .await
    }

    /// Dispatch that stops issuing attempts once `cancel` fires. A cancelled
    /// dispatch writes neither usage nor cache.
    pub async fn dispatch_with_cancel(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> DispatchResult<NormalizedResponse> {
        let result = self.run(request, cancel).await;
        if result.is_err() {
            self.metrics.incr(Counter::DispatchFailure);
        }
        result
    }

    async fn run(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> DispatchResult<NormalizedResponse> {
        let provider_id = request.provider_id();

        self.validator
            .validate(request.prompt())
            .map_err(DispatchError::InvalidInput)?;

        // Unknown ids never reach the cache, so they do not count as misses
        let adapter = self
            .adapters
            .get(provider_id)
            .ok_or_else(|| DispatchError::UnknownProvider(provider_id.to_string()))?;

        let fingerprint = request.fingerprint();

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&fingerprint).await {
                tracing::debug!(provider = provider_id, "Cache hit");
                self.metrics.incr(Counter::CacheHit);
                return Ok(cached);
            }
            self.metrics.incr(Counter::CacheMiss);
        }

        let started = Instant::now();
        let outcome = self
            .retry
            .run(cancel, move || {
                self.metrics.incr(Counter::ProviderAttempt);
                adapter.send(request)
            })
            .await;

        let (response, attempts) = match outcome {
            Ok(done) => done,
            Err(failure) => return Err(Self::map_failure(provider_id, failure)),
        };

        // A result that raced with cancellation is discarded
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled { attempts });
        }

        let latency = started.elapsed();
        self.metrics.incr(Counter::DispatchSuccess);
        self.metrics.observe_latency(provider_id, latency);

        let cost = self.pricing.cost(&response.model, &response.token_usage);
        self.usage.record(
            provider_id,
            &response.model,
            response.token_usage,
            cost,
            latency,
            attempts,
        );

        if let Some(cache) = &self.cache {
            cache
                .put(fingerprint, response.clone(), self.cache_ttl)
                .await;
        }

        Ok(response)
    }

    fn map_failure(provider_id: &str, failure: RetryFailure) -> DispatchError {
        match failure {
            RetryFailure::Cancelled { attempts } => DispatchError::Cancelled { attempts },
            RetryFailure::Aborted { error, .. } => match error {
                ProviderError::Rejected { status, message } => DispatchError::ProviderRejected {
                    provider: provider_id.to_string(),
                    status,
                    message,
                },
                ProviderError::InvalidInput(reason) => DispatchError::InvalidInput(reason),
                // Transient errors are never aborted on, but keep the cause if they are
                cause @ ProviderError::Transport(_) => DispatchError::ProviderRequest {
                    provider: provider_id.to_string(),
                    attempts: 1,
                    cause,
                },
            },
            RetryFailure::Exhausted { attempts, error } => DispatchError::ProviderRequest {
                provider: provider_id.to_string(),
                attempts,
                cause: error,
            },
        }
    }
}

/// Assembles a [`Dispatcher`]; every collaborator has a default
pub struct DispatcherBuilder {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    cache: Option<Arc<dyn CacheBackend>>,
    cache_ttl: Duration,
    retry: RetryPolicy,
    validator: Arc<dyn PromptValidator>,
    usage: UsageRecorder,
    pricing: PricingTable,
    metrics: Arc<Metrics>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            adapters: HashMap::new(),
            cache: Some(Arc::new(ResponseCache::default())),
            cache_ttl: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
            validator: Arc::new(InputSanitizer::default()),
            usage: UsageRecorder::new(),
            pricing: PricingTable::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }
}

impl DispatcherBuilder {
    /// Builder preloaded from configuration.
    ///
    /// Providers whose credentials cannot be resolved are skipped with a
    /// warning rather than failing the whole setup.
    pub fn from_settings(settings: &Settings, secrets: &dyn SecretStore) -> Result<Self> {
        let mut builder = Self::default()
            .retry(RetryPolicy::from_settings(&settings.retry))
            .validator(Arc::new(InputSanitizer::from_settings(&settings.validation)?))
            .pricing(PricingTable::new(settings.pricing.clone()))
            .usage_sink(Arc::new(TracingUsageSink));

        builder = if settings.cache.enabled {
            builder
                .cache(Arc::new(ResponseCache::new(settings.cache.max_entries)))
                .cache_ttl(Duration::from_secs(settings.cache.ttl_secs))
        } else {
            builder.no_cache()
        };

        if let Some(path) = &settings.usage.log_file {
            builder = builder.usage_sink(Arc::new(JsonlUsageSink::open(path)?));
        }

        for (id, config) in &settings.providers {
            let api_key = settings.get_api_key(config, secrets);
            match build_adapter(id, config, api_key) {
                Ok(adapter) => builder = builder.register(adapter),
                Err(e) => tracing::warn!("Provider '{}' skipped: {:#}", id, e),
            }
        }

        Ok(builder)
    }

    /// Register an adapter under its own id, replacing any previous one
    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.id().to_string(), adapter);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn PromptValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn usage(mut self, usage: UsageRecorder) -> Self {
        self.usage = usage;
        self
    }

    /// Add one more usage sink to the current recorder
    pub fn usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = self.usage.with_sink(sink);
        self
    }

    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            adapters: self.adapters,
            cache: self.cache,
            cache_ttl: self.cache_ttl,
            retry: self.retry,
            validator: self.validator,
            usage: self.usage,
            pricing: self.pricing,
            metrics: self.metrics,
        }
    }
}
