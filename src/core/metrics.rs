// ============================================
// PROMPTGATE - Dispatch Metrics
// ============================================

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Events the dispatcher counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Counter {
    CacheHit,
    CacheMiss,
    DispatchSuccess,
    DispatchFailure,
    ProviderAttempt,
}

impl Counter {
    pub const ALL: [Counter; 5] = [
        Counter::CacheHit,
        Counter::CacheMiss,
        Counter::DispatchSuccess,
        Counter::DispatchFailure,
        Counter::ProviderAttempt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Counter::CacheHit => "cache_hits",
            Counter::CacheMiss => "cache_misses",
            Counter::DispatchSuccess => "dispatch_success",
            Counter::DispatchFailure => "dispatch_failure",
            Counter::ProviderAttempt => "provider_attempts",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Latency samples kept per provider; older ones are dropped first
pub const LATENCY_WINDOW: usize = 1000;

/// In-process counters and a sliding window of per-provider latencies.
///
/// One instance is created at startup and shared with the dispatcher.
pub struct Metrics {
    counts: [AtomicU64; 5],
    latencies: Mutex<HashMap<String, VecDeque<Duration>>>,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counts: Default::default(),
            latencies: Mutex::new(HashMap::new()),
            started: Instant::now(),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.counts[counter.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, counter: Counter) -> u64 {
        self.counts[counter.slot()].load(Ordering::Relaxed)
    }

    /// Round trip time of a successful provider call, retries included
    pub fn observe_latency(&self, provider_id: &str, elapsed: Duration) {
        if let Ok(mut latencies) = self.latencies.lock() {
            let window = latencies.entry(provider_id.to_string()).or_default();
            if window.len() == LATENCY_WINDOW {
                window.pop_front();
            }
            window.push_back(elapsed);
        }
    }

    pub fn latency(&self, provider_id: &str) -> Option<LatencyStats> {
        let latencies = self.latencies.lock().ok()?;
        LatencyStats::from_samples(latencies.get(provider_id)?)
    }

    /// Fraction of cache lookups that hit, if any lookup happened
    pub fn hit_ratio(&self) -> Option<f64> {
        let hits = self.count(Counter::CacheHit);
        let lookups = hits + self.count(Counter::CacheMiss);
        (lookups > 0).then(|| hits as f64 / lookups as f64)
    }

    pub fn summary(&self) -> MetricsSummary {
        let counters = Counter::ALL
            .iter()
            .map(|&c| (c, self.count(c)))
            .collect();

        let providers = self
            .latencies
            .lock()
            .map(|l| {
                l.iter()
                    .filter_map(|(id, samples)| {
                        LatencyStats::from_samples(samples).map(|s| (id.clone(), s))
                    })
                    .collect()
            })
            .unwrap_or_default();

        MetricsSummary {
            uptime: self.started.elapsed(),
            hit_ratio: self.hit_ratio(),
            counters,
            providers,
        }
    }

    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.clear();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub calls: usize,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
}

impl LatencyStats {
    fn from_samples(samples: &VecDeque<Duration>) -> Option<Self> {
        let mut sorted: Vec<Duration> = samples.iter().copied().collect();
        sorted.sort_unstable();

        let calls = sorted.len();
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let nearest_rank = |p: f64| sorted[((calls as f64 * p).ceil() as usize).clamp(1, calls) - 1];

        Some(Self {
            calls,
            mean: sorted.iter().sum::<Duration>() / calls as u32,
            min,
            max,
            p50: nearest_rank(0.50),
            p95: nearest_rank(0.95),
        })
    }
}

/// Point-in-time copy of [`Metrics`], printed by `ask --stats`
#[derive(Debug)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub hit_ratio: Option<f64>,
    pub counters: BTreeMap<Counter, u64>,
    pub providers: BTreeMap<String, LatencyStats>,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Dispatch Metrics ===")?;
        writeln!(f, "up {:.1?}", self.uptime)?;

        for (counter, value) in &self.counters {
            writeln!(f, "{}: {}", counter.as_str(), value)?;
        }
        if let Some(ratio) = self.hit_ratio {
            writeln!(f, "cache hit ratio: {:.0}%", ratio * 100.0)?;
        }

        for (provider, stats) in &self.providers {
            writeln!(
                f,
                "latency[{}]: calls={} mean={:?} p50={:?} p95={:?} max={:?}",
                provider, stats.calls, stats.mean, stats.p50, stats.p95, stats.max
            )?;
        }
        Ok(())
    }
}
