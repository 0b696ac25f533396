// ============================================
// PROMPTGATE - Usage Accounting
// ============================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::types::TokenUsage;

/// One successful dispatch, as accounted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Milliseconds since the unix epoch
    pub timestamp_ms: u64,
    pub provider_id: String,
    pub model: String,
    pub tokens: TokenUsage,
    /// USD
    pub cost: f64,
    pub latency_ms: u64,
    pub attempts: u32,
}

/// Destination for usage records (log stream, file, metrics backend...)
pub trait UsageSink: Send + Sync {
    fn write(&self, record: &UsageRecord) -> Result<()>;

    /// Push out anything the sink buffers
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Emits each record as a structured tracing event
#[derive(Debug, Default)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn write(&self, record: &UsageRecord) -> Result<()> {
        tracing::info!(
            target: "promptgate::usage",
            provider = %record.provider_id,
            model = %record.model,
            prompt_tokens = record.tokens.prompt_tokens,
            completion_tokens = record.tokens.completion_tokens,
            total_tokens = record.tokens.total_tokens,
            cost = record.cost,
            latency_ms = record.latency_ms,
            attempts = record.attempts,
            "usage"
        );
        Ok(())
    }
}

/// Appends records as JSON lines to a file.
///
/// Lines are buffered in memory and reach the file when the buffer fills,
/// on [`UsageSink::flush`], or when the sink is dropped.
pub struct JsonlUsageSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlUsageSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open usage log {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl JsonlUsageSink {
    fn writer(&self) -> Result<std::sync::MutexGuard<'_, BufWriter<File>>> {
        self.writer
            .lock()
            .map_err(|_| anyhow::anyhow!("usage log writer poisoned"))
    }
}

impl UsageSink for JsonlUsageSink {
    fn write(&self, record: &UsageRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer()?, "{}", line)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer()?.flush().context("Failed to flush usage log")
    }
}

/// Keeps records in memory; backs the CLI `--stats` summary and tests
#[derive(Debug, Default)]
pub struct MemoryUsageSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn summary(&self) -> UsageSummary {
        let records = self.records();
        UsageSummary {
            requests: records.len(),
            total_tokens: records.iter().map(|r| r.tokens.total_tokens).sum(),
            total_cost: records.iter().map(|r| r.cost).sum(),
        }
    }
}

impl UsageSink for MemoryUsageSink {
    fn write(&self, record: &UsageRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("usage records poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UsageSummary {
    pub requests: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
}

impl std::fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} request(s), {} token(s), ${:.6}",
            self.requests, self.total_tokens, self.total_cost
        )
    }
}

/// Best-effort fan-out of usage records to every configured sink
#[derive(Clone, Default)]
pub struct UsageRecorder {
    sinks: Vec<Arc<dyn UsageSink>>,
}

impl UsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Build a record and hand it to each sink. Sink failures are logged
    /// and swallowed; this never fails.
    pub fn record(
        &self,
        provider_id: &str,
        model: &str,
        tokens: TokenUsage,
        cost: f64,
        latency: Duration,
        attempts: u32,
    ) -> UsageRecord {
        let record = UsageRecord {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            provider_id: provider_id.to_string(),
            model: model.to_string(),
            tokens,
            cost,
            latency_ms: latency.as_millis() as u64,
            attempts,
        };

        for sink in &self.sinks {
            if let Err(e) = sink.write(&record) {
                tracing::warn!("Usage recording failed: {:#}", e);
            }
        }

        record
    }

    /// Flush every sink, logging failures like [`UsageRecorder::record`]
    pub fn flush(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                tracing::warn!("Usage flush failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FailingSink;

    impl UsageSink for FailingSink {
        fn write(&self, _record: &UsageRecord) -> Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    #[test]
    fn test_record_reaches_all_sinks() {
        let first = Arc::new(MemoryUsageSink::new());
        let second = Arc::new(MemoryUsageSink::new());
        let recorder = UsageRecorder::new()
            .with_sink(first.clone())
            .with_sink(second.clone());

        recorder.record(
            "openai",
            "gpt-4o",
            TokenUsage::new(10, 20, None),
            0.001,
            Duration::from_millis(120),
            1,
        );

        assert_eq!(first.records().len(), 1);
        assert_eq!(second.records().len(), 1);
        assert_eq!(first.records()[0].tokens.total_tokens, 30);
        assert_eq!(first.records()[0].latency_ms, 120);
    }

    #[test]
    fn test_failing_sink_is_swallowed() {
        let memory = Arc::new(MemoryUsageSink::new());
        let recorder = UsageRecorder::new()
            .with_sink(Arc::new(FailingSink))
            .with_sink(memory.clone());

        let record = recorder.record("x", "m", TokenUsage::default(), 0.0, Duration::ZERO, 1);

        assert_eq!(record.provider_id, "x");
        assert_eq!(memory.records().len(), 1);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("usage.jsonl");
        let sink = Arc::new(JsonlUsageSink::open(&path).unwrap());
        let recorder = UsageRecorder::new().with_sink(sink);

        recorder.record("openai", "gpt-4o", TokenUsage::new(1, 2, None), 0.5, Duration::ZERO, 1);
        recorder.record("deepseek", "deepseek-chat", TokenUsage::new(3, 4, None), 0.25, Duration::ZERO, 2);
        recorder.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: UsageRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.provider_id, "deepseek");
        assert_eq!(second.attempts, 2);
    }

    #[test]
    fn test_jsonl_sink_buffers_until_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let sink = JsonlUsageSink::open(&path).unwrap();
        let recorder = UsageRecorder::new().with_sink(Arc::new(sink));

        recorder.record("openai", "gpt-4o", TokenUsage::new(1, 2, None), 0.5, Duration::ZERO, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        recorder.flush();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_jsonl_sink_flushes_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let recorder = UsageRecorder::new().with_sink(Arc::new(JsonlUsageSink::open(&path).unwrap()));

        recorder.record("openai", "gpt-4o", TokenUsage::default(), 0.0, Duration::ZERO, 1);
        drop(recorder);

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_summary_totals() {
        let sink = MemoryUsageSink::new();
        for cost in [0.25, 0.5] {
            sink.write(&UsageRecord {
                timestamp_ms: 0,
                provider_id: "p".into(),
                model: "m".into(),
                tokens: TokenUsage::new(5, 5, None),
                cost,
                latency_ms: 0,
                attempts: 1,
            })
            .unwrap();
        }

        let summary = sink.summary();
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.total_tokens, 20);
        assert!((summary.total_cost - 0.75).abs() < f64::EPSILON);
    }
}
