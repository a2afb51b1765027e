//! Atomic metrics for the digest pipeline.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::Error;

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram. The sum is kept in thousandths of the unit.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bounds: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bounds: Vec<f64>) -> Self {
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            bounds,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Millisecond buckets from 50ms up to the two-minute generation deadline.
    pub fn generation_latency() -> Self {
        Self::new(vec![
            50.0, 250.0, 1_000.0, 5_000.0, 15_000.0, 30_000.0, 60_000.0, 120_000.0,
        ])
    }

    pub fn observe(&self, value: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bounds.len());

        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((value.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum() / n as f64,
        }
    }
}

/// How a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success,
    Cancelled,
    TimedOut,
    Failed,
}

impl GenerationOutcome {
    pub fn from_result<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::from_error(e),
        }
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::InferenceTimeout(_) => Self::TimedOut,
            e if e.is_cancellation() => Self::Cancelled,
            _ => Self::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timeout",
            Self::Failed => "error",
        }
    }
}

#[derive(Debug)]
pub struct MetricsRegistry {
    pub loads_total: Counter,
    pub load_failures: Counter,
    pub load_latency_ms: Histogram,
    pub generations_total: Counter,
    pub generations_success: Counter,
    pub generations_failed: Counter,
    pub generations_cancelled: Counter,
    pub generations_timed_out: Counter,
    pub generations_rejected: Counter,
    pub tokens_generated: Counter,
    pub active_generations: Gauge,
    pub generation_latency_ms: Histogram,
    pub digests_total: Counter,
    pub sections_parsed: Counter,
    pub sections_fallback: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            loads_total: Counter::new(),
            load_failures: Counter::new(),
            load_latency_ms: Histogram::generation_latency(),
            generations_total: Counter::new(),
            generations_success: Counter::new(),
            generations_failed: Counter::new(),
            generations_cancelled: Counter::new(),
            generations_timed_out: Counter::new(),
            generations_rejected: Counter::new(),
            tokens_generated: Counter::new(),
            active_generations: Gauge::new(),
            generation_latency_ms: Histogram::generation_latency(),
            digests_total: Counter::new(),
            sections_parsed: Counter::new(),
            sections_fallback: Counter::new(),
        }
    }

    pub fn record_load(&self, success: bool, latency_ms: f64) {
        self.loads_total.inc();
        self.load_latency_ms.observe(latency_ms);
        if !success {
            self.load_failures.inc();
        }
    }

    pub fn record_generation_start(&self) {
        self.generations_total.inc();
        self.active_generations.inc();
    }

    pub fn record_generation_end(&self, outcome: GenerationOutcome, tokens: u32, latency_ms: f64) {
        self.active_generations.dec();
        self.tokens_generated.add(u64::from(tokens));
        self.generation_latency_ms.observe(latency_ms);
        match outcome {
            GenerationOutcome::Success => self.generations_success.inc(),
            GenerationOutcome::Cancelled => self.generations_cancelled.inc(),
            GenerationOutcome::TimedOut => self.generations_timed_out.inc(),
            GenerationOutcome::Failed => self.generations_failed.inc(),
        }
    }

    pub fn record_rejected(&self) {
        self.generations_rejected.inc();
    }

    pub fn record_digest(&self, parsed: usize, fallback: usize) {
        self.digests_total.inc();
        self.sections_parsed.add(parsed as u64);
        self.sections_fallback.add(fallback as u64);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a [`MetricsRegistry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    pub loads: u64,
    pub load_failures: u64,
    pub generations: u64,
    pub successful_generations: u64,
    pub failed_generations: u64,
    pub cancelled_generations: u64,
    pub timed_out_generations: u64,
    pub rejected_generations: u64,
    pub tokens_generated: u64,
    pub active_generations: i64,
    pub avg_generation_latency_ms: f64,
    pub digests: u64,
    pub parsed_sections: u64,
    pub fallback_sections: u64,
}

impl MetricsSummary {
    pub fn from_registry(registry: &MetricsRegistry) -> Self {
        Self {
            loads: registry.loads_total.get(),
            load_failures: registry.load_failures.get(),
            generations: registry.generations_total.get(),
            successful_generations: registry.generations_success.get(),
            failed_generations: registry.generations_failed.get(),
            cancelled_generations: registry.generations_cancelled.get(),
            timed_out_generations: registry.generations_timed_out.get(),
            rejected_generations: registry.generations_rejected.get(),
            tokens_generated: registry.tokens_generated.get(),
            active_generations: registry.active_generations.get(),
            avg_generation_latency_ms: registry.generation_latency_ms.mean(),
            digests: registry.digests_total.get(),
            parsed_sections: registry.sections_parsed.get(),
            fallback_sections: registry.sections_fallback.get(),
        }
    }

    /// Share of sections that needed title-based fallback, in [0, 1].
    pub fn fallback_ratio(&self) -> f64 {
        let total = self.parsed_sections + self.fallback_sections;
        if total == 0 {
            0.0
        } else {
            self.fallback_sections as f64 / total as f64
        }
    }
}
