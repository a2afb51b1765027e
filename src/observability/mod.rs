//! Structured tracing spans and in-process metrics.
//!
//! Components hold an `Arc<MetricsRegistry>`; share one registry between the
//! model manager, the inference engine and the orchestrator to get a single
//! [`MetricsSummary`] for the whole pipeline.

mod metrics;
mod spans;

pub use metrics::{Counter, Gauge, GenerationOutcome, Histogram, MetricsRegistry, MetricsSummary};
pub use spans::{SpanContext, TimedSpan};
