//! Span definitions for model loads, generations and digest runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{Level, Span, field, span};

/// Creates the pipeline's spans and numbers requests per component.
#[derive(Debug)]
pub struct SpanContext {
    component: &'static str,
    request_id: AtomicU64,
}

impl SpanContext {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            request_id: AtomicU64::new(0),
        }
    }

    pub fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn model_load_span(&self, model: &str, tier: &str) -> TimedSpan {
        let request_id = self.next_request_id();
        TimedSpan::new(span!(
            Level::INFO,
            "model.load",
            component = self.component,
            request_id = request_id,
            model = model,
            tier = tier,
            outcome = field::Empty,
            latency_ms = field::Empty,
        ))
    }

    pub fn generation_span(&self, prompt_chars: usize, max_tokens: u32) -> TimedSpan {
        let request_id = self.next_request_id();
        TimedSpan::new(span!(
            Level::INFO,
            "inference.generate",
            component = self.component,
            request_id = request_id,
            prompt_chars = prompt_chars,
            max_tokens = max_tokens,
            tokens = field::Empty,
            outcome = field::Empty,
            latency_ms = field::Empty,
        ))
    }

    pub fn digest_span(&self, articles: usize) -> TimedSpan {
        let request_id = self.next_request_id();
        TimedSpan::new(span!(
            Level::INFO,
            "digest.generate",
            component = self.component,
            request_id = request_id,
            articles = articles,
            sections = field::Empty,
            fallbacks = field::Empty,
            outcome = field::Empty,
            latency_ms = field::Empty,
        ))
    }
}

/// A span plus its start time; `finish` records `latency_ms`.
#[derive(Debug)]
pub struct TimedSpan {
    span: Span,
    start: Instant,
}

impl TimedSpan {
    fn new(span: Span) -> Self {
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn record_tokens(&self, tokens: u32) {
        self.span.record("tokens", tokens);
    }

    pub fn record_sections(&self, sections: usize, fallbacks: usize) {
        self.span.record("sections", sections);
        self.span.record("fallbacks", fallbacks);
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.span.record("outcome", outcome);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Records latency and returns it in milliseconds.
    pub fn finish(self) -> f64 {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.span.record("latency_ms", latency_ms as u64);
        latency_ms
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_increment() {
        let spans = SpanContext::new("engine");
        assert_eq!(spans.next_request_id(), 0);
        assert_eq!(spans.next_request_id(), 1);
    }

    #[test]
    fn test_timed_span_finish() {
        let spans = SpanContext::new("orchestrator");
        let span = spans.digest_span(8);
        span.record_sections(2, 1);
        span.record_outcome("ok");
        assert!(span.finish() >= 0.0);

        let generation = spans.generation_span(1200, 1024);
        generation.record_tokens(42);
        generation.finish();
    }
}
