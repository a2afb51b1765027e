//! The consumer side of a generation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use pin_project_lite::pin_project;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use crate::observability::{GenerationOutcome, MetricsRegistry, TimedSpan};
use crate::{Error, Result};

/// Summary of a completed generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    pub tokens: u32,
    pub elapsed: Duration,
    /// Whether a stop sequence ended the generation.
    pub stopped_by_sequence: bool,
}

/// Messages from the blocking worker.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Piece(String),
    Done(GenerationStats),
    Failed(Error),
}

struct Telemetry {
    span: TimedSpan,
    metrics: Arc<MetricsRegistry>,
}

impl Telemetry {
    fn complete(self, outcome: GenerationOutcome, tokens: u32) {
        self.span.record_outcome(outcome.as_str());
        self.span.record_tokens(tokens);
        let latency_ms = self.span.finish();
        self.metrics
            .record_generation_end(outcome, tokens, latency_ms);
    }
}

fn complete(telemetry: &mut Option<Telemetry>, outcome: GenerationOutcome, tokens: u32) {
    if let Some(telemetry) = telemetry.take() {
        telemetry.complete(outcome, tokens);
    }
}

pin_project! {
    /// Text pieces of one generation, ending with `None` on success or a
    /// single `Err` on failure.
    ///
    /// Dropping the stream cancels the generation.
    pub struct GenerationStream {
        #[pin]
        deadline: Option<Sleep>,
        rx: Option<mpsc::Receiver<WorkerMessage>>,
        pending_error: Option<Error>,
        cancel: Option<CancellationToken>,
        timeout: Duration,
        telemetry: Option<Telemetry>,
        stats: Option<GenerationStats>,
        finished: bool,
    }

    impl PinnedDrop for GenerationStream {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(cancel) = this.cancel.as_ref() {
                cancel.cancel();
            }
            if !*this.finished {
                tracing::debug!("generation stream dropped before completion");
                complete(this.telemetry, GenerationOutcome::Cancelled, 0);
            }
        }
    }
}

impl GenerationStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<WorkerMessage>,
        cancel: CancellationToken,
        timeout: Duration,
        span: TimedSpan,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            deadline: Some(tokio::time::sleep(timeout)),
            rx: Some(rx),
            pending_error: None,
            cancel: Some(cancel),
            timeout,
            telemetry: Some(Telemetry { span, metrics }),
            stats: None,
            finished: false,
        }
    }

    /// A stream whose only item is `error`.
    pub(crate) fn failed(error: Error) -> Self {
        Self {
            deadline: None,
            rx: None,
            pending_error: Some(error),
            cancel: None,
            timeout: Duration::ZERO,
            telemetry: None,
            stats: None,
            finished: false,
        }
    }

    /// Requests cancellation; the stream then ends with
    /// [`Error::GenerationCancelled`].
    pub fn cancel(&self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }

    /// Set once the stream has ended successfully.
    pub fn stats(&self) -> Option<&GenerationStats> {
        self.stats.as_ref()
    }
}

impl Stream for GenerationStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }
        if let Some(error) = this.pending_error.take() {
            *this.finished = true;
            return Poll::Ready(Some(Err(error)));
        }
        let Some(rx) = this.rx.as_mut() else {
            *this.finished = true;
            return Poll::Ready(None);
        };

        match rx.poll_recv(cx) {
            Poll::Ready(Some(WorkerMessage::Piece(text))) => {
                return Poll::Ready(Some(Ok(text)));
            }
            Poll::Ready(Some(WorkerMessage::Done(stats))) => {
                *this.finished = true;
                tracing::debug!(
                    tokens = stats.tokens,
                    elapsed_ms = stats.elapsed.as_millis() as u64,
                    stopped_by_sequence = stats.stopped_by_sequence,
                    "generation finished"
                );
                complete(this.telemetry, GenerationOutcome::Success, stats.tokens);
                *this.stats = Some(stats);
                return Poll::Ready(None);
            }
            Poll::Ready(Some(WorkerMessage::Failed(error))) => {
                *this.finished = true;
                complete(this.telemetry, GenerationOutcome::from_error(&error), 0);
                return Poll::Ready(Some(Err(error)));
            }
            Poll::Ready(None) => {
                *this.finished = true;
                complete(this.telemetry, GenerationOutcome::Failed, 0);
                return Poll::Ready(Some(Err(Error::generation_failed(
                    "inference worker exited without a result",
                ))));
            }
            Poll::Pending => {}
        }

        if let Some(deadline) = this.deadline.as_pin_mut() {
            if deadline.poll(cx).is_ready() {
                *this.finished = true;
                if let Some(cancel) = this.cancel.as_ref() {
                    cancel.cancel();
                }
                tracing::warn!(timeout_secs = this.timeout.as_secs_f64(), "generation timed out");
                complete(this.telemetry, GenerationOutcome::TimedOut, 0);
                return Poll::Ready(Some(Err(Error::InferenceTimeout(*this.timeout))));
            }
        }

        Poll::Pending
    }
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("finished", &self.finished)
            .field("timeout", &self.timeout)
            .field("stats", &self.stats)
            .finish()
    }
}
