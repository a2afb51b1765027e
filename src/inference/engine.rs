//! Single-generation inference engine.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::options::GenerationOptions;
use super::stop::{StopScan, StopSequenceDetector};
use super::stream::{GenerationStats, GenerationStream, WorkerMessage};
use super::template::ChatTemplate;
use crate::config::InferenceConfiguration;
use crate::model::{LoadedModel, ModelManager, SamplingParams};
use crate::observability::{MetricsRegistry, SpanContext};
use crate::resources::MemoryProbe;
use crate::{Error, Result};

const PIECE_CHANNEL_CAPACITY: usize = 64;

struct ActiveGeneration {
    id: u64,
    cancel: CancellationToken,
}

type ActiveCell = Arc<Mutex<Option<ActiveGeneration>>>;

/// Held by the worker; frees the engine for the next generation when the
/// worker stops touching the model.
struct ActiveSlot {
    active: ActiveCell,
    id: u64,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|a| a.id == self.id) {
            *active = None;
        }
    }
}

/// Runs prompts against the model owned by a [`ModelManager`].
///
/// Each generation runs on one blocking worker that exclusively drives the
/// model. Cancellation and the deadline are checked at every token.
pub struct InferenceEngine {
    manager: Arc<ModelManager>,
    config: Arc<InferenceConfiguration>,
    probe: Arc<dyn MemoryProbe>,
    template: ChatTemplate,
    active: ActiveCell,
    next_id: AtomicU64,
    metrics: Arc<MetricsRegistry>,
    spans: SpanContext,
}

impl InferenceEngine {
    pub fn new(
        manager: Arc<ModelManager>,
        config: Arc<InferenceConfiguration>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let metrics = Arc::clone(manager.metrics());
        Self {
            manager,
            config,
            probe,
            template: ChatTemplate::default(),
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
            metrics,
            spans: SpanContext::new("engine"),
        }
    }

    pub fn with_template(mut self, template: ChatTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }

    pub fn config(&self) -> &Arc<InferenceConfiguration> {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn is_generating(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancels the generation in flight, if any.
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(generation) = active.as_ref() {
            tracing::debug!(id = generation.id, "cancelling generation");
            generation.cancel.cancel();
        }
    }

    /// Collects a whole generation into one string.
    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let mut stream = std::pin::pin!(self.generate_stream(prompt, system_prompt, options));
        let mut text = String::new();
        while let Some(piece) = stream.next().await {
            text.push_str(&piece?);
        }
        Ok(text)
    }

    /// Starts a generation and streams its text.
    ///
    /// Pre-flight failures (no model, memory below the inference floor,
    /// another generation in flight) are the stream's only item. Unloading
    /// the model cancels the generation.
    pub fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationStream {
        let Some((model, cancel)) = self.manager.lease() else {
            return GenerationStream::failed(Error::ModelNotLoaded);
        };

        let available = self.probe.available_memory();
        if available < self.config.min_inference_memory {
            tracing::warn!(
                available,
                required = self.config.min_inference_memory,
                "refusing generation under memory pressure"
            );
            return GenerationStream::failed(Error::MemoryPressure {
                available,
                required: self.config.min_inference_memory,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.is_some() {
                self.metrics.record_rejected();
                return GenerationStream::failed(Error::GenerationInProgress);
            }
            *active = Some(ActiveGeneration {
                id,
                cancel: cancel.clone(),
            });
        }
        let slot = ActiveSlot {
            active: Arc::clone(&self.active),
            id,
        };

        let formatted = self.template.format(system_prompt, prompt);
        let span = self
            .spans
            .generation_span(formatted.len(), options.max_tokens);
        self.metrics.record_generation_start();
        tracing::debug!(id, prompt_chars = formatted.len(), "generation started");

        let timeout = self.config.generation_timeout;
        let (tx, rx) = mpsc::channel(PIECE_CHANNEL_CAPACITY);
        let worker = Worker {
            model,
            prompt: formatted,
            sampling: options.sampling(),
            detector: StopSequenceDetector::new(options.stop_sequences.iter().cloned()),
            timeout,
            outbox: Outbox {
                tx,
                cancel: cancel.clone(),
                deadline: Instant::now() + timeout,
                runtime: Handle::current(),
            },
        };
        tokio::task::spawn_blocking(move || worker.run(slot));

        GenerationStream::new(rx, cancel, timeout, span, Arc::clone(&self.metrics))
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("template", &self.template)
            .field("generating", &self.is_generating())
            .finish()
    }
}

/// Outcome of handing a message to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Closed,
    Cancelled,
    TimedOut,
}

/// Sending half of a generation, bounded by its cancellation and deadline.
struct Outbox {
    tx: mpsc::Sender<WorkerMessage>,
    cancel: CancellationToken,
    deadline: Instant,
    runtime: Handle,
}

impl Outbox {
    /// Waits for channel capacity only while the generation is still live.
    fn deliver(&self, message: WorkerMessage) -> Delivery {
        let message = match self.tx.try_send(message) {
            Ok(()) => return Delivery::Sent,
            Err(TrySendError::Closed(_)) => return Delivery::Closed,
            Err(TrySendError::Full(message)) => message,
        };
        self.runtime.block_on(async {
            tokio::select! {
                sent = self.tx.send(message) => {
                    if sent.is_ok() { Delivery::Sent } else { Delivery::Closed }
                }
                _ = self.cancel.cancelled() => Delivery::Cancelled,
                _ = tokio::time::sleep_until(self.deadline.into()) => Delivery::TimedOut,
            }
        })
    }
}

struct Worker {
    model: Arc<dyn LoadedModel>,
    prompt: String,
    sampling: SamplingParams,
    detector: StopSequenceDetector,
    timeout: Duration,
    outbox: Outbox,
}

impl Worker {
    fn run(mut self, slot: ActiveSlot) {
        let started = Instant::now();
        let mut timed_out = false;
        let mut consumer_gone = false;

        let result = {
            let detector = &mut self.detector;
            let outbox = &self.outbox;
            self.model
                .generate(&self.prompt, &self.sampling, &mut |piece: &str| {
                    if outbox.cancel.is_cancelled() {
                        return ControlFlow::Break(());
                    }
                    if Instant::now() >= outbox.deadline {
                        timed_out = true;
                        return ControlFlow::Break(());
                    }
                    let (text, stop) = match detector.push(piece) {
                        StopScan::Continue(text) => (text, false),
                        StopScan::Stopped(text) => (text, true),
                    };
                    if !text.is_empty() {
                        match outbox.deliver(WorkerMessage::Piece(text)) {
                            Delivery::Sent => {}
                            Delivery::Closed => {
                                consumer_gone = true;
                                return ControlFlow::Break(());
                            }
                            Delivery::Cancelled => return ControlFlow::Break(()),
                            Delivery::TimedOut => {
                                timed_out = true;
                                return ControlFlow::Break(());
                            }
                        }
                    }
                    if stop {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                })
        };
        drop(self.model);
        let stopped = self.detector.is_stopped();
        let cancelled = self.outbox.cancel.is_cancelled();

        let message = match result {
            Err(e) => WorkerMessage::Failed(e),
            Ok(_) if timed_out => WorkerMessage::Failed(Error::InferenceTimeout(self.timeout)),
            Ok(_) if !stopped && (consumer_gone || cancelled) => {
                WorkerMessage::Failed(Error::GenerationCancelled)
            }
            Ok(tokens) => {
                let rest = self.detector.finish();
                let flushed = rest.is_empty()
                    || self.outbox.deliver(WorkerMessage::Piece(rest)) == Delivery::Sent;
                if flushed {
                    WorkerMessage::Done(GenerationStats {
                        tokens,
                        elapsed: started.elapsed(),
                        stopped_by_sequence: stopped,
                    })
                } else if Instant::now() >= self.outbox.deadline {
                    WorkerMessage::Failed(Error::InferenceTimeout(self.timeout))
                } else {
                    WorkerMessage::Failed(Error::GenerationCancelled)
                }
            }
        };

        // The model is released and idle from here; let the next generation
        // in before the consumer sees the terminal message.
        drop(slot);
        if let WorkerMessage::Failed(ref e) = message {
            tracing::debug!(error = %e, "generation ended with error");
        }
        // Blocks only while a consumer holds the stream without polling it.
        let _ = self.outbox.tx.blocking_send(message);
    }
}
