//! Single-owner lifecycle manager for the loaded model.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::stream::BoxStream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::asset::ModelAsset;
use super::backend::{InferenceBackend, LoadedModel, ModelParams};
use super::status::{ModelStatus, StatusChannel};
use crate::config::InferenceConfiguration;
use crate::observability::{MetricsRegistry, SpanContext};
use crate::resources::{MemoryProbe, ResourceSnapshot};
use crate::{Error, Result};

const SUPERSEDED: &str = "load superseded by unload";
const ABANDONED: &str = "model load cancelled before completion";

/// Health snapshot for diagnostics screens.
#[derive(Debug, Clone, Serialize)]
pub struct ModelHealth {
    pub status: ModelStatus,
    pub snapshot: ResourceSnapshot,
    /// Whether a generation started now would pass the memory pre-flight.
    pub meets_inference_floor: bool,
}

/// The installed model. `revoked` fires on unload so generations holding
/// the model let go of it.
struct Resident {
    model: Arc<dyn LoadedModel>,
    revoked: CancellationToken,
}

/// Settles the status if the load future is dropped mid-load.
struct LoadGuard<'a> {
    manager: &'a ModelManager,
    epoch: u64,
    settled: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.manager.abandon(self.epoch);
        }
    }
}

enum LoadEntry {
    Claimed { epoch: u64 },
    AlreadyReady,
    Join,
}

/// Owns the one loaded model.
///
/// Construct once at the application root and share by `Arc`. Loads run on
/// a blocking worker; concurrent `load` calls join the load in flight rather
/// than starting another.
pub struct ModelManager {
    backend: Arc<dyn InferenceBackend>,
    asset: ModelAsset,
    config: Arc<InferenceConfiguration>,
    probe: Arc<dyn MemoryProbe>,
    status: StatusChannel,
    model: RwLock<Option<Resident>>,
    /// Bumped by every claim and every unload; a load only installs its
    /// model if the epoch it claimed is still current.
    epoch: AtomicU64,
    metrics: Arc<MetricsRegistry>,
    spans: SpanContext,
}

impl ModelManager {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        asset: ModelAsset,
        config: Arc<InferenceConfiguration>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            backend,
            asset,
            config,
            probe,
            status: StatusChannel::new(),
            model: RwLock::new(None),
            epoch: AtomicU64::new(0),
            metrics: Arc::new(MetricsRegistry::new()),
            spans: SpanContext::new("model"),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &Arc<InferenceConfiguration> {
        &self.config
    }

    pub fn probe(&self) -> &Arc<dyn MemoryProbe> {
        &self.probe
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn status(&self) -> ModelStatus {
        self.status.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.status.get().is_ready()
    }

    /// Current status first, then every transition.
    pub fn status_stream(&self) -> BoxStream<'static, ModelStatus> {
        self.status.stream()
    }

    /// The ready model, if any.
    pub fn model(&self) -> Option<Arc<dyn LoadedModel>> {
        self.lease().map(|(model, _)| model)
    }

    /// The ready model plus a token cancelled when it is unloaded.
    pub fn lease(&self) -> Option<(Arc<dyn LoadedModel>, CancellationToken)> {
        if !self.is_loaded() {
            return None;
        }
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|resident| (Arc::clone(&resident.model), resident.revoked.child_token()))
    }

    pub fn health(&self) -> ModelHealth {
        let snapshot = ResourceSnapshot::capture(self.probe.as_ref());
        ModelHealth {
            status: self.status(),
            meets_inference_floor: snapshot.available_memory >= self.config.min_inference_memory,
            snapshot,
        }
    }

    /// Loads the model, reporting monotonic progress ending in 1.0.
    ///
    /// A no-op when already ready. A call made while another load is in
    /// flight waits for that load and returns its outcome; `on_progress` is
    /// not called for joined loads.
    pub async fn load<F>(&self, mut on_progress: F) -> Result<()>
    where
        F: FnMut(f32) + Send,
    {
        let mut entry = LoadEntry::Join;
        self.status.publish_if(|status| match status {
            ModelStatus::Ready => {
                entry = LoadEntry::AlreadyReady;
                false
            }
            ModelStatus::Loading { .. } => false,
            _ => {
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                entry = LoadEntry::Claimed { epoch };
                *status = ModelStatus::Loading { progress: 0.0 };
                true
            }
        });

        match entry {
            LoadEntry::AlreadyReady => {
                tracing::debug!("model already loaded");
                Ok(())
            }
            LoadEntry::Join => {
                tracing::debug!("load already in flight, joining");
                self.wait_for_load().await
            }
            LoadEntry::Claimed { epoch } => self.run_load(epoch, &mut on_progress).await,
        }
    }

    async fn wait_for_load(&self) -> Result<()> {
        let mut rx = self.status.watch();
        loop {
            match &*rx.borrow_and_update() {
                ModelStatus::Ready => return Ok(()),
                ModelStatus::Error { message } => return Err(Error::load_failed(message.clone())),
                ModelStatus::NotLoaded => return Err(Error::load_failed(SUPERSEDED)),
                ModelStatus::Loading { .. } => {}
            }
            if rx.changed().await.is_err() {
                return Err(Error::load_failed("model manager dropped during load"));
            }
        }
    }

    async fn run_load(&self, epoch: u64, on_progress: &mut (dyn FnMut(f32) + Send)) -> Result<()> {
        let span = self
            .spans
            .model_load_span(self.asset.name(), self.config.tier.as_str());
        tracing::info!(
            model = self.asset.name(),
            backend = self.backend.name(),
            tier = %self.config.tier,
            "loading model"
        );

        let mut guard = LoadGuard {
            manager: self,
            epoch,
            settled: false,
        };
        let result = self.load_model(epoch, on_progress).await;
        let outcome = match result {
            Ok(model) => self.install(epoch, model),
            Err(e) => {
                self.fail(epoch, &e);
                Err(e)
            }
        };
        guard.settled = true;

        span.record_outcome(if outcome.is_ok() { "ready" } else { "error" });
        let latency_ms = span.finish();
        self.metrics.record_load(outcome.is_ok(), latency_ms);
        outcome
    }

    async fn load_model(
        &self,
        epoch: u64,
        on_progress: &mut (dyn FnMut(f32) + Send),
    ) -> Result<Arc<dyn LoadedModel>> {
        let available = self.probe.available_memory();
        if available < self.config.min_load_memory {
            return Err(Error::load_failed(format!(
                "insufficient memory to load model: {} MB available, {} MB required",
                available / (1024 * 1024),
                self.config.min_load_memory / (1024 * 1024)
            )));
        }

        let path = self.asset.resolve()?;
        let params = ModelParams::from_config(&self.config);
        let backend = Arc::clone(&self.backend);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f32>();

        let loader = tokio::task::spawn_blocking(move || {
            backend.load(&path, &params, &mut |p| {
                let _ = progress_tx.send(p);
            })
        });

        // The sender lives in the loader closure; the channel closes when the
        // backend returns.
        let mut reported = 0.0f32;
        on_progress(reported);
        while let Some(raw) = progress_rx.recv().await {
            let progress = if raw.is_finite() {
                raw.clamp(0.0, 1.0)
            } else {
                0.0
            };
            if progress > reported {
                reported = progress;
                self.report_progress(epoch, progress, on_progress);
            }
        }

        let model = loader
            .await
            .map_err(|e| Error::load_failed(format!("model loader task failed: {}", e)))??;

        if reported < 1.0 {
            self.report_progress(epoch, 1.0, on_progress);
        }
        Ok(model)
    }

    fn report_progress(&self, epoch: u64, progress: f32, on_progress: &mut (dyn FnMut(f32) + Send)) {
        on_progress(progress);
        self.status.publish_if(|status| {
            if self.epoch.load(Ordering::SeqCst) != epoch || !status.is_loading() {
                return false;
            }
            *status = ModelStatus::Loading { progress };
            true
        });
    }

    fn install(&self, epoch: u64, model: Arc<dyn LoadedModel>) -> Result<()> {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        let mut installed = false;
        self.status.publish_if(|status| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            *slot = Some(Resident {
                model,
                revoked: CancellationToken::new(),
            });
            *status = ModelStatus::Ready;
            installed = true;
            true
        });

        if installed {
            tracing::info!(model = self.asset.name(), "model ready");
            Ok(())
        } else {
            tracing::info!(model = self.asset.name(), "discarding model loaded after unload");
            Err(Error::load_failed(SUPERSEDED))
        }
    }

    fn fail(&self, epoch: u64, error: &Error) {
        tracing::warn!(model = self.asset.name(), error = %error, "model load failed");
        self.status.publish_if(|status| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            *status = ModelStatus::Error {
                message: match error {
                    Error::ModelLoadFailed(reason) => reason.clone(),
                    other => other.to_string(),
                },
            };
            true
        });
    }

    fn abandon(&self, epoch: u64) {
        let abandoned = self.status.publish_if(|status| {
            if self.epoch.load(Ordering::SeqCst) != epoch || !status.is_loading() {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *status = ModelStatus::Error {
                message: ABANDONED.to_string(),
            };
            true
        });
        if abandoned {
            tracing::warn!(model = self.asset.name(), "model load dropped before completion");
        }
    }

    /// Drops the model and returns to `NotLoaded`. Idempotent; supersedes a
    /// load in flight.
    ///
    /// Generations holding the model are cancelled and release it at their
    /// next token.
    pub fn unload(&self) {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        let released = slot.take();
        self.status.publish_if(|status| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if *status == ModelStatus::NotLoaded {
                return false;
            }
            *status = ModelStatus::NotLoaded;
            true
        });
        drop(slot);

        if let Some(resident) = released {
            resident.revoked.cancel();
            tracing::info!(model = self.asset.name(), "model unloaded");
        }
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("backend", &self.backend.name())
            .field("asset", &self.asset)
            .field("status", &self.status())
            .finish()
    }
}
