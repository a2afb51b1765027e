//! Test support: a scripted backend that replays fixed pieces.
//!
//! Lets the lifecycle manager, inference engine and orchestrator run without
//! a model file's weights.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::model::{InferenceBackend, LoadedModel, ModelParams, PieceSink, SamplingParams};
use crate::{Error, Result};

/// Failure a scripted model reports instead of generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    Tokenization(String),
    Engine(String),
}

impl ScriptedFailure {
    fn to_error(&self) -> Error {
        match self {
            Self::Tokenization(reason) => Error::TokenizationFailed(reason.clone()),
            Self::Engine(reason) => Error::generation_failed(reason.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct Script {
    pieces: Vec<String>,
    piece_delay: Duration,
    looping: bool,
    failure: Option<ScriptedFailure>,
}

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicUsize,
    generations: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

/// Backend whose model emits a fixed list of pieces.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Script,
    load_steps: Vec<f32>,
    load_delay: Duration,
    failing_loads: AtomicUsize,
    counters: Arc<Counters>,
}

impl ScriptedBackend {
    pub fn new<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script {
                pieces: pieces.into_iter().map(Into::into).collect(),
                piece_delay: Duration::ZERO,
                looping: false,
                failure: None,
            },
            load_steps: vec![0.25, 0.5, 0.75],
            load_delay: Duration::ZERO,
            failing_loads: AtomicUsize::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Sleep between pieces, on the worker thread.
    pub fn piece_delay(mut self, delay: Duration) -> Self {
        self.script.piece_delay = delay;
        self
    }

    /// Repeat the pieces until `max_tokens` or cancellation.
    pub fn looping(mut self) -> Self {
        self.script.looping = true;
        self
    }

    pub fn fail_generation(mut self, failure: ScriptedFailure) -> Self {
        self.script.failure = Some(failure);
        self
    }

    /// Progress values reported during load, in order, unfiltered.
    pub fn load_steps<I: IntoIterator<Item = f32>>(mut self, steps: I) -> Self {
        self.load_steps = steps.into_iter().collect();
        self
    }

    /// Total time a load takes, spread across its steps.
    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// The first `n` loads fail with a corrupt-asset error.
    pub fn fail_first_loads(self, n: usize) -> Self {
        self.failing_loads.store(n, Ordering::SeqCst);
        self
    }

    pub fn load_count(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    pub fn generation_count(&self) -> usize {
        self.counters.generations.load(Ordering::SeqCst)
    }

    /// Formatted prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.counters
            .prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load(
        &self,
        path: &Path,
        _params: &ModelParams,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Arc<dyn LoadedModel>> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);

        let steps = self.load_steps.len().max(1) as u32;
        for &step in &self.load_steps {
            std::thread::sleep(self.load_delay / steps);
            progress(step);
        }
        if self.load_steps.is_empty() {
            std::thread::sleep(self.load_delay);
        }

        let failing = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(Error::load_failed(format!(
                "{} is not a valid model file",
                path.display()
            )));
        }

        Ok(Arc::new(ScriptedModel {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct ScriptedModel {
    script: Script,
    counters: Arc<Counters>,
}

impl LoadedModel for ScriptedModel {
    fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
        on_piece: &mut PieceSink<'_>,
    ) -> Result<u32> {
        self.counters.generations.fetch_add(1, Ordering::SeqCst);
        self.counters
            .prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        if let Some(failure) = &self.script.failure {
            return Err(failure.to_error());
        }
        if self.script.pieces.is_empty() {
            return Ok(0);
        }

        let mut produced = 0u32;
        let mut pieces = self.script.pieces.iter().cycle();
        let total = if self.script.looping {
            usize::MAX
        } else {
            self.script.pieces.len()
        };

        for _ in 0..total {
            if produced >= sampling.max_tokens {
                break;
            }
            let Some(piece) = pieces.next() else { break };
            if !self.script.piece_delay.is_zero() {
                std::thread::sleep(self.script.piece_delay);
            }
            produced += 1;
            if let ControlFlow::Break(()) = on_piece(piece) {
                break;
            }
        }
        Ok(produced)
    }
}
