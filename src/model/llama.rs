//! GGUF inference through llama.cpp.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend as LlamaRuntime;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;

use super::backend::{
    InferenceBackend, LoadedModel, ModelParams, PieceSink, SamplingParams, Utf8PieceDecoder,
};
use crate::{Error, Result};

/// llama.cpp may only be initialised once per process.
static RUNTIME: OnceLock<Arc<LlamaRuntime>> = OnceLock::new();

fn runtime() -> Result<Arc<LlamaRuntime>> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(Arc::clone(runtime));
    }
    let runtime = LlamaRuntime::init()
        .map_err(|e| Error::ServiceUnavailable(format!("llama.cpp init failed: {}", e)))?;
    Ok(Arc::clone(RUNTIME.get_or_init(|| Arc::new(runtime))))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LlamaBackend;

impl LlamaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl InferenceBackend for LlamaBackend {
    fn name(&self) -> &str {
        "llama.cpp"
    }

    fn load(
        &self,
        path: &Path,
        params: &ModelParams,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Arc<dyn LoadedModel>> {
        let runtime = runtime()?;
        progress(0.1);

        let model = LlamaModel::load_from_file(&runtime, path, &LlamaModelParams::default())
            .map_err(|e| Error::load_failed(e.to_string()))?;
        progress(0.9);

        Ok(Arc::new(LlamaLoadedModel {
            runtime,
            model,
            params: *params,
        }))
    }
}

struct LlamaLoadedModel {
    runtime: Arc<LlamaRuntime>,
    model: LlamaModel,
    params: ModelParams,
}

impl LlamaLoadedModel {
    fn engine_error(e: impl std::fmt::Display) -> Error {
        Error::generation_failed(e.to_string())
    }
}

impl LoadedModel for LlamaLoadedModel {
    fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
        on_piece: &mut PieceSink<'_>,
    ) -> Result<u32> {
        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| Error::TokenizationFailed(e.to_string()))?;

        let needed = tokens.len() + sampling.max_tokens as usize;
        if tokens.is_empty() || needed > self.params.context_size as usize {
            return Err(Error::TokenizationFailed(format!(
                "prompt of {} tokens plus {} output tokens exceeds context of {}",
                tokens.len(),
                sampling.max_tokens,
                self.params.context_size
            )));
        }

        let n_ctx = NonZeroU32::new(self.params.context_size)
            .ok_or_else(|| Error::generation_failed("context size must be non-zero"))?;
        let threads = i32::try_from(self.params.threads.max(1)).unwrap_or(1);
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(Some(n_ctx))
            .with_n_batch(self.params.batch_size)
            .with_n_threads(threads)
            .with_n_threads_batch(threads);

        let mut ctx = self
            .model
            .new_context(&self.runtime, ctx_params)
            .map_err(Self::engine_error)?;

        // Prefill in chunks no larger than the batch size.
        let chunk_size = self.params.batch_size.max(1) as usize;
        let mut batch = LlamaBatch::new(chunk_size, 1);
        let last = tokens.len() - 1;
        for (chunk_index, chunk) in tokens.chunks(chunk_size).enumerate() {
            batch.clear();
            for (offset, &token) in chunk.iter().enumerate() {
                let index = chunk_index * chunk_size + offset;
                batch
                    .add(token, index as i32, &[0], index == last)
                    .map_err(Self::engine_error)?;
            }
            ctx.decode(&mut batch).map_err(Self::engine_error)?;
        }

        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::top_p(sampling.top_p, 1),
            LlamaSampler::temp(sampling.temperature),
            LlamaSampler::dist(sampling.seed),
        ]);

        let mut position = tokens.len() as i32;
        let mut produced = 0u32;
        let mut decoder = Utf8PieceDecoder::new();
        while produced < sampling.max_tokens {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);
            if self.model.is_eog_token(token) {
                break;
            }

            let bytes = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(Self::engine_error)?;
            produced += 1;
            let piece = decoder.push(&bytes);
            if !piece.is_empty() && on_piece(&piece).is_break() {
                return Ok(produced);
            }

            batch.clear();
            batch
                .add(token, position, &[0], true)
                .map_err(Self::engine_error)?;
            position += 1;
            ctx.decode(&mut batch).map_err(Self::engine_error)?;
        }

        let rest = decoder.finish();
        if !rest.is_empty() {
            let _ = on_piece(&rest);
        }
        Ok(produced)
    }
}
