//! The seam between the lifecycle manager and an inference engine.
//!
//! Backends are synchronous: the manager and the inference engine call them
//! from blocking worker threads, one generation at a time.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::InferenceConfiguration;
use crate::{Error, Result};

/// Receives each decoded piece; `Break` stops generation after this piece.
pub type PieceSink<'a> = dyn FnMut(&str) -> ControlFlow<()> + 'a;

/// Engine parameters fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelParams {
    pub context_size: u32,
    /// Upper bound on tokens per prefill batch.
    pub batch_size: u32,
    pub threads: usize,
}

impl ModelParams {
    pub fn from_config(config: &InferenceConfiguration) -> Self {
        Self {
            context_size: config.context_size,
            batch_size: config.batch_size,
            threads: config.thread_count,
        }
    }
}

/// Per-generation sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub seed: u32,
}

/// Loads model files.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Blocking load. `progress` receives values in [0, 1]; the manager
    /// enforces ordering and the final 1.0.
    fn load(
        &self,
        path: &Path,
        params: &ModelParams,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Arc<dyn LoadedModel>>;
}

/// A model resident in memory.
pub trait LoadedModel: Send + Sync {
    /// Tokenizes `prompt`, then samples up to `sampling.max_tokens` tokens,
    /// handing each decoded piece to `on_piece`. Returns the number of
    /// tokens produced.
    ///
    /// Prompts that do not fit the context window fail with
    /// [`Error::TokenizationFailed`].
    fn generate(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
        on_piece: &mut PieceSink<'_>,
    ) -> Result<u32>;
}

/// Reassembles token bytes into text.
///
/// Byte-level tokens can split one character across several tokens; bytes
/// of an unfinished character are held until the rest arrives.
#[derive(Debug, Default)]
pub struct Utf8PieceDecoder {
    pending: Vec<u8>,
}

impl Utf8PieceDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every complete character decoded so far.
    /// Invalid sequences become U+FFFD.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return text;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Bytes of an unfinished character left at the end of generation.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Backend used when no engine is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl InferenceBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn load(
        &self,
        _path: &Path,
        _params: &ModelParams,
        _progress: &mut dyn FnMut(f32),
    ) -> Result<Arc<dyn LoadedModel>> {
        Err(Error::ServiceUnavailable(
            "no inference engine is compiled in; enable the `llama` feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceTier;

    #[test]
    fn test_params_follow_tier() {
        let config = InferenceConfiguration::for_tier(ResourceTier::Standard, 4);
        let params = ModelParams::from_config(&config);
        assert_eq!(params.context_size, 3072);
        assert_eq!(params.batch_size, 512);
        assert_eq!(params.threads, 3);
    }

    #[test]
    fn test_decoder_joins_split_characters() {
        let mut decoder = Utf8PieceDecoder::new();
        let text = "Café 東京 🎉";
        let mut out = String::new();
        for byte in text.as_bytes() {
            out.push_str(&decoder.push(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn test_decoder_holds_incomplete_tail() {
        let mut decoder = Utf8PieceDecoder::new();
        let e_acute = "é".as_bytes();
        assert_eq!(decoder.push(&[b'C', b'a', b'f', e_acute[0]]), "Caf");
        assert_eq!(decoder.push(&e_acute[1..]), "é");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8PieceDecoder::new();
        assert_eq!(decoder.push(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
        assert_eq!(decoder.push(&[0xE6, 0x9D]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_unavailable_backend() {
        let result = UnavailableBackend.load(
            Path::new("model.gguf"),
            &ModelParams::from_config(&InferenceConfiguration::for_tier(
                ResourceTier::High,
                8,
            )),
            &mut |_| {},
        );
        assert!(matches!(result, Err(Error::ServiceUnavailable(_))));
    }
}
