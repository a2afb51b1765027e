//! Model lifecycle: locating the asset, loading it through a backend, and
//! publishing status.
//!
//! A [`ModelManager`] owns the single loaded model. Other components only
//! see it through [`ModelManager::model`] and the status surface.

mod asset;
mod backend;
#[cfg(feature = "llama")]
mod llama;
mod manager;
mod status;

pub use asset::ModelAsset;
pub use backend::{
    InferenceBackend, LoadedModel, ModelParams, PieceSink, SamplingParams, UnavailableBackend,
    Utf8PieceDecoder,
};
#[cfg(feature = "llama")]
#[cfg_attr(docsrs, doc(cfg(feature = "llama")))]
pub use llama::LlamaBackend;
pub use manager::{ModelHealth, ModelManager};
pub use status::{ModelStatus, StatusChannel};
