//! Prelude module for convenient imports.
//!
//! Re-exports the types an application needs to load a model and produce
//! digests.
//!
//! # Usage
//!
//! ```rust
//! use news_digest::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::ErrorCategory;
pub use crate::Result;

// Resources and configuration
pub use crate::config::{
    ConfigBuilder, ConfigProvider, ConfigProviderExt, DigestSettings, InferenceConfiguration,
    MemoryConfigProvider,
};
pub use crate::resources::{
    FixedMemoryProbe, MemoryProbe, ResourceSnapshot, ResourceTier, SystemMemoryProbe,
};

// Model lifecycle
pub use crate::model::{
    InferenceBackend, LoadedModel, ModelAsset, ModelHealth, ModelManager, ModelStatus,
    UnavailableBackend,
};

// Inference
pub use crate::inference::{GenerationOptions, GenerationStream, InferenceEngine};

// Digest
pub use crate::digest::{
    Article, ArticleStore, Category, Digest, DigestEvent, DigestOrchestrator, DigestPostProcessor,
    DigestRun, DigestSection, DigestService, DigestSink, InMemoryArticleStore, InMemoryDigestSink,
    SectionOrigin,
};

// Observability
pub use crate::observability::{MetricsRegistry, MetricsSummary};
