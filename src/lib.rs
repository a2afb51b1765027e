//! # news-digest
//!
//! On-device digest generation for a news reader.
//!
//! The crate owns the hard part of producing a digest with a small local
//! language model: sizing the model's footprint to the host, keeping a single
//! long-lived model safe under concurrent requests, streaming cancellable
//! generations, and turning the model's loosely structured output into one
//! clean section per news category.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use news_digest::prelude::*;
//! use news_digest::testing::ScriptedBackend;
//!
//! # async fn example(articles: Vec<Article>) -> news_digest::Result<()> {
//! let probe: Arc<dyn MemoryProbe> = Arc::new(SystemMemoryProbe::new());
//! let config = Arc::new(InferenceConfiguration::detect(probe.as_ref()));
//! let settings = DigestSettings::default();
//!
//! let manager = Arc::new(ModelManager::new(
//!     Arc::new(ScriptedBackend::new(["**Technology**\n", "Chips got faster."])),
//!     ModelAsset::from_settings(&settings),
//!     Arc::clone(&config),
//!     Arc::clone(&probe),
//! ));
//! manager.load(|progress| println!("loading {:.0}%", progress * 100.0)).await?;
//!
//! let engine = Arc::new(InferenceEngine::new(manager, config, probe));
//! let orchestrator = DigestOrchestrator::new(engine, &settings);
//!
//! let mut run = orchestrator.generate_digest(articles);
//! while let Some(event) = run.next().await {
//!     match event? {
//!         DigestEvent::Partial(text) => print!("{}", text),
//!         DigestEvent::Completed(digest) => println!("\n{} sections", digest.sections.len()),
//!         DigestEvent::Started { .. } => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod digest;
pub mod inference;
pub mod model;
pub mod observability;
pub mod prelude;
pub mod resources;
pub mod testing;

// Re-exports for convenience
pub use config::{
    CompositeConfigProvider, ConfigBuilder, ConfigError, ConfigProvider, ConfigProviderExt,
    DigestSettings, EnvConfigProvider, InferenceConfiguration, MemoryConfigProvider,
};
pub use digest::{
    Article, ArticleStore, Category, Digest, DigestEvent, DigestOrchestrator,
    DigestPostProcessor, DigestPromptBuilder, DigestRun, DigestSection, DigestService,
    DigestSink, InMemoryArticleStore, InMemoryDigestSink, MarkerKind, MarkerTable,
    ProcessorOptions, SectionOrigin,
};
pub use inference::{
    ChatTemplate, GenerationOptions, GenerationStream, InferenceEngine, StopSequenceDetector,
};
pub use model::{
    InferenceBackend, LoadedModel, ModelAsset, ModelHealth, ModelManager, ModelParams,
    ModelStatus, SamplingParams, UnavailableBackend,
};
pub use observability::{MetricsRegistry, MetricsSummary, SpanContext};
pub use resources::{
    FixedMemoryProbe, MemoryProbe, ResourceSnapshot, ResourceTier, SystemMemoryProbe,
    current_tier,
};

#[cfg(feature = "llama")]
pub use model::LlamaBackend;

/// Error type for digest engine operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Generation was requested while no model is ready.
    #[error("Model is not loaded")]
    ModelNotLoaded,

    /// The model could not be loaded (asset missing or corrupt, memory floor not met).
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),

    /// Generation did not finish before the deadline.
    #[error("Inference timed out after {:.1}s", .0.as_secs_f64())]
    InferenceTimeout(std::time::Duration),

    /// Pre-flight memory check failed.
    #[error("Memory pressure: {available} bytes available, {required} required")]
    MemoryPressure { available: u64, required: u64 },

    /// Generation was cancelled by the caller or the system.
    #[error("Generation cancelled")]
    GenerationCancelled,

    /// The inference engine is not usable in this environment.
    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The prompt could not be tokenized.
    #[error("Tokenization failed: {0}")]
    TokenizationFailed(String),

    /// Catch-all engine failure.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Another generation already owns the model.
    #[error("A generation is already in progress")]
    GenerationInProgress,

    /// No article survived selection.
    #[error("No articles available for a digest")]
    NoArticles,

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An article store or digest sink failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Failures that may succeed on retry (timeouts, contention)
    Transient,
    /// Host resource limits (memory floors)
    ResourceLimit,
    /// Configuration, missing assets, unusable environment
    Configuration,
    /// Normal termination requested by a caller
    Cancelled,
    /// Logic or engine errors
    Internal,
}

impl Error {
    pub fn load_failed(reason: impl Into<String>) -> Self {
        Error::ModelLoadFailed(reason.into())
    }

    pub fn generation_failed(reason: impl Into<String>) -> Self {
        Error::GenerationFailed(reason.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InferenceTimeout(_) | Error::GenerationInProgress => ErrorCategory::Transient,

            Error::MemoryPressure { .. } => ErrorCategory::ResourceLimit,

            Error::ModelNotLoaded
            | Error::ModelLoadFailed(_)
            | Error::ServiceUnavailable(_)
            | Error::NoArticles
            | Error::Config(_) => ErrorCategory::Configuration,

            Error::GenerationCancelled => ErrorCategory::Cancelled,

            Error::TokenizationFailed(_)
            | Error::GenerationFailed(_)
            | Error::Storage(_)
            | Error::Io(_)
            | Error::Json(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::ResourceLimit
        )
    }

    pub fn is_cancellation(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    /// Cancellation is a normal termination path and is never shown to the user.
    pub fn is_user_visible(&self) -> bool {
        !self.is_cancellation()
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound { key } => {
                Error::Config(format!("Key not found: {}", key))
            }
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("Invalid value for {}: {}", key, message))
            }
            config::ConfigError::Serialization(e) => Error::Json(e),
            config::ConfigError::Env(e) => Error::Config(e.to_string()),
            config::ConfigError::Provider { message } => Error::Config(message),
            config::ConfigError::ValidationErrors(errors) => Error::Config(errors.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MemoryPressure {
            available: 100,
            required: 200,
        };
        assert!(err.to_string().contains("100 bytes available"));

        let err = Error::InferenceTimeout(std::time::Duration::from_secs(120));
        assert_eq!(err.to_string(), "Inference timed out after 120.0s");
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::InferenceTimeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(Error::GenerationInProgress.is_retryable());
        assert!(
            Error::MemoryPressure {
                available: 0,
                required: 1
            }
            .is_retryable()
        );
        assert!(!Error::TokenizationFailed("bad".into()).is_retryable());
        assert!(!Error::ModelNotLoaded.is_retryable());
    }

    #[test]
    fn test_cancellation_is_not_user_visible() {
        assert!(Error::GenerationCancelled.is_cancellation());
        assert!(!Error::GenerationCancelled.is_user_visible());
        assert!(Error::load_failed("missing").is_user_visible());
    }

    #[test]
    fn test_config_error_conversion() {
        let config_err = config::ConfigError::NotFound {
            key: "model.name".to_string(),
        };
        let err: Error = config_err.into();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
